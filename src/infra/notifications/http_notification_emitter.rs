use crate::domain::models::notification::NotificationEvent;
use crate::domain::ports::NotificationEmitter;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use tracing::error;

pub struct HttpNotificationEmitter {
    client: Client,
    webhook_url: String,
    token: String,
}

impl HttpNotificationEmitter {
    pub fn new(webhook_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
            token,
        }
    }
}

#[async_trait]
impl NotificationEmitter for HttpNotificationEmitter {
    async fn emit(&self, event: &NotificationEvent) -> Result<(), AppError> {
        let res = self.client.post(&self.webhook_url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(event)
            .send()
            .await
            .map_err(|e| {
                let msg = format!("Notification webhook connection error: {}", e);
                error!("{}", msg);
                AppError::InternalWithMsg(msg)
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            let msg = format!("Notification webhook failed. Status: {}, Body: {}", status, text);
            error!("{}", msg);
            return Err(AppError::InternalWithMsg(msg));
        }

        Ok(())
    }
}
