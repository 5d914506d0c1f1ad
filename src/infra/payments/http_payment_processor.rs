use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::models::payment::{AuthorizeRequest, ProcessorHold, ProcessorHoldStatus, ProcessorRefund};
use crate::domain::ports::PaymentProcessor;
use crate::error::AppError;

/// REST adapter for a manual-capture card processor. Every mutating request
/// carries an `Idempotency-Key` header.
pub struct HttpPaymentProcessor {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpPaymentProcessor {
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| AppError::InternalWithMsg(format!("Payment client setup failed: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, idempotency_key: Option<&str>) -> Result<T, AppError> {
        let mut request = request.header("Authorization", format!("Bearer {}", self.api_key));
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let res = request.send().await.map_err(|e| {
            if e.is_connect() {
                AppError::ProcessorUnavailable(format!("Processor connection failed: {}", e))
            } else {
                // The request may have reached the processor.
                AppError::AmbiguousOutcome(format!("Processor request did not complete: {}", e))
            }
        })?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<T>()
                .await
                .map_err(|e| AppError::AmbiguousOutcome(format!("Unreadable processor response: {}", e)));
        }

        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        debug!(%status, "Processor rejected request: {}", message);

        Err(match status {
            StatusCode::PAYMENT_REQUIRED => AppError::CardDeclined(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            // Same key still in flight on the processor side.
            StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                AppError::ProcessorUnavailable(message)
            }
            s if s.is_server_error() => AppError::AmbiguousOutcome(format!("Processor error {}: {}", s, message)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::InvalidHoldState(message),
            s => {
                error!(status = %s, "Unexpected processor response: {}", message);
                AppError::InternalWithMsg(format!("Processor returned {}: {}", s, message))
            }
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Deserialize)]
struct HoldResponse {
    id: String,
    amount: i64,
    #[serde(default)]
    amount_captured: i64,
    #[serde(default)]
    amount_refunded: i64,
    status: String,
}

impl TryFrom<HoldResponse> for ProcessorHold {
    type Error = AppError;

    fn try_from(res: HoldResponse) -> Result<Self, Self::Error> {
        let status = match res.status.as_str() {
            "requires_capture" => ProcessorHoldStatus::RequiresCapture,
            "succeeded" => ProcessorHoldStatus::Succeeded,
            "canceled" => ProcessorHoldStatus::Canceled,
            other => {
                return Err(AppError::InternalWithMsg(format!("Hold {} has unexpected status '{}'", res.id, other)));
            }
        };
        Ok(ProcessorHold {
            hold_ref: res.id,
            amount: res.amount,
            amount_captured: res.amount_captured,
            amount_refunded: res.amount_refunded,
            status,
        })
    }
}

#[derive(Deserialize)]
struct HoldList {
    data: Vec<HoldResponse>,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
}

#[derive(Serialize)]
struct CreateHold<'a> {
    amount: i64,
    currency: String,
    customer: &'a str,
    capture_method: &'static str,
    metadata: HoldMetadata<'a>,
}

#[derive(Serialize)]
struct HoldMetadata<'a> {
    booking_id: &'a str,
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_customer(&self, customer_ref: &str, idempotency_key: &str) -> Result<String, AppError> {
        let body = serde_json::json!({ "metadata": { "customer_ref": customer_ref } });
        let res: CustomerResponse = self
            .send(self.client.post(self.url("/customers")).json(&body), Some(idempotency_key))
            .await?;
        Ok(res.id)
    }

    async fn authorize(&self, request: &AuthorizeRequest) -> Result<ProcessorHold, AppError> {
        let body = CreateHold {
            amount: request.amount,
            currency: request.currency.to_lowercase(),
            customer: &request.processor_customer_id,
            capture_method: "manual",
            metadata: HoldMetadata { booking_id: &request.booking_id },
        };
        let res: HoldResponse = self
            .send(self.client.post(self.url("/payment_intents")).json(&body), Some(&request.idempotency_key))
            .await?;
        res.try_into()
    }

    async fn capture(&self, hold_ref: &str, amount: i64, idempotency_key: &str) -> Result<ProcessorHold, AppError> {
        let body = serde_json::json!({ "amount_to_capture": amount });
        let res: HoldResponse = self
            .send(
                self.client.post(self.url(&format!("/payment_intents/{}/capture", hold_ref))).json(&body),
                Some(idempotency_key),
            )
            .await?;
        res.try_into()
    }

    async fn void(&self, hold_ref: &str, idempotency_key: &str) -> Result<ProcessorHold, AppError> {
        let res: HoldResponse = self
            .send(self.client.post(self.url(&format!("/payment_intents/{}/cancel", hold_ref))), Some(idempotency_key))
            .await?;
        res.try_into()
    }

    async fn refund(&self, hold_ref: &str, amount: i64, idempotency_key: &str) -> Result<ProcessorRefund, AppError> {
        let body = serde_json::json!({ "payment_intent": hold_ref, "amount": amount });
        let res: RefundResponse = self
            .send(self.client.post(self.url("/refunds")).json(&body), Some(idempotency_key))
            .await?;
        Ok(ProcessorRefund { refund_ref: res.id, amount: res.amount })
    }

    async fn retrieve(&self, hold_ref: &str) -> Result<ProcessorHold, AppError> {
        let res: HoldResponse = self
            .send(self.client.get(self.url(&format!("/payment_intents/{}", hold_ref))), None)
            .await?;
        res.try_into()
    }

    async fn find_by_idempotency_key(&self, idempotency_key: &str) -> Result<Option<ProcessorHold>, AppError> {
        let list: HoldList = self
            .send(
                self.client
                    .get(self.url("/payment_intents"))
                    .query(&[("idempotency_key", idempotency_key)]),
                None,
            )
            .await?;
        list.data.into_iter().next().map(ProcessorHold::try_from).transpose()
    }
}
