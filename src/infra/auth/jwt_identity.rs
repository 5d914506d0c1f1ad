use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::domain::models::actor::{Actor, ActorRole, Claims};
use crate::domain::ports::IdentityProvider;
use crate::error::AppError;

/// Resolves HS256 bearer tokens issued by the platform's auth service.
pub struct JwtIdentityProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Mints a token for `actor`; used by tooling and tests.
    pub fn issue(&self, actor: &Actor, ttl: Duration) -> Result<String, AppError> {
        let role = match actor.role {
            ActorRole::Customer => "customer",
            ActorRole::Professional => "professional",
            ActorRole::Admin => "admin",
        };
        let claims = Claims {
            sub: actor.reference.clone(),
            role: role.to_string(),
            iss: self.issuer.clone(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalWithMsg(format!("Token encoding failed: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Actor, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|_| AppError::Unauthorized)?;
        let role = ActorRole::try_from(data.claims.role).map_err(|_| AppError::Unauthorized)?;
        Ok(Actor::new(data.claims.sub, role))
    }
}
