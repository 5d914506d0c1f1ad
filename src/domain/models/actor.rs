use serde::{Deserialize, Serialize};

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Professional,
    Admin,
}

impl TryFrom<String> for ActorRole {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "customer" => Ok(ActorRole::Customer),
            "professional" => Ok(ActorRole::Professional),
            "admin" => Ok(ActorRole::Admin),
            _ => Err(UnknownVariant(value)),
        }
    }
}

/// Caller identity as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub reference: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(reference: impl Into<String>, role: ActorRole) -> Self {
        Self { reference: reference.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iss: String,
    pub exp: usize,
}
