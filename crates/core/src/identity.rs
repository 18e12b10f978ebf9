use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::user::{Role, UserId};
use crate::errors::ProcurementError;

/// The authenticated caller every manager operation acts on behalf of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Resolves a bearer credential to an [`Actor`], or fails with
/// `Unauthenticated`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &SecretString) -> Result<Actor, ProcurementError>;
}

/// Session tokens are stored as digests so a leaked table cannot be replayed.
pub fn hash_session_token(token: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.expose_secret().as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

pub fn generate_session_token() -> SecretString {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()).into()
}
