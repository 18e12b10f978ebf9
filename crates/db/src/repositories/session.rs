use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use sqlx::Row;

use procurement_core::domain::user::UserId;
use procurement_core::errors::ProcurementError;
use procurement_core::identity::{generate_session_token, hash_session_token, Actor, Authenticator};

use super::user::parse_role;
use super::{timestamp, RepositoryError};
use crate::DbPool;

/// Bearer sessions backed by the `session` table. Only token digests are
/// stored.
pub struct SqlSessionAuthenticator {
    pool: DbPool,
}

impl SqlSessionAuthenticator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens a session for `user_id` and returns the raw token. The token is
    /// not recoverable afterwards.
    pub async fn issue(
        &self,
        user_id: UserId,
        ttl: Duration,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SecretString, RepositoryError> {
        let token = generate_session_token();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO session (user_id, token_hash, expires_at, created_at, ip_address,
                                  user_agent, is_valid)
             VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(user_id.0)
        .bind(hash_session_token(&token))
        .bind(timestamp(now + ttl))
        .bind(timestamp(now))
        .bind(ip_address)
        .bind(user_agent)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn revoke(&self, token: &SecretString) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE session SET is_valid = 0 WHERE token_hash = ?")
            .bind(hash_session_token(token))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Authenticator for SqlSessionAuthenticator {
    async fn authenticate(&self, token: &SecretString) -> Result<Actor, ProcurementError> {
        let row = sqlx::query(
            "SELECT u.id AS user_id, u.role AS role
             FROM session s
             JOIN app_user u ON u.id = s.user_id
             WHERE s.token_hash = ? AND s.is_valid = 1 AND s.expires_at > ? AND u.is_active = 1",
        )
        .bind(hash_session_token(token))
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| ProcurementError::unauthenticated("session is invalid or expired"))?;

        let role: String = row.try_get("role").map_err(RepositoryError::from)?;
        Ok(Actor::new(
            UserId(row.try_get("user_id").map_err(RepositoryError::from)?),
            parse_role(&role)?,
        ))
    }
}
