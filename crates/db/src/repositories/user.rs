use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use procurement_core::domain::user::{NewUser, Role, User, UserId};
use procurement_core::errors::ProcurementError;
use procurement_core::repository::UserRepository;

use super::{parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

/// Account records. Registration and password handling live outside this
/// service.
pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, ProcurementError> {
        let created_at = timestamp(now);
        let result = sqlx::query(
            "INSERT INTO app_user (username, email, role, department, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(user.username.trim())
        .bind(user.email.trim())
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            username: user.username.trim().to_owned(),
            email: user.email.trim().to_owned(),
            role: user.role,
            department: user.department,
            is_active: true,
            created_at: parse_timestamp("created_at", created_at)?,
        })
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, ProcurementError> {
        let row = sqlx::query(
            "SELECT id, username, email, role, department, is_active, created_at
             FROM app_user WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result<(), ProcurementError> {
        let result = sqlx::query("UPDATE app_user SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(timestamp(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        if result.rows_affected() == 0 {
            return Err(ProcurementError::not_found("user", id));
        }
        Ok(())
    }
}

pub(crate) fn parse_role(value: &str) -> Result<Role, RepositoryError> {
    value.parse::<Role>().map_err(|_| RepositoryError::Decode(format!("unknown role `{value}`")))
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        role: parse_role(&role)?,
        department: row.try_get("department")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use procurement_core::domain::user::{NewUser, Role, UserId};
    use procurement_core::errors::ErrorKind;
    use procurement_core::repository::UserRepository;

    use super::SqlUserRepository;
    use crate::repositories::test_support::{setup, user};

    #[tokio::test]
    async fn created_user_round_trips_role() {
        let pool = setup().await;
        let created = user(&pool, "officer", Role::ProcurementOfficer).await;

        let found = SqlUserRepository::new(pool)
            .find_by_id(created.id)
            .await
            .expect("find")
            .expect("user exists");

        assert_eq!(found.role, Role::ProcurementOfficer);
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn mixed_case_stored_role_decodes() {
        let pool = setup().await;
        sqlx::query(
            "INSERT INTO app_user (id, username, email, role, created_at, updated_at)
             VALUES (40, 'legacy', 'legacy@example.test', 'Procurement_Officer',
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert legacy user");

        let found = SqlUserRepository::new(pool)
            .find_by_id(UserId(40))
            .await
            .expect("find")
            .expect("user exists");
        assert_eq!(found.role, Role::ProcurementOfficer);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let pool = setup().await;
        user(&pool, "dup", Role::Requester).await;

        let repo = SqlUserRepository::new(pool);
        let error = repo
            .create(
                NewUser {
                    username: "dup".to_string(),
                    email: "other@example.test".to_string(),
                    role: Role::Requester,
                    department: None,
                },
                chrono::Utc::now(),
            )
            .await
            .expect_err("username is unique");

        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}
