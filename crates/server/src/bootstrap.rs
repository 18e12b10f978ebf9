use procurement_core::config::{AppConfig, ConfigError, LoadOptions};
use procurement_db::{connect_from_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("uploads directory `{path}` could not be prepared: {source}")]
    Uploads { path: String, source: std::io::Error },
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and prepares the uploads root for an already loaded
/// configuration.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let uploads_root = &config.uploads.root_dir;
    tokio::fs::create_dir_all(uploads_root).await.map_err(|source| BootstrapError::Uploads {
        path: uploads_root.display().to_string(),
        source,
    })?;
    info!(
        event_name = "system.bootstrap.uploads_ready",
        correlation_id = "bootstrap",
        uploads_root = %uploads_root.display(),
        "uploads directory ready"
    );

    Ok(Application { config, db_pool })
}

#[cfg(test)]
mod tests {
    use procurement_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str, uploads: &std::path::Path) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                uploads_root_dir: Some(uploads.to_path_buf()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_and_creates_uploads_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = dir.path().join("nested").join("uploads");

        let app = bootstrap(overrides("sqlite::memory:?cache=shared", &uploads))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('requisition', 'tender', 'bid', 'session')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4);
        assert!(uploads.is_dir());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let dir = tempfile::tempdir().expect("tempdir");

        let result = bootstrap(overrides("postgres://localhost/procurement", dir.path())).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"), "unexpected error: {message}");
    }
}
