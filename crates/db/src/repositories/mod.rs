use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use procurement_core::errors::ProcurementError;

pub mod bid;
pub mod requisition;
pub mod session;
pub mod tender;
pub mod user;

pub use bid::SqlBidRepository;
pub use requisition::SqlRequisitionRepository;
pub use session::SqlSessionAuthenticator;
pub use tender::SqlTenderRepository;
pub use user::SqlUserRepository;

/// Parent ids are bound into `IN (...)` lists at most this many at a time,
/// below SQLite's bound-parameter limit.
pub(crate) const IN_LIST_CHUNK: usize = 500;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ProcurementError {
    fn from(error: RepositoryError) -> Self {
        match &error {
            RepositoryError::Database(sqlx::Error::Database(db))
                if db.is_unique_violation() =>
            {
                ProcurementError::conflict(db.message().to_owned())
            }
            _ => ProcurementError::storage(error.to_string()),
        }
    }
}

/// Timestamps are written with a fixed precision and a `Z` suffix so that
/// text comparison in SQL orders them chronologically.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim()).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|decimal| parse_decimal(column, &decimal)).transpose()
}
