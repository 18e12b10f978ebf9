use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Forbidden,
    NotFound,
    InvalidState,
    Conflict,
    StorageFailure,
    Unauthenticated,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Conflict => "conflict",
            Self::StorageFailure => "storage_failure",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProcurementError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl ProcurementError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
        }
    }

    /// Maps to the caller-facing shape. Storage detail stays in the logs; the
    /// interface only ever carries a fixed message for that kind.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = self.kind();
        let message = match self {
            Self::StorageFailure(_) => STORAGE_FAILURE_MESSAGE.to_owned(),
            Self::InvalidInput(message)
            | Self::Forbidden(message)
            | Self::InvalidState(message)
            | Self::Conflict(message)
            | Self::Unauthenticated(message) => message,
            not_found @ Self::NotFound { .. } => not_found.to_string(),
        };

        InterfaceError { kind, message, correlation_id: correlation_id.into() }
    }
}

const STORAGE_FAILURE_MESSAGE: &str = "an internal error occurred";

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}: {message}", .kind.as_str())]
pub struct InterfaceError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidInput => {
                "The request could not be processed. Check inputs and try again."
            }
            ErrorKind::Forbidden => "You are not allowed to perform this action.",
            ErrorKind::NotFound => "The requested record does not exist.",
            ErrorKind::InvalidState => "The record is not in a state that allows this action.",
            ErrorKind::Conflict => "The record was changed concurrently. Reload and retry.",
            ErrorKind::StorageFailure => "An unexpected internal error occurred.",
            ErrorKind::Unauthenticated => "Sign in to continue.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ErrorKind, ProcurementError};

    #[test]
    fn validation_error_keeps_first_violation_in_interface_message() {
        let interface = ProcurementError::invalid_input("item 2: quantity must be greater than zero")
            .into_interface("req-1");

        assert_eq!(interface.kind, ErrorKind::InvalidInput);
        assert_eq!(interface.correlation_id, "req-1");
        assert!(interface.message.contains("item 2"));
    }

    #[test]
    fn storage_failure_does_not_leak_driver_text() {
        let interface =
            ProcurementError::storage("error returned from database: database is locked")
                .into_interface("req-2");

        assert_eq!(interface.kind, ErrorKind::StorageFailure);
        assert!(!interface.message.contains("database is locked"));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn not_found_names_entity_and_id() {
        let interface = ProcurementError::not_found("requisition", 42).into_interface("req-3");

        assert_eq!(interface.kind, ErrorKind::NotFound);
        assert_eq!(interface.message, "requisition 42 not found");
    }

    #[test]
    fn kind_strings_are_snake_case() {
        assert_eq!(ProcurementError::forbidden("x").kind().as_str(), "forbidden");
        assert_eq!(ProcurementError::invalid_state("x").kind().as_str(), "invalid_state");
        assert_eq!(ProcurementError::conflict("x").kind().as_str(), "conflict");
    }
}
