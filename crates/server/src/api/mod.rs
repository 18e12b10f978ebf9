//! JSON and multipart HTTP surface over the requisition and tender managers.
//!
//! Every `/api` request runs inside a request context that assigns a
//! correlation id, opens a tracing span carrying it, and bounds the whole
//! handler with the configured deadline. Failures are rendered as
//! `{kind, message, correlation_id}`.

mod bids;
mod context;
mod requisitions;
mod tenders;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use procurement_core::config::AppConfig;
use procurement_core::errors::{ErrorKind, InterfaceError, ProcurementError};
use procurement_core::identity::Authenticator;
use procurement_core::manager::{RequisitionManager, TenderManager};
use procurement_db::{
    DbPool, LocalFileStore, SqlBidRepository, SqlRequisitionRepository, SqlSessionAuthenticator,
    SqlTenderRepository,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

pub use context::{request_context, Caller};

pub type Requisitions = RequisitionManager<SqlRequisitionRepository>;
pub type Tenders = TenderManager<SqlTenderRepository, SqlBidRepository, LocalFileStore>;

/// Room for this many maximum-size uploads in a single bid body.
const BODY_LIMIT_FILES: u64 = 16;

#[derive(Clone)]
pub struct ApiState {
    pub requisitions: Arc<Requisitions>,
    pub tenders: Arc<Tenders>,
    pub authenticator: Arc<dyn Authenticator>,
    pub request_timeout: Duration,
    pub body_limit: usize,
}

impl ApiState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        let requisitions = RequisitionManager::new(SqlRequisitionRepository::new(db_pool.clone()));
        let tenders = TenderManager::new(
            SqlTenderRepository::new(db_pool.clone()),
            SqlBidRepository::new(db_pool.clone()),
            LocalFileStore::from_config(&config.uploads),
        );
        let body_limit = config.uploads.max_file_bytes.saturating_mul(BODY_LIMIT_FILES);

        Self {
            requisitions: Arc::new(requisitions),
            tenders: Arc::new(tenders),
            authenticator: Arc::new(SqlSessionAuthenticator::new(db_pool)),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            body_limit: usize::try_from(body_limit).unwrap_or(usize::MAX),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/requisitions",
            post(requisitions::create_requisition).get(requisitions::list_requisitions),
        )
        .route("/api/requisitions/{id}", get(requisitions::get_requisition))
        .route("/api/requisitions/{id}/action", post(requisitions::apply_action))
        .route("/api/tenders", post(tenders::create_tender).get(tenders::list_tenders))
        .route("/api/tenders/{id}", get(tenders::get_tender).put(tenders::update_tender))
        .route(
            "/api/tenders/{tender_id}/bids",
            post(bids::create_bid).get(bids::list_tender_bids),
        )
        .route("/api/my-bids", get(bids::list_my_bids))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), request_context))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: InterfaceError,
}

impl ApiError {
    pub fn new(error: ProcurementError, correlation_id: &str) -> Self {
        let kind = error.kind();
        match kind {
            ErrorKind::StorageFailure => error!(
                event_name = "http.request.failed",
                correlation_id = %correlation_id,
                kind = kind.as_str(),
                error = %error,
                "request failed on storage"
            ),
            _ => info!(
                event_name = "http.request.refused",
                correlation_id = %correlation_id,
                kind = kind.as_str(),
                error = %error,
                "request refused"
            ),
        }

        Self { status: status_for(kind), body: error.into_interface(correlation_id) }
    }

    /// The deadline expired before the handler finished. Any open transaction
    /// was dropped with the handler future and rolled back.
    pub fn deadline_exceeded(correlation_id: &str, timeout: Duration) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: InterfaceError {
                kind: ErrorKind::StorageFailure,
                message: format!("request did not complete within {}s", timeout.as_secs()),
                correlation_id: correlation_id.to_owned(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
    }
}
