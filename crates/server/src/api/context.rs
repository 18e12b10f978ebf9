use std::time::Instant;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use procurement_core::errors::ProcurementError;
use procurement_core::identity::Actor;
use secrecy::SecretString;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{ApiError, ApiState};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

const MAX_INBOUND_CORRELATION_LEN: usize = 64;

#[derive(Clone, Debug)]
struct CorrelationId(String);

/// Assigns the correlation id, runs the handler inside a span that carries it
/// and enforces the request deadline.
pub async fn request_context(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Response {
    let correlation_id = inbound_correlation_id(request.headers())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    request.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let started = Instant::now();

    let outcome =
        tokio::time::timeout(state.request_timeout, next.run(request)).instrument(span.clone()).await;
    let mut response = match outcome {
        Ok(response) => response,
        Err(_) => {
            warn!(
                parent: &span,
                event_name = "http.request.timeout",
                timeout_secs = state.request_timeout.as_secs(),
                "request deadline exceeded"
            );
            ApiError::deadline_exceeded(&correlation_id, state.request_timeout).into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    info!(
        parent: &span,
        event_name = "http.request.completed",
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

fn inbound_correlation_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CORRELATION_HEADER)?.to_str().ok()?.trim();
    let acceptable = !value.is_empty()
        && value.len() <= MAX_INBOUND_CORRELATION_LEN
        && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    acceptable.then(|| value.to_owned())
}

fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| SecretString::from(token.to_owned()))
}

/// The authenticated caller of an `/api` handler.
#[derive(Clone, Debug)]
pub struct Caller {
    pub actor: Actor,
    pub correlation_id: String,
}

impl Caller {
    pub fn fail(&self, error: ProcurementError) -> ApiError {
        ApiError::new(error, &self.correlation_id)
    }

    /// A request body or path the extractor could not decode.
    pub fn malformed(&self, detail: impl Into<String>) -> ApiError {
        self.fail(ProcurementError::invalid_input(detail))
    }
}

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<CorrelationId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::new(
                ProcurementError::unauthenticated("a bearer token is required"),
                &correlation_id,
            )
        })?;
        let actor = state
            .authenticator
            .authenticate(&token)
            .await
            .map_err(|error| ApiError::new(error, &correlation_id))?;

        Ok(Self { actor, correlation_id })
    }
}
