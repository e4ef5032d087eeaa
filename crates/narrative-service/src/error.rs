// crates/narrative-service/src/error.rs
// ============================================================================
// Module: Service Errors
// Description: Fatal, request-level errors mapped to 5xx/4xx per the
//              engine's error propagation policy.
// Purpose: Keep gate/rule outcomes (never errors) separate from genuine
//          store-boundary and transport failures.
// Dependencies: axum, narrative-core, narrative-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! Errors at the store boundary are fatal to the request; errors in the
//! gate or applier become structured `ValidationResult`s instead. This
//! module only ever carries the former — a [`ValidationResult`](narrative_core::gate::ValidationResult)
//! with a non-`Pass` action is a normal 200 response body, not an error.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use narrative_core::interfaces::EventLogError;
use narrative_core::interfaces::StoreError;
use serde_json::json;
use thiserror::Error;

/// Fatal request-level errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The persisted state failed to load, parse, or pass referential
    /// integrity even after the location auto-materialiser ran.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    /// The event log failed to append a committed event, including an
    /// `event_id` collision (a programmer error).
    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),
    /// The request body failed to deserialize.
    #[error("invalid request body: {0}")]
    BadRequest(String),
    /// The optional RAG collaborator is not configured in this deployment.
    #[error("retrieval is not configured")]
    RagUnavailable,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Store(_) | Self::EventLog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RagUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
