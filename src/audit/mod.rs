pub mod export;
pub mod handlers;
pub mod logger;
pub mod retention;
pub mod storage;
pub mod types;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::AuthError;

pub use handlers::*;
pub use logger::{AuditLogMode, AuditLogger};
pub use retention::{
    purge_expired_logs, validate_retention_days, MAX_RETENTION_DAYS, MIN_RETENTION_DAYS,
};
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for AuditError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Database(msg) | Self::Queue(msg) | Self::Internal(msg) => {
                log::error!("Audit request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn configure_audit_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUDIT_LOGS, get(handle_list_audit_logs))
        .route(ApiUrls::AUDIT_LOGS_EXPORT, get(handle_export_audit_logs))
        .route(
            ApiUrls::AUDIT_RETENTION_POLICY,
            get(handle_get_retention_policy).put(handle_update_retention_policy),
        )
        .route(ApiUrls::AUDIT_RETENTION_PURGE, post(handle_purge_expired_logs))
}
