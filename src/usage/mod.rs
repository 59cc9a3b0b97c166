pub mod aggregate;
pub mod handlers;
pub mod storage;
pub mod types;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::AuthError;

pub use handlers::*;
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for UsageError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Database(msg) | Self::Internal(msg) => {
                log::error!("Token usage request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn configure_usage_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::TOKEN_USAGE,
            get(handle_usage_summary).post(handle_record_usage),
        )
        .route(ApiUrls::TOKEN_USAGE_USERS, get(handle_user_usage_summary))
        .route(ApiUrls::TOKEN_USAGE_USER, get(handle_user_usage_detail))
}
