pub mod graph;
pub mod handlers;
pub mod lifecycle;
pub mod storage;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod webhook;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::AuthError;

pub use graph::{GraphClient, GraphError};
pub use handlers::*;
pub use lifecycle::{SubscriptionApi, SubscriptionManager, SubscriptionRepository};
pub use storage::PgSubscriptionRepository;
pub use types::*;
pub use webhook::{accept_notifications, handle_change_notification, NotificationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum SharePointError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for SharePointError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Graph(GraphError::UpstreamRateLimit { retry_after }) => {
                let message = GraphError::UpstreamRateLimit { retry_after }.to_string();
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({ "error": message })),
                )
                    .into_response();
                if let Some(value) =
                    retry_after.and_then(|secs| HeaderValue::from_str(&secs.to_string()).ok())
                {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            Self::Graph(e @ GraphError::NotConfigured) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            Self::Graph(e) => {
                log::error!("Graph request failed: {e}");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            Self::Database(msg) | Self::Queue(msg) | Self::Internal(msg) => {
                log::error!("SharePoint request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Builds the lifecycle manager over the shared pool and Graph client.
pub fn subscription_manager(state: &AppState) -> SubscriptionManager {
    SubscriptionManager::new(
        Arc::new(PgSubscriptionRepository::new(state.conn.clone())),
        state.graph.clone(),
        state.config.graph.notification_url.clone(),
    )
    .with_audit(state.audit.clone())
}

pub fn configure_sharepoint_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::SHAREPOINT_SUBSCRIPTIONS,
            get(handle_list_subscriptions).post(handle_create_subscription),
        )
        .route(
            ApiUrls::SHAREPOINT_RENEW_EXPIRING,
            post(handle_renew_expiring),
        )
        .route(
            ApiUrls::SHAREPOINT_RECREATE_EXPIRED,
            post(handle_recreate_expired),
        )
        .route(
            ApiUrls::SHAREPOINT_SUBSCRIPTION_RECREATE,
            post(handle_recreate_subscription),
        )
        .route(
            ApiUrls::SHAREPOINT_SUBSCRIPTION_BY_ID,
            delete(handle_delete_subscription),
        )
        .route(ApiUrls::SHAREPOINT_WEBHOOK, post(handle_change_notification))
}
