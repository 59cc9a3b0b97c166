//! Liveness and readiness endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use crate::core::shared::state::AppState;

const SERVICE_NAME: &str = "eneo";

pub fn readiness(db_ok: bool) -> (StatusCode, &'static str) {
    if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    }
}

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let pool = state.conn.clone();
    let db_ok = tokio::task::spawn_blocking(move || {
        pool.get()
            .ok()
            .map(|mut conn| diesel::sql_query("SELECT 1").execute(&mut conn).is_ok())
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false);

    let queue = match &state.job_queue {
        Some(queue) => {
            if queue.ping().await.is_ok() {
                "up"
            } else {
                "down"
            }
        }
        None => "disabled",
    };

    let (code, status) = readiness(db_ok);

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok,
            "queue": queue,
            "audit_mode": state.audit.mode(),
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
