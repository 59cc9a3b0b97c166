use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::security::AuthUser;

use super::types::{
    CreateSubscriptionRequest, RenewExpiringQuery, RenewalReport, SubscriptionView,
    DEFAULT_RENEWAL_THRESHOLD_HOURS,
};
use super::{subscription_manager, SharePointError};

/// Longest window an admin may ask to renew ahead of expiry.
const MAX_THRESHOLD_HOURS: i64 = 24 * 30;

pub async fn handle_list_subscriptions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<SubscriptionView>>, SharePointError> {
    user.require_admin()?;

    let manager = subscription_manager(&state);
    let now = Utc::now();
    let rows = manager.repository().list(user.tenant_id).await?;

    Ok(Json(
        rows.into_iter()
            .map(|sub| SubscriptionView::at(sub, now))
            .collect(),
    ))
}

pub async fn handle_create_subscription(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionView>), SharePointError> {
    user.require_admin()?;
    let target = req.target().map_err(SharePointError::Validation)?;

    let subscription = subscription_manager(&state)
        .create_subscription(user.tenant_id, req.user_integration_id, target, Some(&user))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionView::at(subscription, Utc::now())),
    ))
}

pub async fn handle_renew_expiring(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<RenewExpiringQuery>,
) -> Result<Json<RenewalReport>, SharePointError> {
    user.require_admin()?;

    let hours = query
        .threshold_hours
        .unwrap_or(DEFAULT_RENEWAL_THRESHOLD_HOURS);
    if !(1..=MAX_THRESHOLD_HOURS).contains(&hours) {
        return Err(SharePointError::Validation(format!(
            "threshold_hours must be between 1 and {MAX_THRESHOLD_HOURS}"
        )));
    }

    let report = subscription_manager(&state)
        .renew_expiring(Some(user.tenant_id), Duration::hours(hours), Some(&user))
        .await?;
    Ok(Json(report))
}

pub async fn handle_recreate_expired(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<RenewalReport>, SharePointError> {
    user.require_admin()?;

    let report = subscription_manager(&state)
        .renew_all_expired(Some(user.tenant_id), Some(&user))
        .await?;
    Ok(Json(report))
}

pub async fn handle_recreate_subscription(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SubscriptionView>, SharePointError> {
    user.require_admin()?;

    let subscription = subscription_manager(&state)
        .recreate_by_id(user.tenant_id, id, Some(&user))
        .await?;
    Ok(Json(SubscriptionView::at(subscription, Utc::now())))
}

pub async fn handle_delete_subscription(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, SharePointError> {
    user.require_admin()?;

    subscription_manager(&state)
        .delete_subscription(user.tenant_id, id, Some(&user))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
