use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::shared::utils::{normalize_page, page_offset, total_pages};
use crate::security::AuthUser;

use super::export::render;
use super::retention::{get_policy, purge_expired_logs, update_policy};
use super::storage::{count_entries, db_audit_to_entry, load_all, load_page, read_snapshot};
use super::types::{
    AuditAction, AuditLogEntry, AuditLogPage, EntityType, ExportAuditLogsQuery,
    ListAuditLogsQuery, PurgeReport, RetentionPolicy, UpdateRetentionPolicyRequest,
};
use super::AuditError;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

pub async fn handle_list_audit_logs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<AuditLogPage>, AuditError> {
    user.require_admin()?;

    let filter = query.filter();
    filter.validate().map_err(AuditError::Validation)?;
    let (page, page_size) =
        normalize_page(query.page, query.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let tenant_id = user.tenant_id;
    let pool = state.conn.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuditError::Database(e.to_string()))?;

        let offset = page_offset(page, page_size);
        let (total_count, rows) = read_snapshot(&mut conn, |conn| {
            let total_count = count_entries(conn, tenant_id, &filter)?;
            let rows = load_page(conn, tenant_id, &filter, offset, page_size)?;
            Ok((total_count, rows))
        })
        .map_err(|e| AuditError::Database(e.to_string()))?;
        let items = rows
            .into_iter()
            .map(db_audit_to_entry)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AuditError::Internal)?;

        Ok::<_, AuditError>(AuditLogPage {
            items,
            total_count,
            page,
            page_size,
            total_pages: total_pages(total_count, page_size),
        })
    })
    .await
    .map_err(|e| AuditError::Internal(e.to_string()))??;

    Ok(Json(result))
}

pub async fn handle_export_audit_logs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ExportAuditLogsQuery>,
) -> Result<Response, AuditError> {
    user.require_admin()?;

    let filter = query.filter();
    filter.validate().map_err(AuditError::Validation)?;
    let format = query.format;
    let tenant_id = user.tenant_id;
    let pool = state.conn.clone();
    let export_filter = filter.clone();

    let entries = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        let rows = load_all(&mut conn, tenant_id, &export_filter)
            .map_err(|e| AuditError::Database(e.to_string()))?;
        rows.into_iter()
            .map(db_audit_to_entry)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AuditError::Internal)
    })
    .await
    .map_err(|e| AuditError::Internal(e.to_string()))??;

    let body = render(&entries, format)?;

    state
        .audit
        .record(
            AuditLogEntry::new(tenant_id, AuditAction::AuditLogExported, EntityType::AuditLog)
                .by_user(&user)
                .with_description(format!("Exported {} audit log entries", entries.len()))
                .with_metadata(serde_json::json!({
                    "format": format,
                    "row_count": entries.len(),
                    "filter": filter,
                })),
        )
        .await;

    let filename = format!(
        "audit-logs-{}.{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn handle_get_retention_policy(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<RetentionPolicy>, AuditError> {
    user.require_admin()?;

    let policy = get_policy(
        &state.conn,
        user.tenant_id,
        state.config.audit.default_retention_days,
    )
    .await?;

    Ok(Json(policy))
}

pub async fn handle_update_retention_policy(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<UpdateRetentionPolicyRequest>,
) -> Result<Json<RetentionPolicy>, AuditError> {
    user.require_admin()?;

    let previous = get_policy(
        &state.conn,
        user.tenant_id,
        state.config.audit.default_retention_days,
    )
    .await?;

    let policy =
        update_policy(&state.conn, user.tenant_id, req.retention_days, user.user_id).await?;

    state
        .audit
        .record(
            AuditLogEntry::new(
                user.tenant_id,
                AuditAction::RetentionPolicyUpdated,
                EntityType::RetentionPolicy,
            )
            .by_user(&user)
            .with_description(format!(
                "Audit retention changed from {} to {} days",
                previous.retention_days, policy.retention_days
            ))
            .with_metadata(serde_json::json!({
                "old_retention_days": previous.retention_days,
                "new_retention_days": policy.retention_days,
            })),
        )
        .await;

    Ok(Json(policy))
}

pub async fn handle_purge_expired_logs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<PurgeReport>, AuditError> {
    user.require_admin()?;

    let report =
        purge_expired_logs(&state.conn, state.config.audit.default_retention_days).await?;

    state
        .audit
        .record(
            AuditLogEntry::new(user.tenant_id, AuditAction::AuditLogsPurged, EntityType::AuditLog)
                .by_user(&user)
                .with_description(format!("Manual purge removed {} entries", report.deleted))
                .with_metadata(serde_json::to_value(&report).unwrap_or_default()),
        )
        .await;

    Ok(Json(report))
}
