use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogEntry, EntityType};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{normalize_page, page_offset, total_pages, DbPool};
use crate::security::AuthUser;

use super::aggregate::{by_model, by_user, totals, UsageRow};
use super::storage::{insert_usage, load_rows, DbTokenUsage};
use super::types::{
    RecordUsageRequest, TokenUsageRecord, TokenUsageSummary, UserUsageDetail, UserUsagePage,
    UserUsageQuery, UsageWindowQuery,
};
use super::UsageError;

pub const DEFAULT_USER_PAGE_SIZE: i64 = 50;
pub const MAX_USER_PAGE_SIZE: i64 = 500;

async fn fetch_rows(
    pool: &DbPool,
    tenant_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> Result<Vec<UsageRow>, UsageError> {
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| UsageError::Database(e.to_string()))?;
        load_rows(&mut conn, tenant_id, start, end, user_id)
            .map_err(|e| UsageError::Database(e.to_string()))
    })
    .await
    .map_err(|e| UsageError::Internal(e.to_string()))?
}

pub async fn handle_usage_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<UsageWindowQuery>,
) -> Result<Json<TokenUsageSummary>, UsageError> {
    user.require_admin()?;

    let (start, end) = query.resolve(Utc::now()).map_err(UsageError::Validation)?;
    let rows = fetch_rows(&state.conn, user.tenant_id, start, end, None).await?;

    Ok(Json(TokenUsageSummary {
        start_date: start,
        end_date: end,
        totals: totals(&rows),
        models: by_model(&rows),
    }))
}

pub async fn handle_user_usage_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<UserUsageQuery>,
) -> Result<Json<UserUsagePage>, UsageError> {
    user.require_admin()?;

    let (start, end) = query
        .window()
        .resolve(Utc::now())
        .map_err(UsageError::Validation)?;
    let (page, page_size) = normalize_page(
        query.page,
        query.page_size,
        DEFAULT_USER_PAGE_SIZE,
        MAX_USER_PAGE_SIZE,
    );

    let rows = fetch_rows(&state.conn, user.tenant_id, start, end, None).await?;
    let ranked = by_user(&rows, query.sort_by);
    let total_count = ranked.len() as i64;

    let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
    let items = ranked
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();

    Ok(Json(UserUsagePage {
        start_date: start,
        end_date: end,
        items,
        total_count,
        page,
        page_size,
        total_pages: total_pages(total_count, page_size),
    }))
}

pub async fn handle_user_usage_detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UsageWindowQuery>,
) -> Result<Json<UserUsageDetail>, UsageError> {
    user.require_admin()?;

    let (start, end) = query.resolve(Utc::now()).map_err(UsageError::Validation)?;
    let rows = fetch_rows(&state.conn, user.tenant_id, start, end, Some(user_id)).await?;

    Ok(Json(UserUsageDetail {
        user_id,
        start_date: start,
        end_date: end,
        totals: totals(&rows),
        models: by_model(&rows),
    }))
}

pub async fn handle_record_usage(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<RecordUsageRequest>,
) -> Result<(StatusCode, Json<TokenUsageRecord>), UsageError> {
    user.require_admin()?;
    req.validate().map_err(UsageError::Validation)?;

    let row = DbTokenUsage {
        id: Uuid::new_v4(),
        tenant_id: user.tenant_id,
        user_id: req.user_id,
        assistant_id: req.assistant_id,
        model_name: req.model_name.trim().to_string(),
        input_tokens: req.input_tokens,
        output_tokens: req.output_tokens,
        created_at: Utc::now(),
    };
    let pool = state.conn.clone();

    let record: TokenUsageRecord = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| UsageError::Database(e.to_string()))?;
        insert_usage(&mut conn, &row)
            .map(TokenUsageRecord::from)
            .map_err(|e| UsageError::Database(e.to_string()))
    })
    .await
    .map_err(|e| UsageError::Internal(e.to_string()))??;

    state
        .audit
        .record(
            AuditLogEntry::new(
                user.tenant_id,
                AuditAction::TokenUsageRecorded,
                EntityType::TokenUsage,
            )
            .by_user(&user)
            .with_entity(record.id)
            .with_description(format!(
                "Recorded {} tokens for {}",
                record.input_tokens + record.output_tokens,
                record.model_name
            )),
        )
        .await;

    Ok((StatusCode::CREATED, Json(record)))
}
