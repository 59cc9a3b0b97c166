use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::core::shared::utils::DbPool;

use super::storage::{self, DbRetentionPolicy};
use super::types::{PurgeReport, RetentionPolicy};
use super::AuditError;

pub const MIN_RETENTION_DAYS: i32 = 1;
/// Seven years.
pub const MAX_RETENTION_DAYS: i32 = 2555;

pub fn validate_retention_days(days: i32) -> Result<i32, AuditError> {
    if (MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(AuditError::Validation(format!(
            "retention_days must be between {MIN_RETENTION_DAYS} and {MAX_RETENTION_DAYS}, got {days}"
        )))
    }
}

fn policy_from_db(db: DbRetentionPolicy) -> RetentionPolicy {
    RetentionPolicy {
        tenant_id: db.tenant_id,
        retention_days: db.retention_days,
        is_default: false,
        updated_by: db.updated_by,
        updated_at: Some(db.updated_at),
    }
}

fn default_policy(tenant_id: Uuid, default_days: i32) -> RetentionPolicy {
    RetentionPolicy {
        tenant_id,
        retention_days: default_days,
        is_default: true,
        updated_by: None,
        updated_at: None,
    }
}

pub async fn get_policy(
    pool: &DbPool,
    tenant_id: Uuid,
    default_days: i32,
) -> Result<RetentionPolicy, AuditError> {
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        let found = storage::find_policy(&mut conn, tenant_id)
            .map_err(|e| AuditError::Database(e.to_string()))?;
        Ok(found
            .map(policy_from_db)
            .unwrap_or_else(|| default_policy(tenant_id, default_days)))
    })
    .await
    .map_err(|e| AuditError::Internal(e.to_string()))?
}

pub async fn update_policy(
    pool: &DbPool,
    tenant_id: Uuid,
    retention_days: i32,
    updated_by: Uuid,
) -> Result<RetentionPolicy, AuditError> {
    let retention_days = validate_retention_days(retention_days)?;
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        let row = DbRetentionPolicy {
            tenant_id,
            retention_days,
            updated_by: Some(updated_by),
            updated_at: Utc::now(),
        };
        let saved = storage::upsert_policy(&mut conn, &row)
            .map_err(|e| AuditError::Database(e.to_string()))?;
        Ok(policy_from_db(saved))
    })
    .await
    .map_err(|e| AuditError::Internal(e.to_string()))?
}

/// Deletes every audit row older than its tenant's retention window.
pub async fn purge_expired_logs(
    pool: &DbPool,
    default_days: i32,
) -> Result<PurgeReport, AuditError> {
    let default_days = validate_retention_days(default_days)?;
    let pool = pool.clone();

    let report = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| AuditError::Database(e.to_string()))?;
        storage::purge_expired(&mut conn, default_days, Utc::now())
            .map_err(|e| AuditError::Database(e.to_string()))
    })
    .await
    .map_err(|e| AuditError::Internal(e.to_string()))??;

    info!(
        "Audit retention purge removed {} entries across {} tenants",
        report.deleted, report.tenants_processed
    );
    Ok(report)
}
