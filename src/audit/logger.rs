use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::shared::utils::DbPool;
use crate::jobs::{Job, JobKind, JobQueue};

use super::storage::insert_entry;
use super::types::AuditLogEntry;
use super::AuditError;

/// `Sync` writes the row inside the request. `Async` hands the entry to the
/// job queue and the worker writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLogMode {
    #[default]
    Sync,
    Async,
}

impl std::fmt::Display for AuditLogMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

impl std::str::FromStr for AuditLogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(format!("Unknown audit log mode: {other}")),
        }
    }
}

pub struct AuditLogger {
    pool: DbPool,
    queue: Option<JobQueue>,
    mode: AuditLogMode,
}

impl AuditLogger {
    pub fn new(pool: DbPool, queue: Option<JobQueue>, mode: AuditLogMode) -> Self {
        if mode == AuditLogMode::Async && queue.is_none() {
            warn!("Audit log mode is async but no job queue is available; writing inline");
        }
        Self { pool, queue, mode }
    }

    pub fn mode(&self) -> AuditLogMode {
        self.mode
    }

    pub async fn log(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        info!(
            "AUDIT: tenant={} action={} entity={}:{} actor={} outcome={} - {}",
            entry.tenant_id,
            entry.action,
            entry.entity_type,
            entry
                .entity_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry
                .actor_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| entry.actor_type.to_string()),
            entry.outcome,
            entry.description
        );

        if self.mode == AuditLogMode::Async {
            if let Some(queue) = &self.queue {
                match queue.enqueue(&Job::new(JobKind::AuditLog(entry.clone()))).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!("Audit enqueue failed, writing inline: {e}"),
                }
            }
        }

        self.persist(entry).await
    }

    /// Logs and swallows persistence failures. Used where the audited
    /// operation already succeeded and must not be reported as failed.
    pub async fn record(&self, entry: AuditLogEntry) {
        let action = entry.action;
        if let Err(e) = self.log(entry).await {
            error!("Failed to write audit entry for {action}: {e}");
        }
    }

    pub async fn persist(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| AuditError::Database(e.to_string()))?;
            insert_entry(&mut conn, &entry).map_err(|e| AuditError::Database(e.to_string()))?;
            Ok::<_, AuditError>(())
        })
        .await
        .map_err(|e| AuditError::Internal(e.to_string()))?
    }
}
