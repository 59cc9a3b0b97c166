use chrono::{DateTime, Utc};
use log::{error, info};
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::sharepoint::ChangeNotificationJob;

/// A job is dropped after this many failed attempts.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobKind {
    AuditLog(AuditLogEntry),
    #[serde(rename = "sharepoint_change")]
    SharePointChange(ChangeNotificationJob),
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuditLog(_) => "audit_log",
            Self::SharePointChange(_) => "sharepoint_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub kind: JobKind,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempts: 0,
            enqueued_at: Utc::now(),
            kind,
        }
    }

    /// The same job with one more failed attempt recorded.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts + 1 >= MAX_ATTEMPTS
    }
}

/// A job taken off the queue. `raw` is the exact payload sitting in the
/// processing list, needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    raw: String,
}

/// Reliable queue on two Redis lists. Producers `LPUSH` onto the queue,
/// consumers `BLMOVE` from its tail into a processing list and `LREM` once
/// done. Anything left in processing after a crash is requeued on startup.
#[derive(Clone)]
pub struct JobQueue {
    client: Arc<redis::Client>,
    queue_key: String,
    processing_key: String,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("queue_key", &self.queue_key)
            .finish()
    }
}

impl JobQueue {
    pub fn new(client: Arc<redis::Client>, name: &str) -> Self {
        Self {
            client,
            queue_key: name.to_string(),
            processing_key: format!("{name}:processing"),
        }
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    async fn conn(&self) -> Result<MultiplexedConnection, JobError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn ping(&self) -> Result<(), JobError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    pub async fn enqueue(&self, job: &Job) -> Result<(), JobError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn().await?;
        redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    /// Waits up to `timeout_secs` for the next job.
    pub async fn dequeue(&self, timeout_secs: f64) -> Result<Option<ClaimedJob>, JobError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Job>(&raw) {
            Ok(job) => Ok(Some(ClaimedJob { job, raw })),
            Err(e) => {
                error!("Discarding malformed job payload: {e}");
                redis::cmd("LREM")
                    .arg(&self.processing_key)
                    .arg(1)
                    .arg(&raw)
                    .query_async::<i64>(&mut conn)
                    .await?;
                Ok(None)
            }
        }
    }

    pub async fn ack(&self, claimed: &ClaimedJob) -> Result<(), JobError> {
        let mut conn = self.conn().await?;
        redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&claimed.raw)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    /// Puts the job back on the queue with its attempt count bumped.
    pub async fn retry(&self, claimed: &ClaimedJob) -> Result<(), JobError> {
        let payload = serde_json::to_string(&claimed.job.next_attempt())?;
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&claimed.raw)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Moves jobs stranded in the processing list back to the queue so they
    /// run before anything newer.
    pub async fn requeue_inflight(&self) -> Result<usize, JobError> {
        let mut conn = self.conn().await?;
        let mut moved = 0;
        loop {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            info!("Requeued {moved} in-flight job(s) on {}", self.queue_key);
        }
        Ok(moved)
    }

    /// `(pending, processing)` list lengths.
    pub async fn depth(&self) -> Result<(i64, i64), JobError> {
        let mut conn = self.conn().await?;
        let pending: i64 = redis::cmd("LLEN")
            .arg(&self.queue_key)
            .query_async(&mut conn)
            .await?;
        let processing: i64 = redis::cmd("LLEN")
            .arg(&self.processing_key)
            .query_async(&mut conn)
            .await?;
        Ok((pending, processing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, EntityType};

    #[test]
    fn test_job_envelope_shape() {
        let job = Job::new(JobKind::SharePointChange(ChangeNotificationJob {
            graph_subscription_id: "sub-1".into(),
            resource: Some("drives/d/root".into()),
            change_type: Some("updated".into()),
            received_at: Utc::now(),
        }));
        let json = serde_json::to_value(&job).expect("serialize");
        assert_eq!(json["attempts"], 0);
        assert_eq!(json["kind"]["type"], "sharepoint_change");
        assert_eq!(json["kind"]["payload"]["graph_subscription_id"], "sub-1");

        let back: Job = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, job);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let job = Job::new(JobKind::AuditLog(AuditLogEntry::new(
            Uuid::new_v4(),
            AuditAction::UserLogin,
            EntityType::User,
        )));
        assert!(!job.exhausted());
        let second = job.next_attempt();
        assert_eq!(second.id, job.id);
        assert!(!second.exhausted());
        assert!(second.next_attempt().exhausted());
    }
}
