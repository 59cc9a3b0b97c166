use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLogger;
use crate::sharepoint::{ChangeNotificationJob, SubscriptionManager};

use super::queue::{ClaimedJob, Job, JobKind, JobQueue, MAX_ATTEMPTS};

const POLL_TIMEOUT_SECS: f64 = 5.0;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Done,
    Retry,
    Drop,
}

pub fn disposition(job: &Job, result: &Result<(), String>) -> Disposition {
    match result {
        Ok(()) => Disposition::Done,
        Err(_) if job.exhausted() => Disposition::Drop,
        Err(_) => Disposition::Retry,
    }
}

pub struct Worker {
    queue: JobQueue,
    audit: Arc<AuditLogger>,
    subscriptions: Arc<SubscriptionManager>,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        audit: Arc<AuditLogger>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            queue,
            audit,
            subscriptions,
        }
    }

    /// Consumes jobs until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        if let Err(e) = self.queue.requeue_inflight().await {
            warn!("Could not requeue in-flight jobs: {e}");
        }
        info!("Worker started on queue {}", self.queue.queue_key());

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue(POLL_TIMEOUT_SECS) => next,
            };

            match next {
                Ok(Some(claimed)) => self.handle(claimed).await,
                Ok(None) => {}
                Err(e) => {
                    error!("Job queue unavailable: {e}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    async fn handle(&self, claimed: ClaimedJob) {
        let job = &claimed.job;
        debug!(
            "Processing job {} ({}) attempt {}",
            job.id,
            job.kind.name(),
            job.attempts + 1
        );

        let result = self.process(job).await;
        let outcome = match disposition(job, &result) {
            Disposition::Done => self.queue.ack(&claimed).await,
            Disposition::Retry => {
                warn!(
                    "Job {} ({}) failed, will retry: {}",
                    job.id,
                    job.kind.name(),
                    result.as_ref().err().map(String::as_str).unwrap_or_default()
                );
                self.queue.retry(&claimed).await
            }
            Disposition::Drop => {
                error!(
                    "Job {} ({}) failed {} times, dropping: {}",
                    job.id,
                    job.kind.name(),
                    MAX_ATTEMPTS,
                    result.as_ref().err().map(String::as_str).unwrap_or_default()
                );
                self.queue.ack(&claimed).await
            }
        };

        if let Err(e) = outcome {
            error!("Could not settle job {} on the queue: {e}", job.id);
        }
    }

    pub async fn process(&self, job: &Job) -> Result<(), String> {
        match &job.kind {
            JobKind::AuditLog(entry) => self
                .audit
                .persist(entry.clone())
                .await
                .map_err(|e| e.to_string()),
            JobKind::SharePointChange(change) => self.apply_change(change).await,
        }
    }

    async fn apply_change(&self, change: &ChangeNotificationJob) -> Result<(), String> {
        let found = self
            .subscriptions
            .record_notification(&change.graph_subscription_id, change.received_at)
            .await
            .map_err(|e| e.to_string())?;
        if found {
            info!(
                "SharePoint change on {} via subscription {}",
                change.resource.as_deref().unwrap_or("-"),
                change.graph_subscription_id
            );
        } else {
            warn!(
                "Change notification for unknown subscription {}",
                change.graph_subscription_id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditLogEntry, EntityType};
    use uuid::Uuid;

    fn job(attempts: u32) -> Job {
        Job {
            attempts,
            ..Job::new(JobKind::AuditLog(AuditLogEntry::new(
                Uuid::new_v4(),
                AuditAction::FileUploaded,
                EntityType::File,
            )))
        }
    }

    #[test]
    fn test_disposition() {
        let failed: Result<(), String> = Err("db down".into());
        assert_eq!(disposition(&job(0), &Ok(())), Disposition::Done);
        assert_eq!(disposition(&job(0), &failed), Disposition::Retry);
        assert_eq!(disposition(&job(1), &failed), Disposition::Retry);
        assert_eq!(disposition(&job(2), &failed), Disposition::Drop);
        assert_eq!(disposition(&job(2), &Ok(())), Disposition::Done);
    }
}
