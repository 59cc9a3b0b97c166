use chrono::{DateTime, Utc};
use cron::Schedule;
use log::{error, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::audit::purge_expired_logs;
use crate::core::config::JobsConfig;
use crate::core::shared::utils::DbPool;
use crate::sharepoint::{SubscriptionManager, DEFAULT_RENEWAL_THRESHOLD_HOURS};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression {expression:?}: {message}")]
    InvalidSchedule { expression: String, message: String },
    #[error("Renewal interval must be at least one hour")]
    InvalidInterval,
}

/// First fire time strictly after `after`.
pub fn next_run(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Periodic maintenance: subscription renewal on a fixed interval and the
/// audit retention purge on a cron schedule (UTC).
pub struct Scheduler {
    subscriptions: Arc<SubscriptionManager>,
    pool: DbPool,
    default_retention_days: i32,
    renewal_interval: std::time::Duration,
    purge_schedule: Schedule,
}

impl Scheduler {
    pub fn new(
        subscriptions: Arc<SubscriptionManager>,
        pool: DbPool,
        default_retention_days: i32,
        config: &JobsConfig,
    ) -> Result<Self, SchedulerError> {
        if config.renewal_interval_hours == 0 {
            return Err(SchedulerError::InvalidInterval);
        }
        let purge_schedule = Schedule::from_str(&config.retention_purge_schedule).map_err(|e| {
            SchedulerError::InvalidSchedule {
                expression: config.retention_purge_schedule.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            subscriptions,
            pool,
            default_retention_days,
            renewal_interval: std::time::Duration::from_secs(config.renewal_interval_hours * 3600),
            purge_schedule,
        })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Scheduler started: renewal every {}h, retention purge next at {}",
            self.renewal_interval.as_secs() / 3600,
            next_run(&self.purge_schedule, Utc::now())
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );

        tokio::join!(
            self.renewal_loop(shutdown.clone()),
            self.purge_loop(shutdown)
        );

        info!("Scheduler stopped");
    }

    async fn renewal_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.renewal_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.renew_subscriptions().await,
            }
        }
    }

    async fn purge_loop(&self, shutdown: CancellationToken) {
        loop {
            let now = Utc::now();
            let Some(next) = next_run(&self.purge_schedule, now) else {
                warn!("Retention purge schedule has no upcoming runs");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => self.purge_audit_logs().await,
            }
        }
    }

    pub async fn renew_subscriptions(&self) {
        let threshold = chrono::Duration::hours(DEFAULT_RENEWAL_THRESHOLD_HOURS);
        match self
            .subscriptions
            .renew_expiring(None, threshold, None)
            .await
        {
            Ok(report) if report.failed > 0 => warn!(
                "Scheduled renewal: {} recreated, {} failed",
                report.recreated, report.failed
            ),
            Ok(report) => info!("Scheduled renewal: {} recreated", report.recreated),
            Err(e) => error!("Scheduled renewal could not run: {e}"),
        }
    }

    pub async fn purge_audit_logs(&self) {
        if let Err(e) = purge_expired_logs(&self.pool, self.default_retention_days).await {
            error!("Scheduled retention purge failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_daily_purge_runs_at_two_utc() {
        let schedule = Schedule::from_str("0 0 2 * * *").expect("schedule");

        let before = Utc.with_ymd_and_hms(2025, 3, 10, 1, 30, 0).unwrap();
        assert_eq!(
            next_run(&schedule, before),
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap())
        );

        let after = Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(
            next_run(&schedule, after),
            Some(Utc.with_ymd_and_hms(2025, 3, 11, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_schedule_is_rejected() {
        assert!(Schedule::from_str("every night").is_err());
    }
}
