use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::jobs::{Job, JobKind, JobQueue};

use super::lifecycle::SubscriptionManager;
use super::types::{ChangeNotificationCollection, ChangeNotificationJob, WebhookQuery};
use super::{subscription_manager, SharePointError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Graph change-notification endpoint. Answers the subscription handshake
/// by echoing `validationToken`, otherwise queues each notification whose
/// `clientState` matches the stored secret.
pub async fn handle_change_notification(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Response, SharePointError> {
    if let Some(token) = query.validation_token {
        debug!("Answering Graph subscription validation");
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            token,
        )
            .into_response());
    }

    let payload: ChangeNotificationCollection = serde_json::from_slice(&body)
        .map_err(|e| SharePointError::Validation(format!("Invalid notification payload: {e}")))?;

    let manager = subscription_manager(&state);
    let outcome =
        accept_notifications(&manager, state.job_queue.as_ref(), payload, Utc::now()).await;

    Ok((StatusCode::ACCEPTED, Json(outcome)).into_response())
}

/// Verifies and dispatches each notification on its own. A notification
/// that cannot be checked or recorded is counted as failed and the rest of
/// the batch still goes through.
pub async fn accept_notifications(
    manager: &SubscriptionManager,
    queue: Option<&JobQueue>,
    payload: ChangeNotificationCollection,
    received_at: DateTime<Utc>,
) -> NotificationOutcome {
    let mut outcome = NotificationOutcome::default();

    for notification in payload.value {
        let verified = match manager
            .verify_notification(
                &notification.subscription_id,
                notification.client_state.as_deref(),
            )
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                error!(
                    "Could not verify notification for {}: {e}",
                    notification.subscription_id
                );
                outcome.failed += 1;
                continue;
            }
        };
        if verified.is_none() {
            outcome.rejected += 1;
            continue;
        }

        let change = ChangeNotificationJob {
            graph_subscription_id: notification.subscription_id,
            resource: notification.resource,
            change_type: notification.change_type,
            received_at,
        };

        let queued = match queue {
            Some(queue) => match queue
                .enqueue(&Job::new(JobKind::SharePointChange(change.clone())))
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not queue change notification, applying inline: {e}");
                    false
                }
            },
            None => false,
        };

        if !queued {
            if let Err(e) = manager
                .record_notification(&change.graph_subscription_id, change.received_at)
                .await
            {
                error!(
                    "Could not record notification for {}: {e}",
                    change.graph_subscription_id
                );
                outcome.failed += 1;
                continue;
            }
        }
        outcome.accepted += 1;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharepoint::testing::{stored, FakeGraph, MemoryRepo};
    use crate::sharepoint::types::ChangeNotification;
    use chrono::Duration;
    use uuid::Uuid;

    fn notification(subscription_id: &str, client_state: &str) -> ChangeNotification {
        ChangeNotification {
            subscription_id: subscription_id.to_string(),
            client_state: Some(client_state.to_string()),
            change_type: Some("updated".into()),
            resource: Some("drives/d1/root".into()),
            tenant_id: None,
            subscription_expiration_date_time: None,
        }
    }

    async fn setup(fail_writes: bool) -> (Arc<MemoryRepo>, SubscriptionManager) {
        let repo = Arc::new(MemoryRepo {
            fail_writes,
            ..MemoryRepo::default()
        });
        let tenant = Uuid::new_v4();
        repo.rows.lock().await.extend([
            stored(tenant, "d1", Duration::days(5)),
            stored(tenant, "d2", Duration::days(5)),
        ]);
        let manager = SubscriptionManager::new(
            repo.clone(),
            Arc::new(FakeGraph::default()),
            "https://eneo.example/hook",
        );
        (repo, manager)
    }

    #[tokio::test]
    async fn test_inline_notifications_are_recorded() {
        let (repo, manager) = setup(false).await;
        let payload = ChangeNotificationCollection {
            value: vec![
                notification("old-d1", "old-state"),
                notification("old-d2", "forged"),
            ],
        };

        let outcome = accept_notifications(&manager, None, payload, Utc::now()).await;

        assert_eq!(
            outcome,
            NotificationOutcome {
                accepted: 1,
                rejected: 1,
                failed: 0
            }
        );
        let rows = repo.rows.lock().await;
        assert!(rows[0].last_notification_at.is_some());
        assert!(rows[1].last_notification_at.is_none());
    }

    #[tokio::test]
    async fn test_record_failure_does_not_abort_batch() {
        let (_repo, manager) = setup(true).await;
        let payload = ChangeNotificationCollection {
            value: vec![
                notification("old-d1", "old-state"),
                notification("old-d2", "old-state"),
                notification("unknown", "old-state"),
            ],
        };

        let outcome = accept_notifications(&manager, None, payload, Utc::now()).await;

        assert_eq!(
            outcome,
            NotificationOutcome {
                accepted: 0,
                rejected: 1,
                failed: 2
            }
        );
    }
}
