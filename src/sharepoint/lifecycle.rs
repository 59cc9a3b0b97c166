use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogEntry, AuditLogger, EntityType};
use crate::security::AuthUser;

use super::graph::{GraphClient, GraphError, GraphSubscription, NewGraphSubscription};
use super::types::{
    RenewalFailure, RenewalReport, SharePointSubscription, SubscriptionTarget, CHANGE_TYPE,
    SUBSCRIPTION_LIFETIME_DAYS,
};
use super::SharePointError;

const CLIENT_STATE_LEN: usize = 48;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn upsert(
        &self,
        subscription: SharePointSubscription,
    ) -> Result<SharePointSubscription, SharePointError>;
    async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SharePointSubscription>, SharePointError>;
    async fn find_by_resource(
        &self,
        tenant_id: Uuid,
        resource: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError>;
    async fn find_by_graph_id(
        &self,
        graph_subscription_id: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError>;
    async fn list(&self, tenant_id: Uuid) -> Result<Vec<SharePointSubscription>, SharePointError>;
    /// Rows with `expires_at <= cutoff`, for one tenant or all of them.
    async fn expiring_before(
        &self,
        tenant_id: Option<Uuid>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SharePointSubscription>, SharePointError>;
    async fn delete(&self, id: Uuid) -> Result<bool, SharePointError>;
    async fn mark_notified(
        &self,
        graph_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, SharePointError>;
}

/// The Graph operations the lifecycle depends on.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn create(&self, request: &NewGraphSubscription)
        -> Result<GraphSubscription, GraphError>;
    async fn delete(&self, subscription_id: &str) -> Result<(), GraphError>;
}

#[async_trait]
impl SubscriptionApi for GraphClient {
    async fn create(
        &self,
        request: &NewGraphSubscription,
    ) -> Result<GraphSubscription, GraphError> {
        self.create_subscription(request).await
    }

    async fn delete(&self, subscription_id: &str) -> Result<(), GraphError> {
        self.delete_subscription(subscription_id).await
    }
}

fn generate_client_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CLIENT_STATE_LEN)
        .map(char::from)
        .collect()
}

pub struct SubscriptionManager {
    repo: Arc<dyn SubscriptionRepository>,
    api: Arc<dyn SubscriptionApi>,
    notification_url: String,
    audit: Option<Arc<AuditLogger>>,
}

impl SubscriptionManager {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        api: Arc<dyn SubscriptionApi>,
        notification_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            api,
            notification_url: notification_url.into(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn repository(&self) -> &Arc<dyn SubscriptionRepository> {
        &self.repo
    }

    async fn audit(
        &self,
        subscription: &SharePointSubscription,
        action: AuditAction,
        actor: Option<&AuthUser>,
        description: String,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut entry = AuditLogEntry::new(
            subscription.tenant_id,
            action,
            EntityType::SharepointSubscription,
        )
        .with_entity(subscription.id)
        .with_description(description)
        .with_metadata(serde_json::json!({
            "resource": subscription.resource,
            "graph_subscription_id": subscription.graph_subscription_id,
            "expires_at": subscription.expires_at,
        }));
        if let Some(user) = actor {
            entry = entry.by_user(user);
        }
        audit.record(entry).await;
    }

    /// Registers a Graph subscription for `target` and stores it. An
    /// existing subscription on the same resource is replaced once the new
    /// one is in place.
    pub async fn create_subscription(
        &self,
        tenant_id: Uuid,
        user_integration_id: Uuid,
        target: SubscriptionTarget,
        actor: Option<&AuthUser>,
    ) -> Result<SharePointSubscription, SharePointError> {
        let resource = target.resource();
        let existing = self.repo.find_by_resource(tenant_id, &resource).await?;

        let subscription = self
            .register(tenant_id, user_integration_id, &target, Uuid::new_v4())
            .await?;
        if let Some(existing) = existing {
            self.release(&existing).await;
        }
        self.audit(
            &subscription,
            AuditAction::SharepointSubscriptionCreated,
            actor,
            format!("Created SharePoint subscription on {}", subscription.resource),
        )
        .await;
        Ok(subscription)
    }

    /// Replaces the Graph subscription behind an existing row. The old
    /// subscription is only deleted after its replacement is stored, so a
    /// failed renewal leaves it running until its own expiry.
    pub async fn recreate(
        &self,
        existing: &SharePointSubscription,
        actor: Option<&AuthUser>,
    ) -> Result<SharePointSubscription, SharePointError> {
        let target = existing.target().map_err(SharePointError::Validation)?;

        let renewed = self
            .register(
                existing.tenant_id,
                existing.user_integration_id,
                &target,
                existing.id,
            )
            .await?;
        self.release(existing).await;
        self.audit(
            &renewed,
            AuditAction::SharepointSubscriptionRenewed,
            actor,
            format!(
                "Recreated SharePoint subscription on {} (was {})",
                renewed.resource, existing.graph_subscription_id
            ),
        )
        .await;
        Ok(renewed)
    }

    pub async fn recreate_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        actor: Option<&AuthUser>,
    ) -> Result<SharePointSubscription, SharePointError> {
        let existing = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| SharePointError::NotFound(format!("Subscription {id} not found")))?;
        self.recreate(&existing, actor).await
    }

    /// Recreates every subscription expiring within `threshold`, including
    /// ones already expired.
    pub async fn renew_expiring(
        &self,
        tenant_id: Option<Uuid>,
        threshold: Duration,
        actor: Option<&AuthUser>,
    ) -> Result<RenewalReport, SharePointError> {
        let cutoff = Utc::now() + threshold;
        let due = self.repo.expiring_before(tenant_id, cutoff).await?;
        info!(
            "Renewing {} SharePoint subscription(s) expiring before {cutoff}",
            due.len()
        );
        Ok(self.renew_batch(due, actor).await)
    }

    pub async fn renew_all_expired(
        &self,
        tenant_id: Option<Uuid>,
        actor: Option<&AuthUser>,
    ) -> Result<RenewalReport, SharePointError> {
        let expired = self.repo.expiring_before(tenant_id, Utc::now()).await?;
        info!("Recreating {} expired SharePoint subscription(s)", expired.len());
        Ok(self.renew_batch(expired, actor).await)
    }

    async fn renew_batch(
        &self,
        subscriptions: Vec<SharePointSubscription>,
        actor: Option<&AuthUser>,
    ) -> RenewalReport {
        let mut report = RenewalReport::default();

        for subscription in subscriptions {
            match self.recreate(&subscription, actor).await {
                Ok(_) => report.recreated += 1,
                Err(e) => {
                    error!(
                        "Failed to recreate subscription {} on {}: {e}",
                        subscription.id, subscription.resource
                    );
                    report.failed += 1;
                    report.errors.push(RenewalFailure {
                        subscription_id: subscription.id,
                        resource: subscription.resource.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.total() > 0 {
            info!(
                "Subscription renewal finished: {} recreated, {} failed",
                report.recreated, report.failed
            );
        }
        report
    }

    pub async fn delete_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        actor: Option<&AuthUser>,
    ) -> Result<(), SharePointError> {
        let existing = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| SharePointError::NotFound(format!("Subscription {id} not found")))?;

        self.api.delete(&existing.graph_subscription_id).await?;
        self.repo.delete(existing.id).await?;

        self.audit(
            &existing,
            AuditAction::SharepointSubscriptionDeleted,
            actor,
            format!("Deleted SharePoint subscription on {}", existing.resource),
        )
        .await;
        Ok(())
    }

    /// Returns the stored subscription when `client_state` matches it.
    pub async fn verify_notification(
        &self,
        graph_subscription_id: &str,
        client_state: Option<&str>,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let Some(subscription) = self.repo.find_by_graph_id(graph_subscription_id).await? else {
            warn!("Notification for unknown subscription {graph_subscription_id}");
            return Ok(None);
        };
        let matches = client_state
            .is_some_and(|state| constant_time_eq(state, &subscription.client_state));
        if !matches {
            warn!("Client state mismatch for subscription {graph_subscription_id}");
            return Ok(None);
        }
        Ok(Some(subscription))
    }

    pub async fn record_notification(
        &self,
        graph_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, SharePointError> {
        self.repo.mark_notified(graph_subscription_id, at).await
    }

    async fn release(&self, existing: &SharePointSubscription) {
        if let Err(e) = self.api.delete(&existing.graph_subscription_id).await {
            warn!(
                "Could not delete superseded Graph subscription {}: {e}",
                existing.graph_subscription_id
            );
        }
    }

    async fn register(
        &self,
        tenant_id: Uuid,
        user_integration_id: Uuid,
        target: &SubscriptionTarget,
        row_id: Uuid,
    ) -> Result<SharePointSubscription, SharePointError> {
        let client_state = generate_client_state();
        let request = NewGraphSubscription {
            change_type: CHANGE_TYPE.to_string(),
            notification_url: self.notification_url.clone(),
            resource: target.resource(),
            expiration_date_time: Utc::now() + Duration::days(SUBSCRIPTION_LIFETIME_DAYS),
            client_state: client_state.clone(),
        };

        let created = self.api.create(&request).await?;
        let graph_id = created.id.clone();
        let now = Utc::now();

        let stored = self
            .repo
            .upsert(SharePointSubscription {
                id: row_id,
                tenant_id,
                user_integration_id,
                site_id: target.site_id().map(String::from),
                drive_id: target.drive_id().map(String::from),
                resource: request.resource,
                graph_subscription_id: created.id,
                change_type: created.change_type,
                notification_url: request.notification_url,
                client_state,
                expires_at: created.expiration_date_time,
                last_notification_at: None,
                created_at: now,
                updated_at: now,
            })
            .await;

        if stored.is_err() {
            if let Err(e) = self.api.delete(&graph_id).await {
                warn!("Could not roll back unsaved Graph subscription {graph_id}: {e}");
            }
        }
        stored
    }
}

/// Compares secrets without short-circuiting on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
