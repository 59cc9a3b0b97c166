//! In-memory stand-ins for the database and Graph, shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::graph::{GraphError, GraphSubscription, NewGraphSubscription};
use super::lifecycle::{SubscriptionApi, SubscriptionRepository};
use super::types::{SharePointSubscription, SubscriptionTarget, CHANGE_TYPE};
use super::SharePointError;

/// Repository over a vector. `fail_writes` makes every write fail.
#[derive(Default)]
pub(crate) struct MemoryRepo {
    pub(crate) rows: Mutex<Vec<SharePointSubscription>>,
    pub(crate) fail_writes: bool,
}

impl MemoryRepo {
    fn check_writable(&self) -> Result<(), SharePointError> {
        if self.fail_writes {
            return Err(SharePointError::Database("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryRepo {
    async fn upsert(
        &self,
        subscription: SharePointSubscription,
    ) -> Result<SharePointSubscription, SharePointError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|r| {
            r.tenant_id == subscription.tenant_id && r.resource == subscription.resource
        }) {
            let id = row.id;
            let created_at = row.created_at;
            *row = SharePointSubscription {
                id,
                created_at,
                ..subscription
            };
            return Ok(row.clone());
        }
        rows.push(subscription.clone());
        Ok(subscription)
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.id == id)
            .cloned())
    }

    async fn find_by_resource(
        &self,
        tenant_id: Uuid,
        resource: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.resource == resource)
            .cloned())
    }

    async fn find_by_graph_id(
        &self,
        graph_subscription_id: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|r| r.graph_subscription_id == graph_subscription_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SharePointSubscription>, SharePointError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn expiring_before(
        &self,
        tenant_id: Option<Uuid>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SharePointSubscription>, SharePointError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| tenant_id.map_or(true, |t| r.tenant_id == t))
            .filter(|r| r.expires_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, SharePointError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() < before)
    }

    async fn mark_notified(
        &self,
        graph_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, SharePointError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().await;
        match rows
            .iter_mut()
            .find(|r| r.graph_subscription_id == graph_subscription_id)
        {
            Some(row) => {
                row.last_notification_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Fake Graph. Resources listed in `fail_resources` are rejected.
#[derive(Default)]
pub(crate) struct FakeGraph {
    pub(crate) created: AtomicUsize,
    pub(crate) deleted: Mutex<Vec<String>>,
    pub(crate) fail_resources: HashSet<String>,
    pub(crate) throttle: bool,
}

#[async_trait]
impl SubscriptionApi for FakeGraph {
    async fn create(
        &self,
        request: &NewGraphSubscription,
    ) -> Result<GraphSubscription, GraphError> {
        if self.throttle {
            return Err(GraphError::UpstreamRateLimit {
                retry_after: Some(10),
            });
        }
        if self.fail_resources.contains(&request.resource) {
            return Err(GraphError::Api {
                status: 400,
                message: "resource not found".into(),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(GraphSubscription {
            id: format!("graph-{n}"),
            resource: request.resource.clone(),
            change_type: request.change_type.clone(),
            notification_url: request.notification_url.clone(),
            expiration_date_time: request.expiration_date_time,
            client_state: Some(request.client_state.clone()),
        })
    }

    async fn delete(&self, subscription_id: &str) -> Result<(), GraphError> {
        self.deleted.lock().await.push(subscription_id.to_string());
        Ok(())
    }
}

pub(crate) fn stored(
    tenant_id: Uuid,
    drive_id: &str,
    expires_in: Duration,
) -> SharePointSubscription {
    let now = Utc::now();
    let target = SubscriptionTarget::Drive {
        drive_id: drive_id.to_string(),
    };
    SharePointSubscription {
        id: Uuid::new_v4(),
        tenant_id,
        user_integration_id: Uuid::new_v4(),
        site_id: None,
        drive_id: Some(drive_id.to_string()),
        resource: target.resource(),
        graph_subscription_id: format!("old-{drive_id}"),
        change_type: CHANGE_TYPE.to_string(),
        notification_url: "https://eneo.example/hook".into(),
        client_state: "old-state".into(),
        expires_at: now + expires_in,
        last_notification_at: None,
        created_at: now - Duration::days(28),
        updated_at: now - Duration::days(28),
    }
}
