use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use uuid::Uuid;

use crate::core::shared::schema::sharepoint_subscriptions;
use crate::core::shared::utils::DbPool;

use super::lifecycle::SubscriptionRepository;
use super::types::SharePointSubscription;
use super::SharePointError;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = sharepoint_subscriptions)]
pub struct DbSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_integration_id: Uuid,
    pub site_id: Option<String>,
    pub drive_id: Option<String>,
    pub resource: String,
    pub graph_subscription_id: String,
    pub change_type: String,
    pub notification_url: String,
    pub client_state: String,
    pub expires_at: DateTime<Utc>,
    pub last_notification_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSubscription> for SharePointSubscription {
    fn from(db: DbSubscription) -> Self {
        Self {
            id: db.id,
            tenant_id: db.tenant_id,
            user_integration_id: db.user_integration_id,
            site_id: db.site_id,
            drive_id: db.drive_id,
            resource: db.resource,
            graph_subscription_id: db.graph_subscription_id,
            change_type: db.change_type,
            notification_url: db.notification_url,
            client_state: db.client_state,
            expires_at: db.expires_at,
            last_notification_at: db.last_notification_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<&SharePointSubscription> for DbSubscription {
    fn from(sub: &SharePointSubscription) -> Self {
        Self {
            id: sub.id,
            tenant_id: sub.tenant_id,
            user_integration_id: sub.user_integration_id,
            site_id: sub.site_id.clone(),
            drive_id: sub.drive_id.clone(),
            resource: sub.resource.clone(),
            graph_subscription_id: sub.graph_subscription_id.clone(),
            change_type: sub.change_type.clone(),
            notification_url: sub.notification_url.clone(),
            client_state: sub.client_state.clone(),
            expires_at: sub.expires_at,
            last_notification_at: sub.last_notification_at,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// Inserts or replaces the row for `(tenant_id, resource)`. On conflict the
/// existing row id and `created_at` survive; the Graph side is overwritten.
pub fn upsert_subscription(
    conn: &mut PgConnection,
    row: &DbSubscription,
) -> QueryResult<DbSubscription> {
    use sharepoint_subscriptions::dsl as s;

    diesel::insert_into(s::sharepoint_subscriptions)
        .values(row)
        .on_conflict((s::tenant_id, s::resource))
        .do_update()
        .set((
            s::user_integration_id.eq(excluded(s::user_integration_id)),
            s::site_id.eq(excluded(s::site_id)),
            s::drive_id.eq(excluded(s::drive_id)),
            s::graph_subscription_id.eq(excluded(s::graph_subscription_id)),
            s::change_type.eq(excluded(s::change_type)),
            s::notification_url.eq(excluded(s::notification_url)),
            s::client_state.eq(excluded(s::client_state)),
            s::expires_at.eq(excluded(s::expires_at)),
            s::updated_at.eq(excluded(s::updated_at)),
        ))
        .get_result(conn)
}

pub struct PgSubscriptionRepository {
    pool: DbPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, SharePointError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| SharePointError::Database(e.to_string()))?;
            f(&mut conn).map_err(|e| SharePointError::Database(e.to_string()))
        })
        .await
        .map_err(|e| SharePointError::Internal(e.to_string()))?
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn upsert(
        &self,
        subscription: SharePointSubscription,
    ) -> Result<SharePointSubscription, SharePointError> {
        let row = DbSubscription::from(&subscription);
        self.run(move |conn| upsert_subscription(conn, &row))
            .await
            .map(Into::into)
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        self.run(move |conn| {
            sharepoint_subscriptions::table
                .filter(sharepoint_subscriptions::tenant_id.eq(tenant_id))
                .filter(sharepoint_subscriptions::id.eq(id))
                .first::<DbSubscription>(conn)
                .optional()
        })
        .await
        .map(|row| row.map(Into::into))
    }

    async fn find_by_resource(
        &self,
        tenant_id: Uuid,
        resource: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let resource = resource.to_string();
        self.run(move |conn| {
            sharepoint_subscriptions::table
                .filter(sharepoint_subscriptions::tenant_id.eq(tenant_id))
                .filter(sharepoint_subscriptions::resource.eq(resource))
                .first::<DbSubscription>(conn)
                .optional()
        })
        .await
        .map(|row| row.map(Into::into))
    }

    async fn find_by_graph_id(
        &self,
        graph_subscription_id: &str,
    ) -> Result<Option<SharePointSubscription>, SharePointError> {
        let graph_id = graph_subscription_id.to_string();
        self.run(move |conn| {
            sharepoint_subscriptions::table
                .filter(sharepoint_subscriptions::graph_subscription_id.eq(graph_id))
                .first::<DbSubscription>(conn)
                .optional()
        })
        .await
        .map(|row| row.map(Into::into))
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<SharePointSubscription>, SharePointError> {
        self.run(move |conn| {
            sharepoint_subscriptions::table
                .filter(sharepoint_subscriptions::tenant_id.eq(tenant_id))
                .order(sharepoint_subscriptions::expires_at.asc())
                .load::<DbSubscription>(conn)
        })
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn expiring_before(
        &self,
        tenant_id: Option<Uuid>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SharePointSubscription>, SharePointError> {
        self.run(move |conn| {
            let mut query = sharepoint_subscriptions::table
                .filter(sharepoint_subscriptions::expires_at.le(cutoff))
                .into_boxed();
            if let Some(tenant_id) = tenant_id {
                query = query.filter(sharepoint_subscriptions::tenant_id.eq(tenant_id));
            }
            query
                .order(sharepoint_subscriptions::expires_at.asc())
                .load::<DbSubscription>(conn)
        })
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, SharePointError> {
        self.run(move |conn| {
            diesel::delete(sharepoint_subscriptions::table.find(id))
                .execute(conn)
                .map(|n| n > 0)
        })
        .await
    }

    async fn mark_notified(
        &self,
        graph_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, SharePointError> {
        let graph_id = graph_subscription_id.to_string();
        self.run(move |conn| {
            diesel::update(
                sharepoint_subscriptions::table
                    .filter(sharepoint_subscriptions::graph_subscription_id.eq(graph_id)),
            )
            .set(sharepoint_subscriptions::last_notification_at.eq(Some(at)))
            .execute(conn)
            .map(|n| n > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::debug_query;
    use diesel::pg::Pg;

    #[test]
    fn test_upsert_targets_tenant_resource_constraint() {
        let now = Utc::now();
        let row = DbSubscription {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_integration_id: Uuid::new_v4(),
            site_id: None,
            drive_id: Some("d".into()),
            resource: "drives/d/root".into(),
            graph_subscription_id: "g".into(),
            change_type: "updated".into(),
            notification_url: "https://eneo.example/hook".into(),
            client_state: "s".into(),
            expires_at: now,
            last_notification_at: None,
            created_at: now,
            updated_at: now,
        };

        let query = diesel::insert_into(sharepoint_subscriptions::table)
            .values(&row)
            .on_conflict((
                sharepoint_subscriptions::tenant_id,
                sharepoint_subscriptions::resource,
            ))
            .do_update()
            .set(
                sharepoint_subscriptions::graph_subscription_id
                    .eq(excluded(sharepoint_subscriptions::graph_subscription_id)),
            );
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("ON CONFLICT (\"tenant_id\", \"resource\") DO UPDATE"));

        let back = SharePointSubscription::from(row.clone());
        assert_eq!(DbSubscription::from(&back).graph_subscription_id, row.graph_subscription_id);
    }
}
