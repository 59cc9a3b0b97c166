use chrono::{DateTime, Duration, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{audit_logs, audit_retention_policies, tenants};

use super::types::{AuditLogEntry, AuditLogFilter, PurgeReport};

/// Rows fetched per round trip while exporting.
pub const EXPORT_BATCH_SIZE: i64 = 5_000;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = audit_logs)]
pub struct DbAuditLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub outcome: String,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = audit_retention_policies, primary_key(tenant_id))]
pub struct DbRetentionPolicy {
    pub tenant_id: Uuid,
    pub retention_days: i32,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl From<&AuditLogEntry> for DbAuditLog {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            id: entry.id,
            tenant_id: entry.tenant_id,
            actor_id: entry.actor_id,
            actor_type: entry.actor_type.to_string(),
            action: entry.action.to_string(),
            entity_type: entry.entity_type.to_string(),
            entity_id: entry.entity_id,
            description: entry.description.clone(),
            metadata: entry.metadata.clone(),
            outcome: entry.outcome.to_string(),
            error_message: entry.error_message.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            created_at: entry.created_at,
        }
    }
}

pub fn db_audit_to_entry(db: DbAuditLog) -> Result<AuditLogEntry, String> {
    Ok(AuditLogEntry {
        id: db.id,
        tenant_id: db.tenant_id,
        actor_id: db.actor_id,
        actor_type: db.actor_type.parse()?,
        action: db.action.parse()?,
        entity_type: db.entity_type.parse()?,
        entity_id: db.entity_id,
        description: db.description,
        metadata: db.metadata,
        outcome: db.outcome.parse()?,
        error_message: db.error_message,
        ip_address: db.ip_address,
        user_agent: db.user_agent,
        created_at: db.created_at,
    })
}

/// Inserts an entry. A second insert of the same id is a no-op, which keeps
/// redelivered queue jobs from duplicating rows.
pub fn insert_entry(conn: &mut PgConnection, entry: &AuditLogEntry) -> QueryResult<usize> {
    diesel::insert_into(audit_logs::table)
        .values(DbAuditLog::from(entry))
        .on_conflict(audit_logs::id)
        .do_nothing()
        .execute(conn)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The single place where filters turn into SQL. Listing, counting and
/// exporting all start here.
pub fn filtered_query(
    tenant_id: Uuid,
    filter: &AuditLogFilter,
) -> audit_logs::BoxedQuery<'static, Pg> {
    let mut query = audit_logs::table
        .filter(audit_logs::tenant_id.eq(tenant_id))
        .into_boxed();

    if let Some(actor_id) = filter.actor_id {
        query = query.filter(audit_logs::actor_id.eq(actor_id));
    }
    if let Some(action) = filter.action {
        query = query.filter(audit_logs::action.eq(action.as_str()));
    }
    if let Some(entity_type) = filter.entity_type {
        query = query.filter(audit_logs::entity_type.eq(entity_type.as_str()));
    }
    if let Some(entity_id) = filter.entity_id {
        query = query.filter(audit_logs::entity_id.eq(entity_id));
    }
    if let Some(outcome) = filter.outcome {
        query = query.filter(audit_logs::outcome.eq(outcome.to_string()));
    }
    if let Some(from_date) = filter.from_date {
        query = query.filter(audit_logs::created_at.ge(from_date));
    }
    if let Some(to_date) = filter.to_date {
        query = query.filter(audit_logs::created_at.le(to_date));
    }
    if let Some(term) = filter.search_term() {
        query = query.filter(audit_logs::description.ilike(format!("%{}%", escape_like(term))));
    }

    query
}

pub fn count_entries(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &AuditLogFilter,
) -> QueryResult<i64> {
    filtered_query(tenant_id, filter).count().get_result(conn)
}

pub fn load_page(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &AuditLogFilter,
    offset: i64,
    limit: i64,
) -> QueryResult<Vec<DbAuditLog>> {
    filtered_query(tenant_id, filter)
        .order(audit_logs::created_at.desc())
        .then_order_by(audit_logs::id.desc())
        .offset(offset)
        .limit(limit)
        .load(conn)
}

/// Runs `f` in a read-only repeatable-read transaction, so every query in
/// it sees the same snapshot.
pub fn read_snapshot<T, F>(conn: &mut PgConnection, f: F) -> QueryResult<T>
where
    F: FnOnce(&mut PgConnection) -> QueryResult<T>,
{
    conn.build_transaction().repeatable_read().read_only().run(f)
}

/// Loads every matching row in the same order as `load_page`.
pub fn load_all(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &AuditLogFilter,
) -> QueryResult<Vec<DbAuditLog>> {
    load_all_in_batches(conn, tenant_id, filter, EXPORT_BATCH_SIZE)
}

/// Walks the matching rows `batch_size` at a time inside one snapshot, so
/// rows written meanwhile cannot shift later batches.
pub fn load_all_in_batches(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &AuditLogFilter,
    batch_size: i64,
) -> QueryResult<Vec<DbAuditLog>> {
    let batch_size = batch_size.max(1);
    read_snapshot(conn, |conn| {
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let batch = load_page(conn, tenant_id, filter, offset, batch_size)?;
            let fetched = batch.len() as i64;
            rows.extend(batch);
            if fetched < batch_size {
                break;
            }
            offset += fetched;
        }
        Ok(rows)
    })
}

pub fn find_policy(
    conn: &mut PgConnection,
    tenant_id: Uuid,
) -> QueryResult<Option<DbRetentionPolicy>> {
    audit_retention_policies::table
        .find(tenant_id)
        .first(conn)
        .optional()
}

pub fn upsert_policy(
    conn: &mut PgConnection,
    policy: &DbRetentionPolicy,
) -> QueryResult<DbRetentionPolicy> {
    diesel::insert_into(audit_retention_policies::table)
        .values(policy)
        .on_conflict(audit_retention_policies::tenant_id)
        .do_update()
        .set(policy)
        .get_result(conn)
}

pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i32) -> DateTime<Utc> {
    now - Duration::days(i64::from(retention_days))
}

/// Deletes rows older than each tenant's retention window. Tenants without a
/// policy row use `default_days`.
pub fn purge_expired(
    conn: &mut PgConnection,
    default_days: i32,
    now: DateTime<Utc>,
) -> QueryResult<PurgeReport> {
    conn.transaction(|conn| {
        let policies: Vec<DbRetentionPolicy> = audit_retention_policies::table.load(conn)?;
        let mut deleted = 0;

        for policy in &policies {
            let cutoff = retention_cutoff(now, policy.retention_days);
            deleted += diesel::delete(
                audit_logs::table
                    .filter(audit_logs::tenant_id.eq(policy.tenant_id))
                    .filter(audit_logs::created_at.lt(cutoff)),
            )
            .execute(conn)?;
        }

        let custom: Vec<Uuid> = policies.iter().map(|p| p.tenant_id).collect();
        deleted += diesel::delete(
            audit_logs::table
                .filter(audit_logs::tenant_id.ne_all(custom))
                .filter(audit_logs::created_at.lt(retention_cutoff(now, default_days))),
        )
        .execute(conn)?;

        let tenants_processed: i64 = tenants::table.count().get_result(conn)?;

        Ok(PurgeReport {
            tenants_processed,
            deleted,
        })
    })
}
