use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::token_usage;

use super::aggregate::UsageRow;
use super::types::TokenUsageRecord;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = token_usage)]
pub struct DbTokenUsage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub assistant_id: Option<Uuid>,
    pub model_name: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub created_at: DateTime<Utc>,
}

impl From<DbTokenUsage> for TokenUsageRecord {
    fn from(db: DbTokenUsage) -> Self {
        Self {
            id: db.id,
            tenant_id: db.tenant_id,
            user_id: db.user_id,
            assistant_id: db.assistant_id,
            model_name: db.model_name,
            input_tokens: db.input_tokens,
            output_tokens: db.output_tokens,
            created_at: db.created_at,
        }
    }
}

pub fn insert_usage(conn: &mut PgConnection, row: &DbTokenUsage) -> QueryResult<DbTokenUsage> {
    diesel::insert_into(token_usage::table)
        .values(row)
        .get_result(conn)
}

/// Loads the rows of a tenant inside `[start, end]`, optionally for one user.
pub fn load_rows(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> QueryResult<Vec<UsageRow>> {
    let mut query = token_usage::table
        .filter(token_usage::tenant_id.eq(tenant_id))
        .filter(token_usage::created_at.ge(start))
        .filter(token_usage::created_at.le(end))
        .into_boxed();

    if let Some(user_id) = user_id {
        query = query.filter(token_usage::user_id.eq(user_id));
    }

    let rows: Vec<(Option<Uuid>, String, i64, i64)> = query
        .select((
            token_usage::user_id,
            token_usage::model_name,
            token_usage::input_tokens,
            token_usage::output_tokens,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, model_name, input_tokens, output_tokens)| UsageRow {
            user_id,
            model_name,
            input_tokens,
            output_tokens,
        })
        .collect())
}
