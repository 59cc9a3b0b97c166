use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::types::{ModelUsage, UsageTotals, UserSortKey, UserUsage};

/// The columns aggregation needs from a `token_usage` row.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRow {
    pub user_id: Option<Uuid>,
    pub model_name: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

pub fn totals(rows: &[UsageRow]) -> UsageTotals {
    let mut totals = UsageTotals::default();
    for row in rows {
        totals.add(row.input_tokens, row.output_tokens);
    }
    totals
}

/// Per-model totals, largest consumers first.
pub fn by_model(rows: &[UsageRow]) -> Vec<ModelUsage> {
    let mut buckets: HashMap<&str, UsageTotals> = HashMap::new();
    for row in rows {
        buckets
            .entry(row.model_name.as_str())
            .or_default()
            .add(row.input_tokens, row.output_tokens);
    }

    let mut models: Vec<ModelUsage> = buckets
        .into_iter()
        .map(|(model_name, totals)| ModelUsage {
            model_name: model_name.to_string(),
            totals,
        })
        .collect();
    models.sort_by(|a, b| {
        b.totals
            .total_token_usage
            .cmp(&a.totals.total_token_usage)
            .then_with(|| a.model_name.cmp(&b.model_name))
    });
    models
}

/// Per-user totals sorted descending by `sort`. Rows without a user are
/// counted in tenant totals only.
pub fn by_user(rows: &[UsageRow], sort: UserSortKey) -> Vec<UserUsage> {
    let mut buckets: HashMap<Uuid, (UsageTotals, HashSet<&str>)> = HashMap::new();
    for row in rows {
        let Some(user_id) = row.user_id else {
            continue;
        };
        let (totals, models) = buckets.entry(user_id).or_default();
        totals.add(row.input_tokens, row.output_tokens);
        models.insert(row.model_name.as_str());
    }

    let mut users: Vec<UserUsage> = buckets
        .into_iter()
        .map(|(user_id, (totals, models))| UserUsage {
            user_id,
            totals,
            models_used: models.len(),
        })
        .collect();
    users.sort_by(|a, b| {
        sort.key(&b.totals)
            .cmp(&sort.key(&a.totals))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    users
}
