use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Window applied when a query leaves out `start_date`.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub assistant_id: Option<Uuid>,
    pub model_name: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordUsageRequest {
    pub user_id: Option<Uuid>,
    pub assistant_id: Option<Uuid>,
    pub model_name: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl RecordUsageRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.model_name.trim().is_empty() {
            return Err("model_name is required".to_string());
        }
        if self.input_tokens < 0 || self.output_tokens < 0 {
            return Err("token counts must not be negative".to_string());
        }
        Ok(())
    }
}

/// Running totals for one bucket (tenant, model or user).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageTotals {
    pub input_token_usage: i64,
    pub output_token_usage: i64,
    pub total_token_usage: i64,
    pub request_count: i64,
}

impl UsageTotals {
    pub fn add(&mut self, input: i64, output: i64) {
        self.input_token_usage += input;
        self.output_token_usage += output;
        self.total_token_usage += input + output;
        self.request_count += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub model_name: String,
    #[serde(flatten)]
    pub totals: UsageTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUsageSummary {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: UsageTotals,
    pub models: Vec<ModelUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserUsage {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub totals: UsageTotals,
    pub models_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUsagePage {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub items: Vec<UserUsage>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserUsageDetail {
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: UsageTotals,
    pub models: Vec<ModelUsage>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserSortKey {
    #[default]
    Total,
    Input,
    Output,
    Requests,
}

impl UserSortKey {
    pub fn key(&self, totals: &UsageTotals) -> i64 {
        match self {
            Self::Total => totals.total_token_usage,
            Self::Input => totals.input_token_usage,
            Self::Output => totals.output_token_usage,
            Self::Requests => totals.request_count,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageWindowQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl UsageWindowQuery {
    /// Fills in the default window ending at `now` and rejects inverted ranges.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        let end = self.end_date.unwrap_or(now);
        let start = self
            .start_date
            .unwrap_or_else(|| end - Duration::days(DEFAULT_WINDOW_DAYS));
        if start > end {
            return Err("start_date must not be after end_date".to_string());
        }
        Ok((start, end))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUsageQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    #[serde(default)]
    pub sort_by: UserSortKey,
}

impl UserUsageQuery {
    pub fn window(&self) -> UsageWindowQuery {
        UsageWindowQuery {
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults_to_last_thirty_days() {
        let now = Utc::now();
        let (start, end) = UsageWindowQuery::default().resolve(now).expect("window");
        assert_eq!(end, now);
        assert_eq!(end - start, Duration::days(30));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let now = Utc::now();
        let query = UsageWindowQuery {
            start_date: Some(now),
            end_date: Some(now - Duration::hours(1)),
        };
        assert!(query.resolve(now).is_err());
    }

    #[test]
    fn test_record_request_validation() {
        let mut req = RecordUsageRequest {
            user_id: None,
            assistant_id: None,
            model_name: "gpt-4o".into(),
            input_tokens: 10,
            output_tokens: 5,
        };
        assert!(req.validate().is_ok());
        req.output_tokens = -1;
        assert!(req.validate().is_err());
        req.output_tokens = 1;
        req.model_name = "  ".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_totals_serialize_flat() {
        let mut totals = UsageTotals::default();
        totals.add(100, 40);
        let json = serde_json::to_value(ModelUsage {
            model_name: "claude".into(),
            totals,
        })
        .expect("serialize");
        assert_eq!(json["total_token_usage"], 140);
        assert_eq!(json["request_count"], 1);
    }
}
