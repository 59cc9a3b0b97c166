use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::security::AuthUser;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserLogin,
    UserLogout,
    AssistantCreated,
    AssistantUpdated,
    AssistantDeleted,
    SpaceCreated,
    SpaceUpdated,
    SpaceDeleted,
    FileUploaded,
    FileDeleted,
    IntegrationConnected,
    IntegrationDisconnected,
    SharepointSubscriptionCreated,
    SharepointSubscriptionRenewed,
    SharepointSubscriptionDeleted,
    RetentionPolicyUpdated,
    AuditLogsPurged,
    AuditLogExported,
    TokenUsageRecorded,
}

impl AuditAction {
    pub const ALL: &'static [AuditAction] = &[
        Self::UserCreated,
        Self::UserUpdated,
        Self::UserDeleted,
        Self::UserLogin,
        Self::UserLogout,
        Self::AssistantCreated,
        Self::AssistantUpdated,
        Self::AssistantDeleted,
        Self::SpaceCreated,
        Self::SpaceUpdated,
        Self::SpaceDeleted,
        Self::FileUploaded,
        Self::FileDeleted,
        Self::IntegrationConnected,
        Self::IntegrationDisconnected,
        Self::SharepointSubscriptionCreated,
        Self::SharepointSubscriptionRenewed,
        Self::SharepointSubscriptionDeleted,
        Self::RetentionPolicyUpdated,
        Self::AuditLogsPurged,
        Self::AuditLogExported,
        Self::TokenUsageRecorded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user_created",
            Self::UserUpdated => "user_updated",
            Self::UserDeleted => "user_deleted",
            Self::UserLogin => "user_login",
            Self::UserLogout => "user_logout",
            Self::AssistantCreated => "assistant_created",
            Self::AssistantUpdated => "assistant_updated",
            Self::AssistantDeleted => "assistant_deleted",
            Self::SpaceCreated => "space_created",
            Self::SpaceUpdated => "space_updated",
            Self::SpaceDeleted => "space_deleted",
            Self::FileUploaded => "file_uploaded",
            Self::FileDeleted => "file_deleted",
            Self::IntegrationConnected => "integration_connected",
            Self::IntegrationDisconnected => "integration_disconnected",
            Self::SharepointSubscriptionCreated => "sharepoint_subscription_created",
            Self::SharepointSubscriptionRenewed => "sharepoint_subscription_renewed",
            Self::SharepointSubscriptionDeleted => "sharepoint_subscription_deleted",
            Self::RetentionPolicyUpdated => "retention_policy_updated",
            Self::AuditLogsPurged => "audit_logs_purged",
            Self::AuditLogExported => "audit_log_exported",
            Self::TokenUsageRecorded => "token_usage_recorded",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unknown audit action: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Tenant,
    User,
    Assistant,
    Space,
    App,
    File,
    Website,
    Integration,
    SharepointSubscription,
    RetentionPolicy,
    AuditLog,
    TokenUsage,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[
        Self::Tenant,
        Self::User,
        Self::Assistant,
        Self::Space,
        Self::App,
        Self::File,
        Self::Website,
        Self::Integration,
        Self::SharepointSubscription,
        Self::RetentionPolicy,
        Self::AuditLog,
        Self::TokenUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Space => "space",
            Self::App => "app",
            Self::File => "file",
            Self::Website => "website",
            Self::Integration => "integration",
            Self::SharepointSubscription => "sharepoint_subscription",
            Self::RetentionPolicy => "retention_policy",
            Self::AuditLog => "audit_log",
            Self::TokenUsage => "token_usage",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("Unknown entity type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
    ApiKey,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::System => "system",
            Self::ApiKey => "api_key",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "api_key" => Ok(Self::ApiKey),
            _ => Err(format!("Unknown actor type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(format!("Unknown outcome: {s}")),
        }
    }
}

/// One audit trail record. The id is assigned at creation so a record
/// delivered twice through the job queue is stored once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(tenant_id: Uuid, action: AuditAction, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            actor_id: None,
            actor_type: ActorType::System,
            action,
            entity_type,
            entity_id: None,
            description: String::new(),
            metadata: serde_json::json!({}),
            outcome: Outcome::Success,
            error_message: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn by_user(mut self, user: &AuthUser) -> Self {
        self.actor_id = Some(user.user_id);
        self.actor_type = ActorType::User;
        self.ip_address = user.ip_address.clone();
        self.user_agent = user.user_agent.clone();
        self
    }

    pub fn with_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.outcome = Outcome::Failure;
        self.error_message = Some(error.into());
        self
    }
}

/// Filters shared by the paginated listing and the export, so both see the
/// same rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub outcome: Option<Outcome>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl AuditLogFilter {
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err("from_date must not be after to_date".to_string());
            }
        }
        Ok(())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAuditLogsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub outcome: Option<Outcome>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ListAuditLogsQuery {
    pub fn filter(&self) -> AuditLogFilter {
        AuditLogFilter {
            actor_id: self.actor_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            outcome: self.outcome,
            from_date: self.from_date,
            to_date: self.to_date,
            search: self.search.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Jsonl => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportAuditLogsQuery {
    #[serde(default)]
    pub format: ExportFormat,
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub outcome: Option<Outcome>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ExportAuditLogsQuery {
    pub fn filter(&self) -> AuditLogFilter {
        AuditLogFilter {
            actor_id: self.actor_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            outcome: self.outcome,
            from_date: self.from_date,
            to_date: self.to_date,
            search: self.search.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogPage {
    pub items: Vec<AuditLogEntry>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionPolicy {
    pub tenant_id: Uuid,
    pub retention_days: i32,
    pub is_default: bool,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRetentionPolicyRequest {
    pub retention_days: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurgeReport {
    pub tenants_processed: i64,
    pub deleted: usize,
}
