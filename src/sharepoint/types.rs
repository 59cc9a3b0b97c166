use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Graph allows at most 42,300 minutes for drive items; stay under it.
pub const SUBSCRIPTION_LIFETIME_DAYS: i64 = 29;
pub const DEFAULT_RENEWAL_THRESHOLD_HOURS: i64 = 48;
pub const CHANGE_TYPE: &str = "updated";

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionTarget {
    Site { site_id: String },
    Drive { drive_id: String },
}

impl SubscriptionTarget {
    pub fn resource(&self) -> String {
        match self {
            Self::Site { site_id } => format!("sites/{site_id}/drive/root"),
            Self::Drive { drive_id } => format!("drives/{drive_id}/root"),
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        match self {
            Self::Site { site_id } => Some(site_id),
            Self::Drive { .. } => None,
        }
    }

    pub fn drive_id(&self) -> Option<&str> {
        match self {
            Self::Drive { drive_id } => Some(drive_id),
            Self::Site { .. } => None,
        }
    }

    /// Exactly one of the two ids must be present.
    pub fn from_ids(site_id: Option<&str>, drive_id: Option<&str>) -> Result<Self, String> {
        let site_id = site_id.map(str::trim).filter(|s| !s.is_empty());
        let drive_id = drive_id.map(str::trim).filter(|s| !s.is_empty());
        match (site_id, drive_id) {
            (Some(site_id), None) => Ok(Self::Site {
                site_id: site_id.to_string(),
            }),
            (None, Some(drive_id)) => Ok(Self::Drive {
                drive_id: drive_id.to_string(),
            }),
            (Some(_), Some(_)) => Err("specify either site_id or drive_id, not both".to_string()),
            (None, None) => Err("site_id or drive_id is required".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    ExpiringSoon,
    Expired,
}

impl SubscriptionStatus {
    pub fn classify(expires_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> Self {
        if expires_at <= now {
            Self::Expired
        } else if expires_at <= now + threshold {
            Self::ExpiringSoon
        } else {
            Self::Active
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharePointSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_integration_id: Uuid,
    pub site_id: Option<String>,
    pub drive_id: Option<String>,
    pub resource: String,
    pub graph_subscription_id: String,
    pub change_type: String,
    pub notification_url: String,
    #[serde(skip_serializing)]
    pub client_state: String,
    pub expires_at: DateTime<Utc>,
    pub last_notification_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharePointSubscription {
    pub fn target(&self) -> Result<SubscriptionTarget, String> {
        SubscriptionTarget::from_ids(self.site_id.as_deref(), self.drive_id.as_deref())
    }

    pub fn status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        SubscriptionStatus::classify(
            self.expires_at,
            now,
            Duration::hours(DEFAULT_RENEWAL_THRESHOLD_HOURS),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: SharePointSubscription,
    pub status: SubscriptionStatus,
}

impl SubscriptionView {
    pub fn at(subscription: SharePointSubscription, now: DateTime<Utc>) -> Self {
        let status = subscription.status(now);
        Self {
            subscription,
            status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub user_integration_id: Uuid,
    pub site_id: Option<String>,
    pub drive_id: Option<String>,
}

impl CreateSubscriptionRequest {
    pub fn target(&self) -> Result<SubscriptionTarget, String> {
        SubscriptionTarget::from_ids(self.site_id.as_deref(), self.drive_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenewExpiringQuery {
    pub threshold_hours: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalFailure {
    pub subscription_id: Uuid,
    pub resource: String,
    pub error: String,
}

/// Outcome of a bulk renewal. Every scanned row lands in exactly one of
/// `recreated` or `failed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenewalReport {
    pub recreated: usize,
    pub failed: usize,
    pub errors: Vec<RenewalFailure>,
}

impl RenewalReport {
    pub fn total(&self) -> usize {
        self.recreated + self.failed
    }
}

/// Payload Graph posts to the notification URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeNotificationCollection {
    #[serde(default)]
    pub value: Vec<ChangeNotification>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub subscription_id: String,
    #[serde(default)]
    pub client_state: Option<String>,
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub subscription_expiration_date_time: Option<DateTime<Utc>>,
}

/// Queue payload for one verified notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotificationJob {
    pub graph_subscription_id: String,
    pub resource: Option<String>,
    pub change_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQuery {
    pub validation_token: Option<String>,
}
