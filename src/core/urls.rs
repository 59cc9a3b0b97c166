#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    pub const HEALTH: &'static str = "/api/v1/health";

    // Audit logs
    pub const AUDIT_LOGS: &'static str = "/api/v1/audit/logs";
    pub const AUDIT_LOGS_EXPORT: &'static str = "/api/v1/audit/logs/export";
    pub const AUDIT_RETENTION_POLICY: &'static str = "/api/v1/audit/retention-policy";
    pub const AUDIT_RETENTION_PURGE: &'static str = "/api/v1/audit/retention-policy/purge";

    // Token usage
    pub const TOKEN_USAGE: &'static str = "/api/v1/token-usage";
    pub const TOKEN_USAGE_USERS: &'static str = "/api/v1/token-usage/users";
    pub const TOKEN_USAGE_USER: &'static str = "/api/v1/token-usage/users/:user_id";

    // SharePoint administration
    pub const SHAREPOINT_SUBSCRIPTIONS: &'static str = "/api/v1/admin/sharepoint/subscriptions";
    pub const SHAREPOINT_SUBSCRIPTION_BY_ID: &'static str =
        "/api/v1/admin/sharepoint/subscriptions/:id";
    pub const SHAREPOINT_SUBSCRIPTION_RECREATE: &'static str =
        "/api/v1/admin/sharepoint/subscriptions/:id/recreate";
    pub const SHAREPOINT_RENEW_EXPIRING: &'static str =
        "/api/v1/admin/sharepoint/subscriptions/renew-expiring";
    pub const SHAREPOINT_RECREATE_EXPIRED: &'static str =
        "/api/v1/admin/sharepoint/subscriptions/recreate-expired";

    // Graph change notifications
    pub const SHAREPOINT_WEBHOOK: &'static str = "/api/v1/integrations/sharepoint/webhook";
}
