diesel::table! {
    tenants (id) {
        id -> Uuid,
        name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        actor_id -> Nullable<Uuid>,
        actor_type -> Varchar,
        action -> Varchar,
        entity_type -> Varchar,
        entity_id -> Nullable<Uuid>,
        description -> Text,
        metadata -> Jsonb,
        outcome -> Varchar,
        error_message -> Nullable<Text>,
        ip_address -> Nullable<Varchar>,
        user_agent -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    audit_retention_policies (tenant_id) {
        tenant_id -> Uuid,
        retention_days -> Int4,
        updated_by -> Nullable<Uuid>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    token_usage (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        user_id -> Nullable<Uuid>,
        assistant_id -> Nullable<Uuid>,
        model_name -> Varchar,
        input_tokens -> Int8,
        output_tokens -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sharepoint_subscriptions (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        user_integration_id -> Uuid,
        site_id -> Nullable<Varchar>,
        drive_id -> Nullable<Varchar>,
        resource -> Varchar,
        graph_subscription_id -> Varchar,
        change_type -> Varchar,
        notification_url -> Text,
        client_state -> Varchar,
        expires_at -> Timestamptz,
        last_notification_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(audit_logs -> tenants (tenant_id));
diesel::joinable!(audit_retention_policies -> tenants (tenant_id));
diesel::joinable!(token_usage -> tenants (tenant_id));
diesel::joinable!(sharepoint_subscriptions -> tenants (tenant_id));

diesel::allow_tables_to_appear_in_same_query!(
    tenants,
    audit_logs,
    audit_retention_policies,
    token_usage,
    sharepoint_subscriptions,
);
