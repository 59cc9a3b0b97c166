use std::str::FromStr;

use crate::audit::AuditLogMode;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_GRAPH_LOGIN_URL: &str = "https://login.microsoftonline.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub jwt: JwtSettings,
    pub graph: GraphConfig,
    pub audit: AuditConfig,
    pub jobs: JobsConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public origin used to build webhook callback URLs.
    pub public_origin: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Clone, Debug)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub login_url: String,
    pub notification_url: String,
}

impl GraphConfig {
    pub fn is_configured(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub mode: AuditLogMode,
    pub default_retention_days: i32,
}

#[derive(Clone, Debug)]
pub struct JobsConfig {
    pub renewal_interval_hours: u64,
    pub retention_purge_schedule: String,
    pub queue_name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("SERVER_HOST", "0.0.0.0");
        let port: u16 = parse_env("SERVER_PORT", 8000)?;
        let public_origin = env_or("PUBLIC_ORIGIN", &format!("http://localhost:{port}"));

        let notification_url = std::env::var("SHAREPOINT_WEBHOOK_URL").unwrap_or_else(|_| {
            format!(
                "{}/api/v1/integrations/sharepoint/webhook",
                public_origin.trim_end_matches('/')
            )
        });

        let mode_raw = env_or("AUDIT_LOG_MODE", "sync");
        let mode = mode_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "AUDIT_LOG_MODE",
            value: mode_raw.clone(),
        })?;

        let default_retention_days: i32 = parse_env("AUDIT_DEFAULT_RETENTION_DAYS", 365)?;
        if crate::audit::validate_retention_days(default_retention_days).is_err() {
            return Err(ConfigError::Invalid {
                key: "AUDIT_DEFAULT_RETENTION_DAYS",
                value: default_retention_days.to_string(),
            });
        }

        Ok(Self {
            server: ServerConfig {
                host,
                port,
                public_origin,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            cache: CacheConfig {
                url: std::env::var("REDIS_URL")
                    .or_else(|_| std::env::var("CACHE_URL"))
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            jwt: JwtSettings {
                secret: required("JWT_SECRET")?,
                issuer: env_or("JWT_ISSUER", "eneo"),
                audience: env_or("JWT_AUDIENCE", "eneo-api"),
            },
            graph: GraphConfig {
                tenant_id: env_or("SHAREPOINT_TENANT_ID", ""),
                client_id: env_or("SHAREPOINT_CLIENT_ID", ""),
                client_secret: env_or("SHAREPOINT_CLIENT_SECRET", ""),
                base_url: env_or("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL),
                login_url: env_or("GRAPH_LOGIN_URL", DEFAULT_GRAPH_LOGIN_URL),
                notification_url,
            },
            audit: AuditConfig {
                mode,
                default_retention_days,
            },
            jobs: JobsConfig {
                renewal_interval_hours: parse_env("SUBSCRIPTION_RENEWAL_INTERVAL_HOURS", 12)?,
                retention_purge_schedule: env_or("RETENTION_PURGE_SCHEDULE", "0 0 2 * * *"),
                queue_name: env_or("JOB_QUEUE_NAME", "eneo:jobs"),
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let port: u16 = parse_env("ENEO_TEST_UNSET_PORT", 8123).expect("default");
        assert_eq!(port, 8123);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("ENEO_TEST_BAD_PORT", "eighty");
        let err = parse_env::<u16>("ENEO_TEST_BAD_PORT", 80).unwrap_err();
        assert!(err.to_string().contains("ENEO_TEST_BAD_PORT"));
        std::env::remove_var("ENEO_TEST_BAD_PORT");
    }

    #[test]
    fn test_required_treats_blank_as_missing() {
        std::env::set_var("ENEO_TEST_BLANK", "   ");
        assert!(matches!(
            required("ENEO_TEST_BLANK"),
            Err(ConfigError::Missing("ENEO_TEST_BLANK"))
        ));
        std::env::remove_var("ENEO_TEST_BLANK");
    }

    #[test]
    fn test_graph_config_requires_credentials() {
        let cfg = GraphConfig {
            tenant_id: "t".into(),
            client_id: String::new(),
            client_secret: "s".into(),
            base_url: DEFAULT_GRAPH_BASE_URL.into(),
            login_url: DEFAULT_GRAPH_LOGIN_URL.into(),
            notification_url: "https://example.org/hook".into(),
        };
        assert!(!cfg.is_configured());
    }
}
