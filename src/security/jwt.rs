use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::JwtSettings;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "eneo".into(),
            audience: "eneo-api".into(),
            access_token_expiry_minutes: 60,
            leeway_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tenant_id: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }

    pub fn tenant_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.tenant_id).map_err(|e| anyhow!("Invalid tenant ID in claims: {e}"))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn from_settings(settings: &JwtSettings) -> Result<Self> {
        let config = JwtConfig {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ..JwtConfig::default()
        };
        Self::new(config, &settings.secret)
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: Option<String>,
        roles: Vec<String>,
    ) -> Result<String> {
        let now = Utc::now();
        let expiry = now + Duration::minutes(self.config.access_token_expiry_minutes);
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            email,
            roles,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode access token: {e}"))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> JwtManager {
        JwtManager::new(
            JwtConfig::default(),
            "this-is-a-very-long-secret-key-for-testing-purposes-only",
        )
        .expect("Failed to create manager")
    }

    #[test]
    fn test_rejects_short_secret() {
        assert!(JwtManager::new(JwtConfig::default(), "short").is_err());
    }

    #[test]
    fn test_roundtrip_carries_tenant_and_roles() {
        let manager = create_test_manager();
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let token = manager
            .generate_access_token(
                user_id,
                tenant_id,
                Some("admin@example.org".into()),
                vec!["Admin".into()],
            )
            .expect("Failed to generate");
        let claims = manager
            .validate_access_token(&token)
            .expect("Validation failed");

        assert_eq!(claims.user_id().expect("user id"), user_id);
        assert_eq!(claims.tenant_id().expect("tenant id"), tenant_id);
        assert!(claims.has_role(ADMIN_ROLE));
    }

    #[test]
    fn test_rejects_token_from_other_audience() {
        let manager = create_test_manager();
        let other = JwtManager::new(
            JwtConfig {
                audience: "someone-else".into(),
                ..JwtConfig::default()
            },
            "this-is-a-very-long-secret-key-for-testing-purposes-only",
        )
        .expect("manager");

        let token = other
            .generate_access_token(Uuid::new_v4(), Uuid::new_v4(), None, vec![])
            .expect("token");
        assert!(manager.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_rejects_tampered_token() {
        let manager = create_test_manager();
        let token = manager
            .generate_access_token(Uuid::new_v4(), Uuid::new_v4(), None, vec![])
            .expect("token");
        let tampered = format!("{token}x");
        assert!(manager.validate_access_token(&tampered).is_err());
    }
}
