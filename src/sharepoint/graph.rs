use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::config::GraphConfig;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Tokens are refreshed this long before Azure AD says they expire.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Graph credentials are not configured")]
    NotConfigured,
    #[error("Graph rejected credentials: {0}")]
    UpstreamAuth(String),
    #[error("Graph throttled the request")]
    UpstreamRateLimit { retry_after: Option<u64> },
    #[error("Graph API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Body sent to `POST /subscriptions`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGraphSubscription {
    pub change_type: String,
    pub notification_url: String,
    pub resource: String,
    pub expiration_date_time: DateTime<Utc>,
    pub client_state: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubscription {
    pub id: String,
    pub resource: String,
    pub change_type: String,
    pub notification_url: String,
    pub expiration_date_time: DateTime<Utc>,
    #[serde(default)]
    pub client_state: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct GraphClient {
    http: Client,
    config: GraphConfig,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.config.base_url)
            .field("configured", &self.config.is_configured())
            .finish()
    }
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn notification_url(&self) -> &str {
        &self.config.notification_url
    }

    /// Client-credentials access token, served from cache while valid.
    pub async fn access_token(&self) -> Result<String, GraphError> {
        if !self.is_configured() {
            return Err(GraphError::NotConfigured);
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.login_url.trim_end_matches('/'),
            self.config.tenant_id
        );
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GraphError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let err = error_from_response(response).await;
            return Err(match err {
                GraphError::Api { status: 400, message } => GraphError::UpstreamAuth(message),
                other => other,
            });
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))?;

        debug!("Acquired Graph token valid for {}s", token.expires_in);
        let expires_at =
            Utc::now() + Duration::seconds((token.expires_in - TOKEN_EXPIRY_SKEW_SECS).max(0));
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }

    pub async fn create_subscription(
        &self,
        request: &NewGraphSubscription,
    ) -> Result<GraphSubscription, GraphError> {
        let access_token = self.access_token().await?;
        let url = format!("{}/subscriptions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| GraphError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.failure(response).await);
        }

        let created: GraphSubscription = response
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))?;

        info!(
            "Created Graph subscription {} on {} until {}",
            created.id, created.resource, created.expiration_date_time
        );
        Ok(created)
    }

    /// Deletes a subscription. One Graph no longer knows about counts as
    /// deleted.
    pub async fn delete_subscription(&self, subscription_id: &str) -> Result<(), GraphError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/subscriptions/{}",
            self.config.base_url.trim_end_matches('/'),
            subscription_id
        );

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| GraphError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                warn!("Graph subscription {subscription_id} was already gone");
                Ok(())
            }
            _ => Err(self.failure(response).await),
        }
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn failure(&self, response: Response) -> GraphError {
        let err = error_from_response(response).await;
        if matches!(err, GraphError::UpstreamAuth(_)) {
            debug!("Graph rejected the cached token, discarding it");
            self.invalidate_token().await;
        }
        err
    }
}

async fn error_from_response(response: Response) -> GraphError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    map_status(status, retry_after, &body)
}

fn map_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> GraphError {
    let message = graph_error_message(body).unwrap_or_else(|| {
        if body.is_empty() {
            status.to_string()
        } else {
            body.to_string()
        }
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GraphError::UpstreamAuth(message),
        StatusCode::TOO_MANY_REQUESTS => GraphError::UpstreamRateLimit { retry_after },
        _ => GraphError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pulls `error.message` (Graph) or `error_description` (token endpoint).
fn graph_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("error_description"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str) -> GraphConfig {
        GraphConfig {
            tenant_id: "contoso".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            base_url: server_url.to_string(),
            login_url: server_url.to_string(),
            notification_url: "https://eneo.example/api/v1/integrations/sharepoint/webhook".into(),
        }
    }

    fn new_subscription() -> NewGraphSubscription {
        NewGraphSubscription {
            change_type: "updated".into(),
            notification_url: "https://eneo.example/hook".into(),
            resource: "drives/b!abc/root".into(),
            expiration_date_time: Utc::now() + Duration::days(29),
            client_state: "state".into(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, None, ""),
            GraphError::UpstreamAuth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, None, ""),
            GraphError::UpstreamAuth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, Some(30), ""),
            GraphError::UpstreamRateLimit {
                retry_after: Some(30)
            }
        ));
        match map_status(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"error":{"code":"InvalidRequest","message":"Subscription validation request failed"}}"#,
        ) {
            GraphError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Subscription validation request failed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.client_secret.clear();
        let client = GraphClient::new(cfg);
        assert!(matches!(
            client.access_token().await,
            Err(GraphError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_token_is_cached_between_calls() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":3599,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        assert_eq!(client.access_token().await.expect("token"), "tok-1");
        assert_eq!(client.access_token().await.expect("token"), "tok-1");
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_reused() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"revoked","expires_in":3599}"#)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("POST", "/subscriptions")
            .with_status(401)
            .with_body(r#"{"error":{"code":"InvalidAuthenticationToken","message":"expired"}}"#)
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        assert!(matches!(
            client.create_subscription(&new_subscription()).await,
            Err(GraphError::UpstreamAuth(_))
        ));
        client.access_token().await.expect("token");
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_subscription() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3599}"#)
            .create_async()
            .await;
        let create_mock = server
            .mock("POST", "/subscriptions")
            .match_header("authorization", "Bearer tok")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"sub-1","resource":"drives/b!abc/root","changeType":"updated",
                "notificationUrl":"https://eneo.example/hook",
                "expirationDateTime":"2030-01-01T00:00:00Z","clientState":"state"}"#,
            )
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        let created = client
            .create_subscription(&new_subscription())
            .await
            .expect("create");
        assert_eq!(created.id, "sub-1");
        assert_eq!(created.client_state.as_deref(), Some("state"));
        create_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_subscription_throttled() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3599}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/subscriptions")
            .with_status(429)
            .with_header("retry-after", "12")
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        assert!(matches!(
            client.create_subscription(&new_subscription()).await,
            Err(GraphError::UpstreamRateLimit {
                retry_after: Some(12)
            })
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client","error_description":"bad secret"}"#)
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        match client.access_token().await {
            Err(GraphError::UpstreamAuth(message)) => assert_eq!(message, "bad secret"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_missing_subscription_is_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3599}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/subscriptions/gone")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("DELETE", "/subscriptions/broken")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = GraphClient::new(config(&server.url()));
        assert!(client.delete_subscription("gone").await.is_ok());
        assert!(matches!(
            client.delete_subscription("broken").await,
            Err(GraphError::Api { status: 500, .. })
        ));
    }
}
