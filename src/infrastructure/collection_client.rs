//! REST client for the remote collection service
//!
//! Rate limiting is not done here: every outbound call is already serialized
//! and spaced by the orchestrator.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::product::AnalysisRecord;
use crate::domain::services::{CollectionService, ProductSubmission, RemoteProduct};
use crate::infrastructure::config::RemoteConfig;
use crate::infrastructure::sync_error::{SyncError, SyncResult};

/// `POST /auth/login` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// `GET /auth/me` answer; unknown fields are ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Body of `POST /products/analyze`
#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    sections: BTreeMap<String, String>,
}

/// FastAPI-style error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

pub struct CollectionClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl CollectionClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        // Url::join drops the last path segment unless it ends with '/'
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| anyhow!("Invalid remote base URL '{}': {}", base, e))?;

        Ok(Self { client, base_url, access_token: config.access_token.clone() })
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SyncError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> SyncResult<R> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self.authorized(self.client.post(url)).json(body).send().await?;
        decode(response).await
    }

    /// OAuth2 password form login
    pub async fn login(&self, username: &str, password: &str) -> SyncResult<AuthToken> {
        let url = self.endpoint("auth/login")?;
        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let token: AuthToken = decode(response).await?;
        info!("Logged in to collection service as {}", username);
        Ok(token)
    }

    pub async fn me(&self) -> SyncResult<RemoteIdentity> {
        let url = self.endpoint("auth/me")?;
        let response = self.authorized(self.client.get(url)).send().await?;
        decode(response).await
    }
}

/// Map status to the error taxonomy, then parse the body
async fn decode<R: DeserializeOwned>(response: Response) -> SyncResult<R> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        warn!("Collection service rejected credentials ({})", response.url());
        return Err(SyncError::AuthExpired);
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(SyncError::transport(Some(status.as_u16()), error_message(status, &body)));
    }

    serde_json::from_str(&body).map_err(|e| SyncError::InvalidResponse(format!("{e}: {}", truncate(&body, 200))))
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: serde_json::Value::String(detail) }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => status.canonical_reason().unwrap_or("error").to_string(),
        Err(_) => truncate(body, 200).to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices().nth(max_chars).map_or(text, |(idx, _)| &text[..idx])
}

#[async_trait]
impl CollectionService for CollectionClient {
    async fn submit_product(&self, submission: &ProductSubmission) -> SyncResult<RemoteProduct> {
        let created: RemoteProduct = self.post_json("products/", submission).await?;
        info!(product_id = %submission.record.product_id, remote_id = %created.id, "product submitted");
        Ok(created)
    }

    async fn analyze_product(&self, submission: &ProductSubmission) -> SyncResult<AnalysisRecord> {
        let response: AnalysisResponse = self.post_json("products/analyze", submission).await?;
        Ok(AnalysisRecord {
            product_id: submission.record.product_id.clone(),
            scores: response.scores,
            sections: response.sections,
            analyzed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `status` and a JSON `body`; yields the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api/v1", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                } else if n == 0 {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8(raw).unwrap()
        });
        (base, server)
    }

    fn client(base: &str) -> CollectionClient {
        let config = RemoteConfig { base_url: base.to_string(), ..RemoteConfig::default() };
        CollectionClient::new(&config).unwrap()
    }

    #[test]
    fn endpoints_keep_base_path() {
        let client = client("https://api.example.com/api/v1");
        assert_eq!(client.endpoint("products/").unwrap().as_str(), "https://api.example.com/api/v1/products/");
        assert_eq!(client.endpoint("/auth/me").unwrap().as_str(), "https://api.example.com/api/v1/auth/me");
    }

    #[test]
    fn error_detail_is_extracted() {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"detail": "Missing asin"}"#), "Missing asin");
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail": [{"loc": ["body"]}]}"#),
            r#"[{"loc":["body"]}]"#
        );
        assert_eq!(error_message(StatusCode::INTERNAL_SERVER_ERROR, ""), "Internal Server Error");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_failure() {
        // port 9 (discard) is closed on test hosts
        let client = client("http://127.0.0.1:9");
        let err = client.me().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: None, .. }));
        assert!(err.releases_dedup());
    }

    #[tokio::test]
    async fn login_posts_password_form_and_decodes_token() {
        let (base, server) = serve_once("200 OK", r#"{"access_token": "tok-123", "token_type": "bearer"}"#).await;

        let token = client(&base).login("ana@example.com", "secret").await.unwrap();
        assert_eq!(token, AuthToken { access_token: "tok-123".into(), token_type: "bearer".into() });

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/auth/login "));
        assert!(request.to_ascii_lowercase().contains("content-type: application/x-www-form-urlencoded"));
        assert!(request.ends_with("username=ana%40example.com&password=secret"));
    }

    #[tokio::test]
    async fn rejected_login_is_auth_expired() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"detail": "Incorrect email or password"}"#).await;
        assert!(matches!(client(&base).login("ana@example.com", "wrong").await, Err(SyncError::AuthExpired)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn access_token_is_sent_as_bearer() {
        let (base, server) = serve_once("200 OK", r#"{"id": "u-1", "email": "ana@example.com", "is_active": true}"#).await;

        let identity = client(&base).with_access_token("tok-123").me().await.unwrap();
        assert_eq!(identity.id, "u-1");
        assert_eq!(identity.email, "ana@example.com");
        assert_eq!(identity.first_name, None);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/v1/auth/me "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-123"));
    }
}
