//! プロバイダーの5ルートをミラーし、資格情報をサーバー側で付与するプロキシ。
//! 業務ロジックは持たず、ステータスと本文（動画バイナリ含む）をそのまま返す。

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

pub const DEFAULT_UPSTREAM_BASE: &str = "https://api.venice.ai/api/v1";

/// プロキシ設定
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub api_token: Option<String>,
    pub upstream_base: String,
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            api_token: None,
            upstream_base: DEFAULT_UPSTREAM_BASE.to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ProxyConfig {
    /// | Env Var           | Default                         |
    /// |-------------------|---------------------------------|
    /// | `PORT`            | `3000`                          |
    /// | `VQ_API_TOKEN`    | (none)                          |
    /// | `VQ_API_BASE`     | `https://api.venice.ai/api/v1`  |
    /// | `VQ_TIMEOUT_SECS` | `60`                            |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT={port}"),
            }
        }
        config.api_token = get("VQ_API_TOKEN");
        if let Some(base) = get("VQ_API_BASE") {
            config.upstream_base = base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = get("VQ_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => config.request_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid VQ_TIMEOUT_SECS={secs}"),
            }
        }
        config
    }
}

/// プロキシのエラー
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("API token not configured")]
    MissingToken,
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::MissingToken => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(e) => {
                log::error!("Upstream request failed: {e}");
                if e.is_timeout() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// ハンドラー間で共有する状態
#[derive(Clone)]
pub struct AppState {
    client: reqwest::Client,
    config: Arc<ProxyConfig>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        if config.api_token.is_none() {
            log::warn!("VQ_API_TOKEN is not set. API calls will fail.");
        }
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn token(&self) -> Result<&str, ProxyError> {
        self.config.api_token.as_deref().ok_or(ProxyError::MissingToken)
    }

    fn upstream(&self, path: &str) -> String {
        format!("{}{}", self.config.upstream_base, path)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/models", get(models))
        .route("/api/video/queue", post(queue))
        .route("/api/video/retrieve", post(retrieve))
        .route("/api/video/quote", post(quote))
        .route("/api/video/complete", post(complete))
        .with_state(state)
}

async fn models(State(state): State<AppState>) -> Result<Response, ProxyError> {
    let token = state.token()?;
    let response = state
        .client
        .get(state.upstream("/models?type=video"))
        .bearer_auth(token)
        .send()
        .await?;
    passthrough(response).await
}

async fn queue(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    forward(&state, "/video/queue", body).await
}

async fn retrieve(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    forward(&state, "/video/retrieve", body).await
}

async fn quote(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    forward(&state, "/video/quote", body).await
}

async fn complete(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    forward(&state, "/video/complete", body).await
}

async fn forward(state: &AppState, path: &str, body: Bytes) -> Result<Response, ProxyError> {
    let token = state.token()?;
    log::debug!("POST {path}: {}", String::from_utf8_lossy(&body));

    let response = state
        .client
        .post(state.upstream(path))
        .bearer_auth(token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;
    passthrough(response).await
}

/// 上流のステータス・Content-Type・本文をそのまま返す
async fn passthrough(response: reqwest::Response) -> Result<Response, ProxyError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let body = response.bytes().await?;

    if !status.is_success() {
        log::warn!("Upstream returned {status}");
    }

    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = ProxyConfig::from_lookup(|_| None);
        assert_eq!(config.port, 3000);
        assert!(config.api_token.is_none());
        assert_eq!(config.upstream_base, DEFAULT_UPSTREAM_BASE);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_config_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("VQ_API_TOKEN", "secret"),
            ("VQ_API_BASE", "http://127.0.0.1:9000/v1/"),
            ("VQ_TIMEOUT_SECS", "soon"),
        ]);
        let config = ProxyConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.upstream_base, "http://127.0.0.1:9000/v1");
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_missing_token_response() {
        let response = ProxyError::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
