mod direct;
mod proxy;
mod scripted;
mod transport;
mod wire;

pub use direct::DirectProvider;
pub use proxy::ProxyProvider;
pub use scripted::{ProviderCall, ScriptedProvider};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::error::ApiError;
use crate::domain::job::JobStatusSnapshot;
use crate::domain::model::ModelDescriptor;
use crate::domain::request::GenerationRequest;
use crate::domain::settings::ClientSettings;

/// 投入結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub queue_id: String,
    /// プロバイダーが返したモデルID（無ければ送信値）
    pub model_id: String,
    pub message: Option<String>,
}

/// 見積もり
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quote {
    pub estimated_cost: Option<f64>,
    pub credits_required: Option<f64>,
}

/// ストレージ掃除の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub success: bool,
    pub message: String,
}

/// 動画生成プロバイダーの契約。直接接続とプロキシ経由の2実装がある。
#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitReceipt, ApiError>;

    async fn poll(
        &self,
        queue_id: &str,
        model_id: Option<&str>,
    ) -> Result<JobStatusSnapshot, ApiError>;

    async fn quote(&self, request: &GenerationRequest) -> Result<Quote, ApiError>;

    async fn cleanup(&self, queue_id: &str) -> Result<CleanupResult, ApiError>;

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ApiError>;

    /// URL で返った動画本体を取得する
    async fn fetch_video(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    fn name(&self) -> &str;
}

/// 設定からプロバイダーを構築する（起動時に一度だけ選択）
pub fn build_provider(settings: &ClientSettings) -> Result<Arc<dyn VideoProvider>, ApiError> {
    if let Some(token) = &settings.api_token {
        log::info!("Direct provider selected ({})", settings.api_base_url);
        return Ok(Arc::new(DirectProvider::new(
            token.clone(),
            &settings.api_base_url,
            settings.request_timeout(),
            settings.poll.delete_media_on_completion,
        )?));
    }

    if let Some(proxy_url) = &settings.proxy_base_url {
        log::info!("Proxy provider selected ({proxy_url})");
        return Ok(Arc::new(ProxyProvider::new(
            proxy_url,
            settings.request_timeout(),
            settings.poll.delete_media_on_completion,
        )?));
    }

    Err(ApiError::config(
        "either VQ_API_TOKEN or VQ_PROXY_URL must be set",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_provider_prefers_token() {
        let settings = ClientSettings {
            api_token: Some("tok".to_string()),
            proxy_base_url: Some("http://localhost:3000/api".to_string()),
            ..Default::default()
        };
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "direct");
    }

    #[test]
    fn test_build_provider_falls_back_to_proxy() {
        let settings = ClientSettings {
            proxy_base_url: Some("http://localhost:3000/api".to_string()),
            ..Default::default()
        };
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "proxy");
    }

    #[test]
    fn test_build_provider_requires_configuration() {
        let err = build_provider(&ClientSettings::default()).err().unwrap();
        assert!(matches!(err, ApiError::Config { .. }));
    }
}
