use std::time::Duration;

use async_trait::async_trait;

use super::transport::HttpTransport;
use super::{wire, CleanupResult, Quote, SubmitReceipt, VideoProvider};
use crate::domain::error::ApiError;
use crate::domain::job::JobStatusSnapshot;
use crate::domain::model::ModelDescriptor;
use crate::domain::request::GenerationRequest;

/// トークンを持ってプロバイダーAPIへ直接接続する実装
pub struct DirectProvider {
    transport: HttpTransport,
    delete_media_on_completion: bool,
}

impl DirectProvider {
    pub fn new(
        api_token: String,
        base_url: &str,
        timeout: Duration,
        delete_media_on_completion: bool,
    ) -> Result<Self, ApiError> {
        if api_token.trim().is_empty() {
            return Err(ApiError::config("API token is empty"));
        }
        Ok(Self {
            transport: HttpTransport::new(base_url, Some(api_token), timeout)?,
            delete_media_on_completion,
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }
}

#[async_trait]
impl VideoProvider for DirectProvider {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitReceipt, ApiError> {
        wire::submit(&self.transport, request).await
    }

    async fn poll(
        &self,
        queue_id: &str,
        model_id: Option<&str>,
    ) -> Result<JobStatusSnapshot, ApiError> {
        wire::poll(
            &self.transport,
            queue_id,
            model_id,
            self.delete_media_on_completion,
        )
        .await
    }

    async fn quote(&self, request: &GenerationRequest) -> Result<Quote, ApiError> {
        wire::quote(&self.transport, request).await
    }

    async fn cleanup(&self, queue_id: &str) -> Result<CleanupResult, ApiError> {
        wire::cleanup(&self.transport, queue_id).await
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ApiError> {
        wire::list_models(&self.transport).await
    }

    async fn fetch_video(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.transport.get_bytes(url).await
    }

    fn name(&self) -> &str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_config_error() {
        let err = DirectProvider::new(
            "  ".to_string(),
            "https://api.example.com/api/v1",
            Duration::from_secs(5),
            false,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Config { .. }));
    }
}
