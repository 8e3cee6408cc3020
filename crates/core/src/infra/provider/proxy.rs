use std::time::Duration;

use async_trait::async_trait;

use super::transport::HttpTransport;
use super::{wire, CleanupResult, Quote, SubmitReceipt, VideoProvider};
use crate::domain::error::ApiError;
use crate::domain::job::JobStatusSnapshot;
use crate::domain::model::ModelDescriptor;
use crate::domain::request::GenerationRequest;

/// 資格情報を持たず、vq-proxy 経由で同じルートを叩く実装
pub struct ProxyProvider {
    transport: HttpTransport,
    delete_media_on_completion: bool,
}

impl ProxyProvider {
    pub fn new(
        proxy_base_url: &str,
        timeout: Duration,
        delete_media_on_completion: bool,
    ) -> Result<Self, ApiError> {
        if proxy_base_url.trim().is_empty() {
            return Err(ApiError::config("proxy URL is empty"));
        }
        Ok(Self {
            transport: HttpTransport::new(proxy_base_url.trim(), None, timeout)?,
            delete_media_on_completion,
        })
    }
}

#[async_trait]
impl VideoProvider for ProxyProvider {
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
        "proxy"
    }
}
