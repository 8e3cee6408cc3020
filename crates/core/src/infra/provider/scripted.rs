use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CleanupResult, Quote, SubmitReceipt, VideoProvider};
use crate::domain::error::ApiError;
use crate::domain::job::JobStatusSnapshot;
use crate::domain::model::ModelDescriptor;
use crate::domain::request::{GenerationRequest, RequestPurpose};

/// ScriptedProvider が受けた（ネットワークに出るはずだった）呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Submit { model: String },
    Poll { queue_id: String },
    Quote { model: String },
    Cleanup { queue_id: String },
    ListModels,
    FetchVideo { url: String },
}

/// ScriptedProvider: 事前に積んだ応答を順に返すモック実装。
/// 検証は実装と同じ `shape()` を通すので、検証失敗時は呼び出しが記録されない。
pub struct ScriptedProvider {
    submit: Mutex<Result<SubmitReceipt, ApiError>>,
    polls: Mutex<VecDeque<Result<JobStatusSnapshot, ApiError>>>,
    quote: Mutex<Result<Quote, ApiError>>,
    cleanup: Mutex<Result<CleanupResult, ApiError>>,
    models: Mutex<Vec<ModelDescriptor>>,
    video_bytes: Mutex<Vec<u8>>,
    calls: Mutex<Vec<ProviderCall>>,
    submit_delay: Duration,
    poll_delay: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            submit: Mutex::new(Ok(SubmitReceipt {
                queue_id: "queue-1".to_string(),
                model_id: String::new(),
                message: None,
            })),
            polls: Mutex::new(VecDeque::new()),
            quote: Mutex::new(Ok(Quote::default())),
            cleanup: Mutex::new(Ok(CleanupResult {
                success: true,
                message: "Storage cleanup completed".to_string(),
            })),
            models: Mutex::new(Vec::new()),
            video_bytes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            submit_delay: Duration::ZERO,
            poll_delay: Duration::ZERO,
        }
    }

    pub fn with_queue_id(self, queue_id: &str) -> Self {
        *self.submit.lock() = Ok(SubmitReceipt {
            queue_id: queue_id.to_string(),
            model_id: String::new(),
            message: None,
        });
        self
    }

    pub fn with_submit_error(self, err: ApiError) -> Self {
        *self.submit.lock() = Err(err);
        self
    }

    /// ポーリング応答を順に積む。尽きた後は processing を返し続ける。
    pub fn with_polls(
        self,
        polls: impl IntoIterator<Item = Result<JobStatusSnapshot, ApiError>>,
    ) -> Self {
        self.polls.lock().extend(polls);
        self
    }

    pub fn with_quote(self, quote: Result<Quote, ApiError>) -> Self {
        *self.quote.lock() = quote;
        self
    }

    pub fn with_cleanup(self, result: Result<CleanupResult, ApiError>) -> Self {
        *self.cleanup.lock() = result;
        self
    }

    pub fn with_models(self, models: Vec<ModelDescriptor>) -> Self {
        *self.models.lock() = models;
        self
    }

    pub fn with_video_bytes(self, bytes: Vec<u8>) -> Self {
        *self.video_bytes.lock() = bytes;
        self
    }

    /// submit の応答を遅らせる（呼び出しは即座に記録される）
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// poll の応答を遅らせる
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Poll { .. }))
            .count()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().push(call);
    }

    async fn stall(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitReceipt, ApiError> {
        let body = request.shape(RequestPurpose::Submit)?;
        self.record(ProviderCall::Submit {
            model: body.model.clone(),
        });
        Self::stall(self.submit_delay).await;

        let mut receipt = self.submit.lock().clone()?;
        if receipt.model_id.is_empty() {
            receipt.model_id = body.model;
        }
        Ok(receipt)
    }

    async fn poll(
        &self,
        queue_id: &str,
        _model_id: Option<&str>,
    ) -> Result<JobStatusSnapshot, ApiError> {
        self.record(ProviderCall::Poll {
            queue_id: queue_id.to_string(),
        });
        Self::stall(self.poll_delay).await;
        self.polls
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(JobStatusSnapshot::processing()))
    }

    async fn quote(&self, request: &GenerationRequest) -> Result<Quote, ApiError> {
        let body = request.shape(RequestPurpose::Quote)?;
        self.record(ProviderCall::Quote { model: body.model });
        self.quote.lock().clone()
    }

    async fn cleanup(&self, queue_id: &str) -> Result<CleanupResult, ApiError> {
        self.record(ProviderCall::Cleanup {
            queue_id: queue_id.to_string(),
        });
        self.cleanup.lock().clone()
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ApiError> {
        self.record(ProviderCall::ListModels);
        Ok(self.models.lock().clone())
    }

    async fn fetch_video(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.record(ProviderCall::FetchVideo {
            url: url.to_string(),
        });
        Ok(self.video_bytes.lock().clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
