//! 生成ジョブのライフサイクル管理（投入 → ポーリング → 終端）。
//!
//! ジョブの状態はポーリングループだけが `watch::Sender` 経由で書き換える。
//! 観測側は `JobHandle::snapshot()` で一貫したスナップショットを読み、
//! `JobEvent` の broadcast で変化を受け取る。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::error::ApiError;
use crate::domain::job::{
    Job, JobFailure, JobState, JobStatusSnapshot, StateTransition, VideoResource,
};
use crate::domain::request::GenerationRequest;
use crate::domain::settings::PollPolicy;
use crate::infra::metrics::{Metrics, Phase};
use crate::infra::provider::VideoProvider;

const EVENT_CAPACITY: usize = 64;

/// 観測者に通知するイベント
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    StateChanged(StateTransition),
    /// ポーリング毎の進捗（終端以外）
    Progress {
        job_id: String,
        percent: u8,
        eta_seconds: Option<f64>,
    },
    Completed {
        job_id: String,
        video: VideoResource,
    },
    Failed {
        job_id: String,
        failure: JobFailure,
    },
    /// ジョブ状態に影響しない警告（掃除の失敗など）
    Warning {
        job_id: String,
        message: String,
    },
}

/// 実行中ジョブへの読み取りアクセスとキャンセル
#[derive(Clone)]
pub struct JobHandle {
    job_id: String,
    state: watch::Receiver<Job>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// 現在のジョブのスナップショット
    pub fn snapshot(&self) -> Job {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().state
    }

    /// 協調的キャンセル。次のループ境界で Cancelled になる。
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("Cancellation requested for job {}", self.job_id);
            self.cancel.cancel();
        }
    }

    /// ポーリングタスクが終了したか（後処理の掃除を含む）
    pub fn is_finished(&self) -> bool {
        self.state.has_changed().is_err()
    }

    /// タスク終了まで待ち、最終状態を返す
    pub async fn wait(&self) -> Job {
        let mut rx = self.state.clone();
        while rx.changed().await.is_ok() {}
        let last = rx.borrow().clone();
        last
    }
}

/// Job Lifecycle Manager
pub struct JobRunner {
    provider: Arc<dyn VideoProvider>,
    policy: PollPolicy,
    metrics: Arc<Metrics>,
}

impl JobRunner {
    pub fn new(provider: Arc<dyn VideoProvider>, policy: PollPolicy) -> Self {
        Self {
            provider,
            policy,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn VideoProvider> {
        &self.provider
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// ジョブを開始する。返る Receiver は最初のイベントから受け取れる。
    pub fn start(&self, request: GenerationRequest) -> (JobHandle, broadcast::Receiver<JobEvent>) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let job = Job::new(job_id.clone(), request.model.trim().to_string(), now);

        let (state_tx, state_rx) = watch::channel(job);
        let (event_tx, event_rx) = broadcast::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        log::info!(
            "Job {job_id} started (model={}, provider={})",
            request.model.trim(),
            self.provider.name()
        );

        let driver = Driver {
            job_id: job_id.clone(),
            provider: self.provider.clone(),
            policy: self.policy.clone(),
            metrics: self.metrics.clone(),
            state: state_tx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run(request));

        (
            JobHandle {
                job_id,
                state: state_rx,
                cancel,
            },
            event_rx,
        )
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// 1ジョブ分のポーリングループ。状態の唯一の書き手。
struct Driver {
    job_id: String,
    provider: Arc<dyn VideoProvider>,
    policy: PollPolicy,
    metrics: Arc<Metrics>,
    state: watch::Sender<Job>,
    events: broadcast::Sender<JobEvent>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, request: GenerationRequest) {
        let started = Instant::now();
        self.drive(&request).await;

        let (state, queue_id) = {
            let job = self.state.borrow();
            (job.state, job.queue_id.clone())
        };
        self.metrics.record_outcome(state);

        if state == JobState::Completed {
            self.metrics
                .record_latency(Phase::Generation, elapsed_ms(started));
            if self.policy.cleanup_on_completion {
                if let Some(queue_id) = queue_id {
                    self.cleanup(&queue_id).await;
                }
            }
        }
    }

    async fn drive(&self, request: &GenerationRequest) {
        if self.cancel.is_cancelled() {
            self.mark_cancelled();
            return;
        }

        let submit_started = Instant::now();
        let receipt = match self.provider.submit(request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };
        self.metrics
            .record_latency(Phase::Submit, elapsed_ms(submit_started));
        self.metrics.inc_jobs_submitted();

        // 投入中にキャンセルされた場合は Queued を通知しない。queue_id は掃除用に黙って残す。
        if self.cancel.is_cancelled() {
            log::info!(
                "Job {} cancelled while submitting (queue_id={})",
                self.job_id,
                receipt.queue_id
            );
            self.state
                .send_modify(|job| job.queue_id = Some(receipt.queue_id.clone()));
            self.mark_cancelled();
            return;
        }
        log::info!("Job {} queued as {}", self.job_id, receipt.queue_id);

        let queue_id = receipt.queue_id.clone();
        let model_id = receipt.model_id.clone();
        self.update(|job, now| job.on_submitted(receipt.queue_id, receipt.model_id, now));

        if !self.pause(self.policy.initial_delay()).await {
            return;
        }

        let mut consecutive_errors = 0u32;
        for attempt in 1..=self.policy.max_attempts {
            if self.cancel.is_cancelled() {
                self.mark_cancelled();
                return;
            }

            log::debug!(
                "Job {} poll attempt {attempt}/{}",
                self.job_id,
                self.policy.max_attempts
            );
            self.metrics.inc_polls_issued();
            let poll_started = Instant::now();
            let result = self.provider.poll(&queue_id, Some(&model_id)).await;
            self.metrics.record_latency(Phase::Poll, elapsed_ms(poll_started));

            if self.cancel.is_cancelled() {
                log::debug!("Job {} discarding poll result after cancellation", self.job_id);
                self.mark_cancelled();
                return;
            }

            let mut delay = self.policy.interval();
            match result {
                Ok(snapshot) => {
                    consecutive_errors = 0;
                    if self.apply(&snapshot) {
                        return;
                    }
                }
                Err(e) => {
                    self.metrics.inc_error(e.code());
                    self.count_failed_poll();

                    if e.is_not_found() && attempt <= self.policy.not_found_grace_attempts {
                        log::warn!(
                            "Job {} not yet indexed (attempt {attempt}), backing off",
                            self.job_id
                        );
                        delay = self.policy.not_found_backoff();
                    } else if e.is_transient() {
                        consecutive_errors += 1;
                        if consecutive_errors > self.policy.max_consecutive_errors {
                            log::error!(
                                "Job {} giving up after {consecutive_errors} consecutive errors",
                                self.job_id
                            );
                            self.finish_failed(&e);
                            return;
                        }
                        log::warn!("Job {} poll attempt {attempt} failed: {e}", self.job_id);
                    } else {
                        self.finish_failed(&e);
                        return;
                    }
                }
            }

            if attempt < self.policy.max_attempts && !self.pause(delay).await {
                return;
            }
        }

        log::warn!(
            "Job {} timed out after {} poll attempts",
            self.job_id,
            self.policy.max_attempts
        );
        self.update(|job, now| job.time_out(now));
    }

    /// 待機する。キャンセルされたら Cancelled にして false を返す。
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.mark_cancelled();
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// スナップショットを反映する。終端に達したら true。
    fn apply(&self, snapshot: &JobStatusSnapshot) -> bool {
        self.update(|job, now| job.apply_snapshot(snapshot, now));

        let (state, percent, eta_seconds) = {
            let job = self.state.borrow();
            (
                job.state,
                job.progress_percent,
                job.estimated_seconds_remaining,
            )
        };

        if state.is_terminal() {
            return true;
        }
        self.emit(JobEvent::Progress {
            job_id: self.job_id.clone(),
            percent,
            eta_seconds,
        });
        false
    }

    fn fail(&self, e: &ApiError) {
        self.metrics.inc_error(e.code());
        self.finish_failed(e);
    }

    fn finish_failed(&self, e: &ApiError) {
        log::error!("Job {} failed: {e}", self.job_id);
        let failure = JobFailure::from(e);
        self.update(|job, now| job.fail(failure, now));
    }

    fn mark_cancelled(&self) {
        if self.update(|job, now| job.cancel(now)).is_some() {
            log::info!("Job {} cancelled", self.job_id);
        }
    }

    fn count_failed_poll(&self) {
        self.state.send_modify(|job| job.poll_attempts += 1);
    }

    async fn cleanup(&self, queue_id: &str) {
        match self.provider.cleanup(queue_id).await {
            Ok(result) if result.success => {
                log::info!("Job {} storage cleanup: {}", self.job_id, result.message);
            }
            Ok(result) => self.warn(format!("Storage cleanup failed: {}", result.message)),
            Err(e) => {
                self.metrics.inc_error(e.code());
                self.warn(format!("Storage cleanup failed: {}", e.message()));
            }
        }
    }

    fn warn(&self, message: String) {
        log::warn!("Job {}: {message}", self.job_id);
        self.emit(JobEvent::Warning {
            job_id: self.job_id.clone(),
            message,
        });
    }

    fn emit(&self, event: JobEvent) {
        // 購読者がいなくても問題ない
        let _ = self.events.send(event);
    }

    /// 状態を書き換え、遷移があればイベントを流す
    fn update(
        &self,
        f: impl FnOnce(&mut Job, String) -> Option<StateTransition>,
    ) -> Option<StateTransition> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut transition = None;
        self.state.send_modify(|job| transition = f(job, now));
        let transition = transition?;

        log::info!(
            "Job {}: {} -> {}",
            self.job_id,
            transition.prev_state.as_str(),
            transition.new_state.as_str()
        );
        self.emit(JobEvent::StateChanged(transition.clone()));

        let (video, failure) = {
            let job = self.state.borrow();
            (job.result_video.clone(), job.error.clone())
        };
        match (transition.new_state, video, failure) {
            (JobState::Completed, Some(video), _) => self.emit(JobEvent::Completed {
                job_id: self.job_id.clone(),
                video,
            }),
            (JobState::Failed, _, Some(failure)) => self.emit(JobEvent::Failed {
                job_id: self.job_id.clone(),
                failure,
            }),
            _ => {}
        }

        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{ErrorCode, ProviderErrorKind};
    use crate::infra::provider::{CleanupResult, ProviderCall, ScriptedProvider};

    fn text_request() -> GenerationRequest {
        let mut request = GenerationRequest::new("wan-2.1-text-to-video");
        request.prompt = Some("a lighthouse at dusk".to_string());
        request
    }

    fn runner(provider: &Arc<ScriptedProvider>, policy: PollPolicy) -> JobRunner {
        JobRunner::new(provider.clone(), policy)
    }

    fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn remote(url: &str) -> VideoResource {
        VideoResource::Remote {
            url: url.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_with_remote_video() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Ok(JobStatusSnapshot::processing().with_timing(10_000.0, 100_000.0)),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress_percent, 100);
        assert_eq!(job.estimated_seconds_remaining, Some(0.0));
        assert_eq!(job.queue_id.as_deref(), Some("queue-1"));
        assert_eq!(job.poll_attempts, 2);
        assert_eq!(provider.poll_count(), 2);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            JobEvent::Completed { video, .. } if video.remote_url() == Some("https://cdn.example.com/v.mp4")
        )));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_binary_completion_path() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([Ok(
            JobStatusSnapshot::completed(VideoResource::inline("video/mp4", vec![0, 0, 0, 24])),
        )]));
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        match job.result_video {
            Some(VideoResource::Inline { size_bytes, .. }) => assert_eq!(size_bytes, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_never_regresses() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Ok(JobStatusSnapshot::processing().with_timing(10.0, 100.0)),
            Ok(JobStatusSnapshot::processing().with_timing(5.0, 100.0)),
            Ok(JobStatusSnapshot::processing().with_timing(50.0, 100.0)),
            Ok(JobStatusSnapshot::processing()),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());
        handle.wait().await;

        let percents: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![10, 10, 50, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_result_keeps_polling() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Ok(JobStatusSnapshot {
                status: "completed".to_string(),
                ..Default::default()
            }),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(provider.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_attempt_budget() {
        let provider = Arc::new(ScriptedProvider::new());
        let policy = PollPolicy {
            max_attempts: 4,
            ..Default::default()
        };
        let started = Instant::now();
        let (handle, _rx) = runner(&provider, policy).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::TimedOut);
        assert_eq!(provider.poll_count(), 4);
        assert_eq!(job.poll_attempts, 4);
        // 初回遅延 3s + 間隔 10s × 3
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(33) && elapsed < Duration::from_secs(34));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(provider.poll_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_polls() {
        let provider = Arc::new(ScriptedProvider::new());
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let mut progress_seen = 0;
        while progress_seen < 2 {
            if let Ok(JobEvent::Progress { .. }) = rx.recv().await {
                progress_seen += 1;
            }
        }
        handle.cancel();
        let polls_at_cancel = provider.poll_count();

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.error.is_none());
        assert_eq!(provider.poll_count(), polls_at_cancel);
        assert_eq!(polls_at_cancel, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_submit_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new());
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());
        handle.cancel();

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Cancelled);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_submit_emits_no_queued_event() {
        let provider =
            Arc::new(ScriptedProvider::new().with_submit_delay(Duration::from_secs(5)));
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.calls().len(), 1);
        handle.cancel();

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.queue_id.as_deref(), Some("queue-1"));
        assert_eq!(provider.poll_count(), 0);

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            JobEvent::StateChanged(t) if t.new_state == JobState::Queued
        )));
        assert!(!events.iter().any(|e| matches!(e, JobEvent::Progress { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            JobEvent::StateChanged(t) if t.new_state == JobState::Cancelled
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_poll_discards_result() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_polls([Ok(JobStatusSnapshot::processing().with_timing(50.0, 100.0))])
                .with_poll_delay(Duration::from_secs(5)),
        );
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());

        // 初回待機 3 秒の後、最初の poll が応答待ちの間にキャンセルする
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(provider.poll_count(), 1);
        handle.cancel();

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.progress_percent, 0);
        assert_eq!(provider.poll_count(), 1);

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, JobEvent::Progress { .. })));
        let last = events.iter().rev().find_map(|e| match e {
            JobEvent::StateChanged(t) => Some(t.new_state),
            _ => None,
        });
        assert_eq!(last, Some(JobState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_on_first_attempt_is_tolerated() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Err(ApiError::provider(404, "Queue item not found")),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let started = Instant::now();
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        // 初回遅延 3s + not-found 後の待機 20s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(23) && elapsed < Duration::from_secs(24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_after_grace_window_is_fatal() {
        let mut polls: Vec<Result<JobStatusSnapshot, ApiError>> =
            (0..9).map(|_| Ok(JobStatusSnapshot::processing())).collect();
        polls.push(Err(ApiError::provider(404, "Queue item not found")));
        let provider = Arc::new(ScriptedProvider::new().with_polls(polls));
        let (handle, mut rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(provider.poll_count(), 10);
        let failure = job.error.unwrap();
        assert_eq!(failure.code, ErrorCode::Provider);
        assert_eq!(failure.provider_kind, Some(ProviderErrorKind::NotFound));

        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, JobEvent::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Err(ApiError::network("connection reset")),
            Err(ApiError::timeout("slow")),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.poll_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_consecutive_errors_fail_the_job() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Err(ApiError::network("down")),
            Err(ApiError::network("down")),
            Err(ApiError::network("down")),
        ]));
        let policy = PollPolicy {
            max_consecutive_errors: 2,
            ..Default::default()
        };
        let (handle, _rx) = runner(&provider, policy).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.unwrap().code, ErrorCode::Network);
        assert_eq!(provider.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_required_is_fatal() {
        let provider = Arc::new(
            ScriptedProvider::new().with_polls([Err(ApiError::provider(402, "no credits"))]),
        );
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error.unwrap().provider_kind,
            Some(ProviderErrorKind::PaymentRequired)
        );
        assert_eq!(provider.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_carries_reason() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([Ok(
            JobStatusSnapshot::failed(Some("content policy".to_string())),
        )]));
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Failed);
        let failure = job.error.unwrap();
        assert_eq!(failure.code, ErrorCode::Generation);
        assert_eq!(failure.message, "content policy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_skips_polling() {
        let provider = Arc::new(
            ScriptedProvider::new().with_submit_error(ApiError::provider(401, "bad key")),
        );
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Failed);
        assert!(job.queue_id.is_none());
        assert_eq!(provider.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_failure_is_only_a_warning() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_queue_id("q-9")
                .with_polls([Ok(JobStatusSnapshot::completed(remote(
                    "https://cdn.example.com/v.mp4",
                )))])
                .with_cleanup(Err(ApiError::provider(500, "oops"))),
        );
        let policy = PollPolicy {
            cleanup_on_completion: true,
            ..Default::default()
        };
        let (handle, mut rx) = runner(&provider, policy).start(text_request());

        let job = handle.wait().await;
        assert_eq!(job.state, JobState::Completed);
        assert!(job.error.is_none());
        assert!(provider.calls().contains(&ProviderCall::Cleanup {
            queue_id: "q-9".to_string()
        }));
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, JobEvent::Warning { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_not_called_by_default() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_polls([Ok(JobStatusSnapshot::completed(remote(
                    "https://cdn.example.com/v.mp4",
                )))])
                .with_cleanup(Ok(CleanupResult {
                    success: true,
                    message: "ok".to_string(),
                })),
        );
        let (handle, _rx) = runner(&provider, PollPolicy::default()).start(text_request());
        handle.wait().await;

        assert!(!provider
            .calls()
            .iter()
            .any(|c| matches!(c, ProviderCall::Cleanup { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_are_recorded() {
        let provider = Arc::new(ScriptedProvider::new().with_polls([
            Err(ApiError::network("blip")),
            Ok(JobStatusSnapshot::completed(remote("https://cdn.example.com/v.mp4"))),
        ]));
        let job_runner = runner(&provider, PollPolicy::default());
        let (handle, _rx) = job_runner.start(text_request());
        handle.wait().await;

        let summary = job_runner.metrics().summary();
        assert_eq!(summary.jobs_submitted, 1);
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.polls_issued, 2);
        assert_eq!(summary.error_counts.get("E_NETWORK"), Some(&1));
        assert!(summary.avg_latency_ms.generation.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_jobs_do_not_share_state() {
        let provider = Arc::new(ScriptedProvider::new());
        let policy = PollPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let job_runner = runner(&provider, policy);
        let (first, _rx1) = job_runner.start(text_request());
        let (second, _rx2) = job_runner.start(text_request());
        first.cancel();

        assert_eq!(first.wait().await.state, JobState::Cancelled);
        assert_eq!(second.wait().await.state, JobState::TimedOut);
        assert_ne!(first.job_id(), second.job_id());
    }
}
