//! 表示アダプター。ジョブのイベントを画面の副作用（進捗・トースト・動画表示）に変換し、
//! ユーザー操作（開始・キャンセル・見積もり・掃除・保存）をジョブ管理へのコマンドに変換する。
//! リクエスト整形と状態遷移はここには置かない。

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::error::{ApiError, ErrorCode, ProviderErrorKind, RequestField};
use crate::domain::job::{Job, JobFailure, JobState, VideoResource};
use crate::domain::model::ModelDescriptor;
use crate::domain::request::{GenerationRequest, RequestPurpose};
use crate::infra::provider::{CleanupResult, Quote};
use crate::usecase::job_runner::{JobEvent, JobHandle, JobRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// 画面に出すエラー。判別子をメッセージと別に持つので、文言解析なしで対処文言を選べる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub provider_kind: Option<ProviderErrorKind>,
    /// 検証エラーの対象フィールド
    pub field: Option<RequestField>,
    pub message: String,
    pub remediation: Option<String>,
    /// 入力修正や再試行で解決しうるか
    pub recoverable: bool,
}

fn remediation_for(code: ErrorCode, kind: Option<ProviderErrorKind>) -> Option<String> {
    if let Some(kind) = kind {
        return Some(kind.remediation().to_string());
    }
    let text = match code {
        ErrorCode::Network => "Unable to reach the video API. Check your connection and try again.",
        ErrorCode::Timeout => "The server is taking too long to respond. Please try again.",
        ErrorCode::Config => "Set VQ_API_TOKEN for direct access or VQ_PROXY_URL for a proxy.",
        ErrorCode::Generation => "Video generation failed. Try a different prompt or model.",
        ErrorCode::Validation | ErrorCode::Protocol | ErrorCode::Provider => return None,
    };
    Some(text.to_string())
}

impl From<&ApiError> for ErrorNotice {
    fn from(err: &ApiError) -> Self {
        let field = match err {
            ApiError::Validation { field, .. } => Some(*field),
            _ => None,
        };
        Self {
            code: err.code(),
            provider_kind: err.provider_kind(),
            field,
            message: err.message(),
            remediation: remediation_for(err.code(), err.provider_kind()),
            recoverable: field.is_some() || err.is_transient(),
        }
    }
}

impl From<&JobFailure> for ErrorNotice {
    fn from(failure: &JobFailure) -> Self {
        let recoverable = matches!(failure.code, ErrorCode::Network | ErrorCode::Timeout)
            || failure.provider_kind.is_some_and(|k| k.is_transient());
        Self {
            code: failure.code,
            provider_kind: failure.provider_kind,
            field: None,
            message: failure.message.clone(),
            remediation: remediation_for(failure.code, failure.provider_kind),
            recoverable,
        }
    }
}

/// 描画側が実装する契約
pub trait JobView: Send + Sync {
    /// 状態・進捗・残り時間の再描画
    fn render_job(&self, job: &Job);
    fn toast(&self, toast: Toast);
    fn show_video(&self, video: &VideoResource);
    fn show_error(&self, notice: ErrorNotice);
}

/// 保存時のエラー
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("No video available")]
    NoVideo,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Failed to write video: {0}")]
    Io(#[from] std::io::Error),
}

/// 残り時間の表示（"45s" / "2m 5s" / "1h 3m"）
pub fn format_time_remaining(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0s".to_string();
    }
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

struct ActiveJob {
    handle: JobHandle,
    observer: Option<JoinHandle<()>>,
}

/// Presentation Adapter
pub struct Presenter {
    runner: JobRunner,
    view: Arc<dyn JobView>,
    current: Mutex<Option<ActiveJob>>,
    models: Mutex<Option<Vec<ModelDescriptor>>>,
}

impl Presenter {
    pub fn new(runner: JobRunner, view: Arc<dyn JobView>) -> Self {
        Self {
            runner,
            view,
            current: Mutex::new(None),
            models: Mutex::new(None),
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    // ==================== Catalog ====================

    /// モデル一覧（セッション中は1回だけ取得する）
    pub async fn load_models(&self) -> Result<Vec<ModelDescriptor>, ApiError> {
        if let Some(models) = self.models.lock().clone() {
            return Ok(models);
        }

        match self.runner.provider().list_models().await {
            Ok(models) => {
                log::info!("Loaded {} video models", models.len());
                *self.models.lock() = Some(models.clone());
                Ok(models)
            }
            Err(e) => {
                self.view.show_error(ErrorNotice::from(&e));
                Err(e)
            }
        }
    }

    /// 次回の load_models で再取得させる
    pub fn refresh_models(&self) {
        *self.models.lock() = None;
    }

    fn cached_model(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.models
            .lock()
            .as_ref()
            .and_then(|models| models.iter().find(|m| m.id == model_id.trim()).cloned())
    }

    fn prepare(&self, request: GenerationRequest) -> GenerationRequest {
        if request.model_info.is_some() {
            return request;
        }
        match self.cached_model(&request.model) {
            Some(info) => request.with_model_info(info),
            None => request,
        }
    }

    fn reject(&self, purpose: RequestPurpose, e: ApiError) -> ApiError {
        log::warn!("{purpose:?} blocked: {e}");
        self.view.show_error(ErrorNotice::from(&e));
        e
    }

    // ==================== Commands ====================

    /// 新しいジョブを開始する。検証に失敗したらネットワークに出ずにエラーを表示する。
    /// 実行中のジョブがあればキャンセルしてから開始する。
    pub fn start_new_job(&self, request: GenerationRequest) -> Result<JobHandle, ApiError> {
        let request = self.prepare(request);
        if let Err(e) = request.validate(RequestPurpose::Submit) {
            return Err(self.reject(RequestPurpose::Submit, e));
        }

        if let Some(previous) = self.current.lock().take() {
            if !previous.handle.state().is_terminal() {
                log::info!("Replacing running job {}", previous.handle.job_id());
                previous.handle.cancel();
            }
        }

        let (handle, events) = self.runner.start(request);
        let observer = tokio::spawn(observe(handle.clone(), events, self.view.clone()));

        *self.current.lock() = Some(ActiveJob {
            handle: handle.clone(),
            observer: Some(observer),
        });
        Ok(handle)
    }

    /// 実行中のジョブをキャンセルする。対象がなければ false。
    pub fn cancel(&self) -> bool {
        let guard = self.current.lock();
        match guard.as_ref() {
            Some(active) if !active.handle.state().is_terminal() => {
                active.handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// 現在のジョブのスナップショット
    pub fn current(&self) -> Option<Job> {
        self.current.lock().as_ref().map(|a| a.handle.snapshot())
    }

    /// 現在のジョブが終わり、表示への反映も終わるまで待つ
    pub async fn wait_current(&self) -> Option<Job> {
        let (handle, observer) = {
            let mut guard = self.current.lock();
            let active = guard.as_mut()?;
            (active.handle.clone(), active.observer.take())
        };

        let job = handle.wait().await;
        if let Some(observer) = observer {
            if let Err(e) = observer.await {
                log::error!("Job observer stopped abnormally: {e}");
            }
        }
        Some(job)
    }

    pub async fn quote(&self, request: GenerationRequest) -> Result<Quote, ApiError> {
        let request = self.prepare(request);
        if let Err(e) = request.validate(RequestPurpose::Quote) {
            return Err(self.reject(RequestPurpose::Quote, e));
        }

        self.runner.provider().quote(&request).await.inspect_err(|e| {
            self.view.show_error(ErrorNotice::from(e));
        })
    }

    /// ストレージ掃除。失敗は警告トーストのみで、ジョブ状態には触れない。
    pub async fn cleanup(&self, queue_id: &str) -> Option<CleanupResult> {
        match self.runner.provider().cleanup(queue_id).await {
            Ok(result) if result.success => {
                self.view.toast(Toast::new(ToastLevel::Success, result.message.clone()));
                Some(result)
            }
            Ok(result) => {
                log::warn!("Cleanup of {queue_id} reported failure: {}", result.message);
                self.view.toast(Toast::new(
                    ToastLevel::Warning,
                    format!("Storage cleanup failed: {}", result.message),
                ));
                Some(result)
            }
            Err(e) => {
                log::warn!("Cleanup of {queue_id} failed: {e}");
                self.view.toast(Toast::new(
                    ToastLevel::Warning,
                    format!("Storage cleanup failed: {}", e.message()),
                ));
                None
            }
        }
    }

    /// 完了したジョブの動画を保存する。URL の場合はプロバイダー経由で取得する。
    pub async fn save_result(&self, path: &Path) -> Result<usize, SaveError> {
        let video = self
            .current()
            .filter(|job| job.state == JobState::Completed)
            .and_then(|job| job.result_video)
            .ok_or(SaveError::NoVideo)?;

        let written = match video.save_inline(path).await? {
            Some(written) => written,
            None => {
                let url = video.remote_url().ok_or(SaveError::NoVideo)?;
                let bytes = self.runner.provider().fetch_video(url).await?;
                tokio::fs::write(path, &bytes).await?;
                bytes.len()
            }
        };

        log::info!("Saved {written} bytes to {}", path.display());
        self.view.toast(Toast::new(
            ToastLevel::Success,
            format!("Video saved to {}", path.display()),
        ));
        Ok(written)
    }
}

/// イベントを描画呼び出しに変換する。送信側が閉じたら終了。
async fn observe(
    handle: JobHandle,
    mut events: broadcast::Receiver<JobEvent>,
    view: Arc<dyn JobView>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Observer for job {} skipped {skipped} events", handle.job_id());
                view.render_job(&handle.snapshot());
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            JobEvent::StateChanged(transition) => {
                view.render_job(&handle.snapshot());
                match transition.new_state {
                    JobState::Queued => {
                        view.toast(Toast::new(ToastLevel::Success, "Video generation started!"))
                    }
                    JobState::Cancelled => {
                        view.toast(Toast::new(ToastLevel::Warning, "Generation cancelled"))
                    }
                    JobState::TimedOut => view.toast(Toast::new(
                        ToastLevel::Error,
                        "Video generation timed out. Please try again.",
                    )),
                    _ => {}
                }
            }
            JobEvent::Progress { .. } => view.render_job(&handle.snapshot()),
            JobEvent::Completed { video, .. } => {
                view.show_video(&video);
                view.toast(Toast::new(ToastLevel::Success, "Video generated successfully!"));
            }
            JobEvent::Failed { failure, .. } => view.show_error(ErrorNotice::from(&failure)),
            JobEvent::Warning { message, .. } => {
                view.toast(Toast::new(ToastLevel::Warning, message))
            }
        }
    }
}
