use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::error::{ApiError, ErrorCode, ProviderErrorKind};

/// 完了前に表示する進捗の上限
pub const MAX_IN_FLIGHT_PROGRESS: u8 = 95;

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitting,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// 終端状態からは遷移しない
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

/// 生成結果の動画。URL か、取得済みのバイナリのどちらか。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VideoResource {
    Remote {
        url: String,
    },
    Inline {
        content_type: String,
        #[serde(skip)]
        data: Arc<Vec<u8>>,
        size_bytes: usize,
    },
}

impl VideoResource {
    pub fn inline(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        let size_bytes = data.len();
        Self::Inline {
            content_type: content_type.into(),
            data: Arc::new(data),
            size_bytes,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Remote { url } => Some(url),
            Self::Inline { .. } => None,
        }
    }

    /// 表示用の参照（URL かローカルの blob 表現）
    pub fn locator(&self) -> String {
        match self {
            Self::Remote { url } => url.clone(),
            Self::Inline {
                content_type,
                size_bytes,
                ..
            } => format!("blob:{content_type};{size_bytes} bytes"),
        }
    }

    /// インラインのバイナリをファイルに書き出す。URL の場合は None。
    pub async fn save_inline(&self, path: &Path) -> std::io::Result<Option<usize>> {
        match self {
            Self::Inline { data, .. } => {
                tokio::fs::write(path, data.as_slice()).await?;
                Ok(Some(data.len()))
            }
            Self::Remote { .. } => Ok(None),
        }
    }
}

/// 1回のポーリング結果（状態機械で解釈する前の生データ）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStatusSnapshot {
    /// 小文字化済みのステータス文字列
    pub status: String,
    /// 平均実行時間（ミリ秒）
    pub average_execution_ms: Option<f64>,
    /// 経過実行時間（ミリ秒）
    pub elapsed_execution_ms: Option<f64>,
    pub video: Option<VideoResource>,
    /// プロバイダーが返した失敗理由
    pub error: Option<String>,
}

impl JobStatusSnapshot {
    pub fn processing() -> Self {
        Self {
            status: "processing".to_string(),
            ..Default::default()
        }
    }

    pub fn with_timing(mut self, elapsed_ms: f64, average_ms: f64) -> Self {
        self.elapsed_execution_ms = Some(elapsed_ms);
        self.average_execution_ms = Some(average_ms);
        self
    }

    pub fn completed(video: VideoResource) -> Self {
        Self {
            status: "completed".to_string(),
            video: Some(video),
            ..Default::default()
        }
    }

    pub fn failed(reason: Option<String>) -> Self {
        Self {
            status: "failed".to_string(),
            error: reason,
            ..Default::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "error")
    }

    /// 経過/平均から算出した進捗（0〜95）。どちらか欠けていれば None。
    pub fn computed_progress(&self) -> Option<u8> {
        let (avg, elapsed) = (self.average_execution_ms?, self.elapsed_execution_ms?);
        if !(avg > 0.0) || !elapsed.is_finite() {
            return None;
        }
        let pct = (elapsed / avg * 100.0).round();
        Some(pct.clamp(0.0, f64::from(MAX_IN_FLIGHT_PROGRESS)) as u8)
    }

    /// 残り秒数の推定
    pub fn estimated_seconds_remaining(&self) -> Option<f64> {
        let (avg, elapsed) = (self.average_execution_ms?, self.elapsed_execution_ms?);
        if !avg.is_finite() || !elapsed.is_finite() {
            return None;
        }
        Some(((avg - elapsed) / 1000.0).max(0.0))
    }
}

/// 終端失敗の記録。判別子（code / provider_kind）はメッセージと独立に保持する。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub code: ErrorCode,
    pub provider_kind: Option<ProviderErrorKind>,
    pub message: String,
}

impl JobFailure {
    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Generation,
            provider_kind: None,
            message: message.into(),
        }
    }
}

impl From<&ApiError> for JobFailure {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.code(),
            provider_kind: err.provider_kind(),
            message: err.message(),
        }
    }
}

/// 状態遷移の記録
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub job_id: String,
    pub prev_state: JobState,
    pub new_state: JobState,
}

/// 1件の生成ジョブ
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// ローカルで採番するID（UUID v4）
    pub job_id: String,
    /// プロバイダーが払い出すキューID
    pub queue_id: Option<String>,
    pub model_id: String,
    pub state: JobState,
    pub progress_percent: u8,
    pub estimated_seconds_remaining: Option<f64>,
    pub result_video: Option<VideoResource>,
    pub error: Option<JobFailure>,
    /// 発行済みのポーリング回数
    pub poll_attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn new(job_id: String, model_id: String, now: String) -> Self {
        Self {
            job_id,
            queue_id: None,
            model_id,
            state: JobState::Submitting,
            progress_percent: 0,
            estimated_seconds_remaining: None,
            result_video: None,
            error: None,
            poll_attempts: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn transition(&mut self, new_state: JobState, now: String) -> StateTransition {
        let prev_state = self.state;
        self.state = new_state;
        self.updated_at = now;
        StateTransition {
            job_id: self.job_id.clone(),
            prev_state,
            new_state,
        }
    }

    /// 投入成功: Submitting → Queued
    pub fn on_submitted(
        &mut self,
        queue_id: String,
        model_id: String,
        now: String,
    ) -> Option<StateTransition> {
        if self.state != JobState::Submitting {
            return None;
        }
        self.queue_id = Some(queue_id);
        self.model_id = model_id;
        Some(self.transition(JobState::Queued, now))
    }

    /// ポーリング結果を反映する。状態が変わった場合のみ遷移を返す。
    pub fn apply_snapshot(
        &mut self,
        snapshot: &JobStatusSnapshot,
        now: String,
    ) -> Option<StateTransition> {
        if self.state.is_terminal() {
            return None;
        }
        self.poll_attempts += 1;

        if snapshot.is_completed() {
            if let Some(video) = &snapshot.video {
                self.progress_percent = 100;
                self.estimated_seconds_remaining = Some(0.0);
                self.result_video = Some(video.clone());
                return Some(self.transition(JobState::Completed, now));
            }
            // 結果がまだ解決できない完了報告は処理中として扱う
        }

        if snapshot.is_failed() {
            let message = snapshot
                .error
                .clone()
                .unwrap_or_else(|| "Video generation failed".to_string());
            self.error = Some(JobFailure::generation(message));
            return Some(self.transition(JobState::Failed, now));
        }

        // 進捗は単調非減少。タイミング情報が欠けていれば前回値を維持する。
        if let Some(pct) = snapshot.computed_progress() {
            self.progress_percent = self.progress_percent.max(pct);
        }
        self.estimated_seconds_remaining = snapshot.estimated_seconds_remaining();

        if self.state == JobState::Processing {
            self.updated_at = now;
            None
        } else {
            Some(self.transition(JobState::Processing, now))
        }
    }

    pub fn fail(&mut self, failure: JobFailure, now: String) -> Option<StateTransition> {
        if self.state.is_terminal() {
            return None;
        }
        self.error = Some(failure);
        self.estimated_seconds_remaining = None;
        Some(self.transition(JobState::Failed, now))
    }

    pub fn cancel(&mut self, now: String) -> Option<StateTransition> {
        if self.state.is_terminal() {
            return None;
        }
        self.estimated_seconds_remaining = None;
        Some(self.transition(JobState::Cancelled, now))
    }

    pub fn time_out(&mut self, now: String) -> Option<StateTransition> {
        if self.state.is_terminal() {
            return None;
        }
        self.estimated_seconds_remaining = None;
        Some(self.transition(JobState::TimedOut, now))
    }
}
