use std::path::{Path, PathBuf};

use vq_core::domain::error::ApiError;
use vq_core::domain::job::{JobState, VideoResource};
use vq_core::domain::model::ModelDescriptor;
use vq_core::domain::request::GenerationRequest;
use vq_core::usecase::presenter::{Presenter, SaveError};

/// コマンドエラー型
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Save(#[from] SaveError),
    #[error("Job {job_id} ended as {state}")]
    Unfinished { job_id: String, state: &'static str },
    #[error("Storage cleanup failed for {0}")]
    Cleanup(String),
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CommandError {
    /// 画面側ですでに表示済みのエラーか
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Unfinished { .. } | Self::Cleanup(_))
    }
}

type CmdResult<T> = Result<T, CommandError>;

fn join_or_dash<T: ToString>(values: &[T]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}

fn model_line(model: &ModelDescriptor) -> String {
    let mut flags = Vec::new();
    if model.audio {
        flags.push("audio");
    }
    if model.offline {
        flags.push("offline");
    }
    format!(
        "{:<40} {:<15} durations={} resolutions={} ratios={} {}",
        model.id,
        model.kind.as_str(),
        join_or_dash(&model.constraints.durations),
        join_or_dash(&model.constraints.resolutions),
        join_or_dash(&model.constraints.aspect_ratios),
        flags.join(" "),
    )
    .trim_end()
    .to_string()
}

/// バイナリ結果で出力先が未指定のときの保存先
fn default_output(now: chrono::DateTime<chrono::Local>) -> PathBuf {
    PathBuf::from(format!("vidqueue-{}.mp4", now.format("%Y%m%d-%H%M%S")))
}

fn output_for(video: &VideoResource, requested: Option<PathBuf>) -> Option<PathBuf> {
    match (requested, video) {
        (Some(path), _) => Some(path),
        (None, VideoResource::Inline { .. }) => Some(default_output(chrono::Local::now())),
        (None, VideoResource::Remote { .. }) => None,
    }
}

// --- Commands ---

pub async fn list_models(presenter: &Presenter) -> CmdResult<()> {
    let models = presenter.load_models().await?;
    if models.is_empty() {
        println!("No video models available");
    }
    for model in &models {
        println!("{}", model_line(model));
    }
    Ok(())
}

pub async fn quote(presenter: &Presenter, request: GenerationRequest) -> CmdResult<()> {
    // カタログ取得に失敗しても種別はモデルIDから推定できる
    if presenter.load_models().await.is_err() {
        log::warn!("Quoting without model catalog");
    }
    let quote = presenter.quote(request).await?;
    match (quote.estimated_cost, quote.credits_required) {
        (Some(cost), Some(credits)) => println!("Estimated cost: {cost} ({credits} credits)"),
        (Some(cost), None) => println!("Estimated cost: {cost}"),
        (None, Some(credits)) => println!("Credits required: {credits}"),
        (None, None) => println!("The provider did not return a quote"),
    }
    Ok(())
}

/// 投入して終端まで追従する。Ctrl-C でキャンセルを要求する。
pub async fn generate(
    presenter: &Presenter,
    request: GenerationRequest,
    output: Option<PathBuf>,
    cleanup: bool,
) -> CmdResult<()> {
    if presenter.load_models().await.is_err() {
        log::warn!("Submitting without model catalog");
    }
    let handle = presenter.start_new_job(request)?;

    tokio::select! {
        _ = handle.wait() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                log::info!("Interrupt received, cancelling {}", handle.job_id());
                presenter.cancel();
            }
            Err(e) => log::warn!("Unable to listen for Ctrl-C: {e}"),
        },
    }
    let job = presenter
        .wait_current()
        .await
        .unwrap_or_else(|| handle.snapshot());

    if job.state != JobState::Completed {
        return Err(CommandError::Unfinished {
            job_id: job.job_id,
            state: job.state.as_str(),
        });
    }

    if let Some(video) = &job.result_video {
        if let Some(path) = output_for(video, output) {
            save(presenter, &path).await?;
        }
    }

    if cleanup {
        if let Some(queue_id) = &job.queue_id {
            ensure_cleaned(presenter, queue_id).await?;
        }
    }
    Ok(())
}

async fn save(presenter: &Presenter, path: &Path) -> CmdResult<()> {
    let written = presenter.save_result(path).await?;
    println!("Saved {written} bytes to {}", path.display());
    Ok(())
}

async fn ensure_cleaned(presenter: &Presenter, queue_id: &str) -> CmdResult<()> {
    match presenter.cleanup(queue_id).await {
        Some(result) if result.success => Ok(()),
        _ => Err(CommandError::Cleanup(queue_id.to_string())),
    }
}

pub async fn cleanup(presenter: &Presenter, queue_id: &str) -> CmdResult<()> {
    ensure_cleaned(presenter, queue_id).await
}

pub fn print_stats(presenter: &Presenter) -> CmdResult<()> {
    let summary = presenter.runner().metrics().summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
