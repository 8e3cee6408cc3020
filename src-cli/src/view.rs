//! 端末向けの JobView 実装。進捗は stderr の1行を上書きし、結果は stdout に出す。

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use vq_core::domain::job::{Job, VideoResource};
use vq_core::usecase::presenter::{format_time_remaining, ErrorNotice, JobView, Toast, ToastLevel};

pub struct TerminalView {
    /// 進捗行を改行せずに出している最中か
    line_open: AtomicBool,
}

impl TerminalView {
    pub fn new() -> Self {
        Self {
            line_open: AtomicBool::new(false),
        }
    }

    fn close_line(&self) {
        if self.line_open.swap(false, Ordering::SeqCst) {
            eprintln!();
        }
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_line(job: &Job) -> String {
    let eta = job
        .estimated_seconds_remaining
        .map(|secs| format!(", ~{} remaining", format_time_remaining(secs)))
        .unwrap_or_default();
    format!(
        "[{}] {:>3}%{eta} (poll {})",
        job.state.as_str(),
        job.progress_percent,
        job.poll_attempts
    )
}

fn toast_prefix(level: ToastLevel) -> &'static str {
    match level {
        ToastLevel::Info => "info",
        ToastLevel::Success => "ok",
        ToastLevel::Warning => "warning",
        ToastLevel::Error => "error",
    }
}

impl JobView for TerminalView {
    fn render_job(&self, job: &Job) {
        if job.state.is_terminal() {
            self.close_line();
            return;
        }
        let mut stderr = std::io::stderr().lock();
        // 前の行より短くなっても残骸が出ないよう末尾を空白で埋める
        let _ = write!(stderr, "\r{:<60}", progress_line(job));
        let _ = stderr.flush();
        self.line_open.store(true, Ordering::SeqCst);
    }

    fn toast(&self, toast: Toast) {
        self.close_line();
        eprintln!("{}: {}", toast_prefix(toast.level), toast.message);
    }

    fn show_video(&self, video: &VideoResource) {
        self.close_line();
        match video {
            VideoResource::Remote { url } => println!("Video URL: {url}"),
            VideoResource::Inline {
                content_type,
                size_bytes,
                ..
            } => println!("Received {size_bytes} bytes ({content_type})"),
        }
    }

    fn show_error(&self, notice: ErrorNotice) {
        self.close_line();
        match notice.field {
            Some(field) => eprintln!("error [{}] {field}: {}", notice.code.as_str(), notice.message),
            None => eprintln!("error [{}]: {}", notice.code.as_str(), notice.message),
        }
        if let Some(hint) = notice.remediation {
            eprintln!("  hint: {hint}");
        }
        if notice.recoverable {
            eprintln!("  (you can adjust the input or retry)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vq_core::domain::job::JobState;

    fn job(state: JobState, percent: u8, eta: Option<f64>) -> Job {
        let mut job = Job::new("job-1".into(), "m".into(), "2026-01-01T00:00:00Z".into());
        job.state = state;
        job.progress_percent = percent;
        job.estimated_seconds_remaining = eta;
        job.poll_attempts = 3;
        job
    }

    #[test]
    fn test_progress_line_with_eta() {
        let line = progress_line(&job(JobState::Processing, 42, Some(125.0)));
        assert_eq!(line, "[processing]  42%, ~2m 5s remaining (poll 3)");
    }

    #[test]
    fn test_progress_line_without_eta() {
        let line = progress_line(&job(JobState::Queued, 0, None));
        assert_eq!(line, "[queued]   0% (poll 3)");
    }

    #[test]
    fn test_terminal_render_closes_open_line() {
        let view = TerminalView::new();
        view.render_job(&job(JobState::Processing, 10, None));
        assert!(view.line_open.load(Ordering::SeqCst));
        view.render_job(&job(JobState::Completed, 100, Some(0.0)));
        assert!(!view.line_open.load(Ordering::SeqCst));
    }
}
