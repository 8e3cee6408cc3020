mod commands;
mod view;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use vq_core::domain::request::{AspectRatio, DurationInput, GenerationRequest};
use vq_core::domain::settings::ClientSettings;
use vq_core::infra::provider::build_provider;
use vq_core::usecase::job_runner::JobRunner;
use vq_core::usecase::presenter::{ErrorNotice, JobView, Presenter};

use crate::commands::CommandError;
use crate::view::TerminalView;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Generate videos through a queued video API
struct Args {
    /// Proxy base URL (overrides VQ_PROXY_URL; ignored when VQ_API_TOKEN is set)
    #[arg(long, global = true, value_name = "URL")]
    proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print collected metrics as JSON when the command finishes
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available video models
    Models,
    /// Estimate the cost of a generation without submitting it
    Quote {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Submit a generation and follow it until it finishes
    Generate {
        #[command(flatten)]
        job: JobArgs,

        /// Where to write the video (binary results default to vidqueue-<timestamp>.mp4)
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Delete the provider-side media after the video is saved
        #[arg(long)]
        cleanup: bool,
    },
    /// Delete provider-side media for a finished queue item
    Cleanup {
        /// Queue ID returned at submission
        queue_id: String,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// Model ID from `vidqueue models`
    #[arg(long, short)]
    model: String,

    #[arg(long, short)]
    prompt: Option<String>,

    /// Source image URL or data:image/... URI for image-to-video models
    #[arg(long, value_name = "URL")]
    image: Option<String>,

    /// Motion description (sent instead of --prompt for image-to-video models)
    #[arg(long)]
    motion: Option<String>,

    /// Length such as 5 or "10s"
    #[arg(long)]
    duration: Option<String>,

    /// 16:9, 9:16 or 1:1
    #[arg(long)]
    aspect: Option<AspectRatio>,

    #[arg(long)]
    resolution: Option<String>,
}

impl JobArgs {
    fn into_request(self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.model);
        request.prompt = self.prompt;
        request.source_image = self.image;
        request.motion_prompt = self.motion;
        request.duration = self.duration.as_deref().map(DurationInput::from);
        request.aspect_ratio = self.aspect;
        request.resolution = self.resolution;
        request
    }
}

fn settings_for(args: &Args) -> ClientSettings {
    let mut settings = ClientSettings::from_env();
    if let Some(proxy) = &args.proxy {
        settings.proxy_base_url = Some(proxy.trim_end_matches('/').to_string());
    }
    if let Some(secs) = args.timeout {
        settings.request_timeout_secs = secs;
    }
    settings
}

async fn run(args: Args) -> Result<(), CommandError> {
    let settings = settings_for(&args);
    let view = Arc::new(TerminalView::new());
    let provider =
        build_provider(&settings).inspect_err(|e| view.show_error(ErrorNotice::from(e)))?;
    log::info!("Using {} provider", provider.name());

    let runner = JobRunner::new(provider, settings.poll.clone());
    let presenter = Presenter::new(runner, view);

    let result = match args.command {
        Command::Models => commands::list_models(&presenter).await,
        Command::Quote { job } => commands::quote(&presenter, job.into_request()).await,
        Command::Generate {
            job,
            output,
            cleanup,
        } => commands::generate(&presenter, job.into_request(), output, cleanup).await,
        Command::Cleanup { queue_id } => commands::cleanup(&presenter, &queue_id).await,
    };

    if args.stats {
        commands::print_stats(&presenter)?;
    }
    result
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run(Args::parse()).await {
        log::error!("{e}");
        if !e.is_reported() {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}
