use crate::backend::BackendClient;
use crate::config::AppConfig;
use crate::controller::{run_controller, UiCommand};
use crate::model::{FeedEvent, ProcessRequest, UpdateMessage};
use crate::realtime::WebSocketTransport;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ytproc-cli",
    version,
    about = "Submit YouTube processing jobs and follow live progress updates"
)]
pub struct Cli {
    /// Base URL of the processing backend
    #[arg(long, env = "YTPROC_BACKEND_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,

    /// Realtime messaging service URL (required; ws://, wss://, http:// or https://)
    #[arg(long, env = "YTPROC_REALTIME_URL")]
    pub realtime_url: Option<String>,

    /// API key for the realtime messaging service
    #[arg(long, env = "YTPROC_REALTIME_KEY")]
    pub realtime_key: Option<String>,

    /// Submit from the flags below and stream feed lines to stdout (no TUI);
    /// runs until interrupted with Ctrl-C
    #[arg(long)]
    pub text: bool,

    /// YouTube video ID to process (repeatable)
    #[arg(long = "video-id")]
    pub video_ids: Vec<String>,

    /// Read newline-separated video IDs from a file
    #[arg(long)]
    pub ids_file: Option<std::path::PathBuf>,

    /// Number of top videos per channel
    #[arg(long, default_value_t = 10)]
    pub num_videos: u32,

    /// Number of comments per video to retrieve
    #[arg(long, default_value_t = 50)]
    pub num_comments: u32,

    /// Number of tags per video
    #[arg(long, default_value_t = 5)]
    pub num_tags: u32,

    /// Strength of tag clustering (0.0 - 1.0)
    #[arg(long, default_value_t = 0.3)]
    pub clustering_strength: f64,

    /// Delay before the single resubscription attempt after a channel error
    #[arg(long, default_value = "5s")]
    pub resubscribe_delay: humantime::Duration,

    /// HTTP request timeout for the submission call
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.text {
        return run_text(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_text(args).await
    }
}

/// Build a `ProcessRequest` from CLI arguments. The CLI flags are the input
/// widgets of the headless mode, so value validation lives here.
pub fn build_request(args: &Cli) -> Result<ProcessRequest> {
    let mut video_ids: Vec<String> = args
        .video_ids
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(path) = &args.ids_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading video IDs from {}", path.display()))?;
        video_ids.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    if video_ids.is_empty() {
        anyhow::bail!("no video IDs given (use --video-id or --ids-file)");
    }
    if !(0.0..=1.0).contains(&args.clustering_strength) {
        anyhow::bail!("--clustering-strength must be between 0.0 and 1.0");
    }

    Ok(ProcessRequest {
        video_ids,
        num_videos: args.num_videos,
        num_comments: args.num_comments,
        num_tags: args.num_tags,
        clustering_strength: args.clustering_strength,
    })
}

/// Render one feed line for plain-text output.
pub fn format_feed_line(m: &UpdateMessage) -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    let stamp = m
        .received_at
        .format(&fmt)
        .unwrap_or_else(|_| "--:--:--".into());
    format!("{stamp} [{}] {}", m.severity.tag(), m.text)
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = AppConfig::from_cli(&args)?;
    let request = build_request(&args)?;
    let backend = BackendClient::new(&cfg)?;
    let transport = Arc::new(WebSocketTransport::new(cfg.realtime.clone()));

    let (out_tx, out_handle) = spawn_output_writer();
    let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<FeedEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let controller = tokio::spawn(run_controller(
        backend,
        transport,
        cfg.resubscribe_delay,
        feed_tx,
        cmd_rx,
    ));
    let _ = cmd_tx.send(UiCommand::Submit(request));

    loop {
        tokio::select! {
            ev = feed_rx.recv() => match ev {
                Some(FeedEvent::Update(m)) => {
                    let _ = out_tx.send(OutputLine::Stdout(format_feed_line(&m)));
                }
                Some(FeedEvent::SessionStarted { session_id }) => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("Session: {session_id}")));
                }
                Some(FeedEvent::Channel(status)) => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("Channel: {}", status.label())));
                }
                Some(FeedEvent::SubmissionFailed { reason }) => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("Submission failed: {reason}")));
                }
                Some(FeedEvent::FeedCleared) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break;
            }
        }
    }

    drop(cmd_tx);
    controller.await.context("controller task failed")??;
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
