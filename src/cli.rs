use crate::engine::{selection, HttpTransport, Transport};
use crate::model::{ClientConfig, Outcome, SelectedFile, DEFAULT_BASE_URL};
use crate::orchestrator::{self, Controller};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
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
    name = "pothole-detect",
    version,
    about = "Classify road images as pothole / no pothole via a remote detection service"
)]
pub struct Cli {
    /// Image to classify (JPEG or PNG). Optional in TUI mode.
    pub image: Option<PathBuf>,

    /// Base URL of the detection service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Request timeout
    #[arg(long, default_value = "10s")]
    pub timeout: humantime::Duration,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for scripting)
    #[arg(long)]
    pub silent: bool,

    /// Check that the service is reachable and exit
    #[arg(long)]
    pub health: bool,

    /// Export the result record as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Directory for saved classification history
    #[arg(long)]
    pub history_dir: Option<PathBuf>,
}

impl Cli {
    /// Whether the interactive TUI will own the terminal.
    pub fn is_tui(&self) -> bool {
        cfg!(feature = "tui") && !(self.json || self.text || self.silent || self.health)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    if args.health {
        return run_health(args).await;
    }

    if !args.json && !args.text && !args.silent {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_once(args).await;
        }
    }

    run_once(args).await
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.clone(),
        timeout: args.timeout.into(),
        auto_save: args.auto_save,
        history_dir: args.history_dir.clone(),
        ..Default::default()
    }
}

/// Load an image named on the command line. Unlike a drop, a rejected file is an error.
pub(crate) async fn load_image_arg(path: &Path) -> Result<SelectedFile> {
    let (path, kind) = selection::accept_candidates(&[path.to_path_buf()])
        .with_context(|| format!("{} is not a JPEG or PNG image", path.display()))?;
    selection::load_selected_file(&path, kind).await
}

/// Classify a single image given on the command line, print it, and exit.
async fn run_once(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let path = args
        .image
        .clone()
        .context("an image path is required with --json/--text")?;
    let file = load_image_arg(&path).await?;

    let transport = Arc::new(HttpTransport::new(&cfg)?);
    let mut controller = Controller::new(transport);
    controller.select_file(file);
    controller.submit().await;

    let record = controller
        .record()
        .context("classification finished without an outcome")?;
    let processed =
        orchestrator::process_completion(&cfg, args.export_json.as_deref(), 0, &record);

    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    if let Some(tx) = out_tx.as_ref() {
        if args.json {
            let out = serde_json::to_string_pretty(&record)?;
            let _ = tx.send(OutputLine::Stdout(out));
        } else {
            let summary = crate::text_summary::build_text_summary(controller.view());
            for line in summary.lines {
                let _ = tx.send(OutputLine::Stdout(line));
            }
        }
        for msg in &processed.export_messages {
            let _ = tx.send(OutputLine::Stderr(msg.clone()));
        }
        if let Some(p) = processed.auto_saved_path.as_ref() {
            let _ = tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
        }
    }

    if let Some(tx) = out_tx {
        drop(tx);
    }
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    match record.outcome {
        Outcome::Classified { .. } => Ok(()),
        Outcome::Failed { error } => Err(error.into()),
    }
}

async fn run_health(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let transport = HttpTransport::new(&cfg)?;
    let message = transport.health().await?;
    println!("{}: {}", transport.base_url(), message);
    Ok(())
}
