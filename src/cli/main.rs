//! Background removal CLI
//!
//! Drives the same controller as the desktop window, with a console view
//! and a blocking completion loop.

use super::config::CliConfigBuilder;
use crate::{
    backends::OnnxEngine,
    config::StudioConfig,
    controller::{AppController, ApplicationState},
    dispatcher::TaskKind,
    error::Failure,
    inference::SegmentationEngine,
    models::ModelId,
    tracing_config::{init_cli_tracing, spans},
    view::{Preview, StudioView},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Remove the background from one image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-studio")]
pub struct Cli {
    /// Input image (jpg, jpeg, png, webp)
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Option<PathBuf>,

    /// Output PNG [default: <INPUT stem>_nobg.png next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Model: u2net, isnet-general-use or isnet-anime
    #[arg(short, long)]
    pub model: Option<String>,

    /// Refine mask edges (alpha matting)
    #[arg(long)]
    pub alpha_matting: bool,

    /// Directory containing <model>.onnx weight files
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Execution providers in priority order (auto, cpu, cuda, coreml)
    #[arg(short, long, value_delimiter = ',')]
    pub execution_provider: Vec<String>,

    /// Number of intra-op threads (0 = runtime default)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Configuration file [default: platform config dir]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report engine preload failures instead of retrying on first use
    #[arg(long)]
    pub report_preload_failures: bool,

    /// Show execution provider availability and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Hide the progress spinner
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        bail!("An input image is required");
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let _session = spans::session(&session_id, config.default_model).entered();

    let view = ConsoleView::new(!cli.quiet);
    let saved = run(Arc::new(OnnxEngine::new()), config, view, &input, &output)?;

    println!("Saved {}", saved.display());
    Ok(())
}

/// Process `input` and write the cutout to `output`
///
/// # Errors
/// - Controller setup, image loading or saving failed
/// - The job failed; the error carries the engine's message
pub fn run<E: SegmentationEngine>(
    engine: Arc<E>,
    config: StudioConfig,
    view: ConsoleView,
    input: &Path,
    output: &Path,
) -> Result<PathBuf> {
    let _file = spans::file_processing(input).entered();

    let mut controller =
        AppController::new(engine, config, view).context("Failed to create controller")?;
    controller.start()?;
    controller
        .load_image(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    while controller.state() == ApplicationState::LoadingEngine {
        if !controller.wait_for_completion() {
            bail!("Worker stopped during engine preload");
        }
    }

    controller.process().context("Failed to start processing")?;
    while controller.is_pending(TaskKind::Inference) {
        if !controller.wait_for_completion() {
            bail!("Worker stopped during processing");
        }
    }

    if let Some(message) = controller.view_mut().take_error() {
        controller.shutdown();
        bail!("Processing failed: {message}");
    }

    let saved = controller.save_result(output)?;
    controller.shutdown();
    Ok(saved)
}

/// `<dir>/<stem>_nobg.png` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}_nobg.png"))
}

fn show_provider_diagnostics() {
    println!("Execution providers:");
    for (provider, available, description) in OnnxEngine::list_providers() {
        let status = if available { "available" } else { "unavailable" };
        println!("  {provider:<8} {status:<12} {description}");
    }
}

/// Console rendition of the studio window
pub struct ConsoleView {
    spinner: ProgressBar,
    error: Option<String>,
}

impl ConsoleView {
    #[must_use]
    pub fn new(show_progress: bool) -> Self {
        let spinner = if show_progress {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                spinner.set_style(style);
            }
            spinner
        } else {
            ProgressBar::hidden()
        };
        Self {
            spinner,
            error: None,
        }
    }

    /// Failure message of the last job, if it failed
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

impl StudioView for ConsoleView {
    fn on_engine_ready(&mut self) {
        debug!("Engine ready");
    }

    fn on_engine_degraded(&mut self, failure: &Failure) {
        self.spinner
            .suspend(|| eprintln!("Warning: engine preload failed: {failure}"));
    }

    fn on_model_switched(&mut self, model: ModelId) {
        info!(model = %model, "Model switched");
    }

    fn on_processing_started(&mut self) {
        self.error = None;
    }

    fn on_processing_succeeded(&mut self, result: &Preview, elapsed: Duration) {
        let (width, height) = result.source_size;
        info!(width, height, elapsed_ms = elapsed.as_millis() as u64, "Cutout ready");
    }

    fn on_processing_failed(&mut self, message: &str) {
        warn!(error = %message, "Processing failed");
        self.error = Some(message.to_string());
    }

    fn set_status(&mut self, text: &str) {
        self.spinner.set_message(text.to_string());
    }

    fn set_process_enabled(&mut self, _enabled: bool) {}

    fn set_save_enabled(&mut self, _enabled: bool) {}

    fn set_busy(&mut self, busy: bool) {
        if busy {
            self.spinner.enable_steady_tick(Duration::from_millis(100));
        } else {
            self.spinner.finish_and_clear();
        }
    }
}
