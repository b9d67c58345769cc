#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal Studio
//!
//! Core of a desktop background removal tool: a single-slot session cache, a
//! single-worker task dispatcher and the application controller that drives
//! the window through the [`StudioView`] callbacks.
//!
//! ## Features
//!
//! - **Session caching**: at most one loaded model resident, constructed once
//!   even under concurrent requests
//! - **Responsive front ends**: preload, model switches and inference run on a
//!   background worker; results come back as [`Completion`]s
//! - **Three models**: `u2net`, `isnet-general-use` and `isnet-anime`
//! - **Edge refinement**: optional alpha matting of the mask border
//! - **Hardware acceleration**: CUDA, `CoreML` and CPU execution providers via
//!   ONNX Runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_studio::{AppController, OnnxEngine, StudioConfig, StudioView};
//! # use bgremove_studio::{ModelId, Preview};
//! # use std::time::Duration;
//! # struct Window;
//! # impl StudioView for Window {
//! #     fn on_engine_ready(&mut self) {}
//! #     fn on_model_switched(&mut self, _: ModelId) {}
//! #     fn on_processing_started(&mut self) {}
//! #     fn on_processing_succeeded(&mut self, _: &Preview, _: Duration) {}
//! #     fn on_processing_failed(&mut self, _: &str) {}
//! #     fn set_status(&mut self, _: &str) {}
//! #     fn set_process_enabled(&mut self, _: bool) {}
//! #     fn set_save_enabled(&mut self, _: bool) {}
//! # }
//! use std::sync::Arc;
//!
//! # fn example() -> bgremove_studio::Result<()> {
//! let config = StudioConfig::load_or_default();
//! let mut controller = AppController::new(Arc::new(OnnxEngine::new()), config, Window)?;
//! controller.start()?;
//! controller.load_image("photo.jpg")?;
//!
//! // In the GUI event loop, after every tick:
//! controller.pump();
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine
//! - `cli` (default): headless command-line front end
//! - `webp-support` (default): WebP input support
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod inference;
pub mod job;
pub mod models;
pub mod session_cache;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;
pub mod view;

// Public API exports
#[cfg(feature = "onnx")]
pub use backends::{OnnxEngine, OnnxSession};
pub use config::{ExecutionProvider, MattingConfig, PreloadPolicy, StudioConfig, StudioConfigBuilder};
pub use controller::{AppController, ApplicationState, SUPPORTED_EXTENSIONS};
pub use dispatcher::{Completion, Outcome, RequestId, TaskKind, WorkerDispatcher};
pub use error::{Failure, FailureKind, Result, StudioError};
pub use inference::{MattingOptions, SegmentationEngine, SessionSettings};
pub use job::{ProcessedImage, ProcessingJob};
pub use models::{ModelId, ModelProfile};
pub use session_cache::{SessionCache, SessionCacheStats};
pub use view::{Pane, Preview, StudioView, ViewModel};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
