//! Segmentation engine abstraction
//!
//! The engine is an external, possibly slow, possibly failing black box. The
//! session cache and worker only ever talk to it through this trait.

use crate::{config::ExecutionProvider, error::Result, models::ModelId};
use image::{DynamicImage, RgbaImage};
use std::path::PathBuf;

/// Parameters for constructing an inference session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    /// Directory holding `<model>.onnx` weight files
    pub model_dir: Option<PathBuf>,
    /// Execution providers in priority order
    pub execution_providers: Vec<ExecutionProvider>,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
}

impl SessionSettings {
    /// Path of the weight file for `model`, when a directory is known
    #[must_use]
    pub fn weights_path(&self, model: ModelId) -> Option<PathBuf> {
        self.model_dir
            .as_ref()
            .map(|dir| dir.join(model.weights_file()))
    }
}

/// Edge refinement (alpha matting) options for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingOptions {
    pub enabled: bool,
    pub foreground_threshold: u8,
    pub background_threshold: u8,
    pub erode_size: u32,
}

impl Default for MattingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

/// Trait for segmentation engines
pub trait SegmentationEngine: Send + Sync + 'static {
    /// Initialized, reusable handle bound to one model
    type Session: Send + Sync + 'static;

    /// Short engine name for logs
    fn name(&self) -> &str;

    /// Load the engine runtime ahead of first use
    ///
    /// # Errors
    /// - Runtime library missing or incompatible
    fn preload(&self) -> Result<()> {
        Ok(())
    }

    /// Construct a session for `model`
    ///
    /// # Errors
    /// - Weight file missing or unreadable
    /// - Unsupported execution provider or runtime failure
    fn create_session(&self, model: ModelId, settings: &SessionSettings) -> Result<Self::Session>;

    /// Run segmentation and return the image with the background made transparent
    ///
    /// # Errors
    /// - Inference failures inside the engine
    fn remove_background(
        &self,
        image: &DynamicImage,
        session: &Self::Session,
        matting: &MattingOptions,
    ) -> Result<RgbaImage>;
}
