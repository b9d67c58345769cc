//! Inference jobs executed on the worker

use crate::{
    error::{Result, StudioError},
    inference::{MattingOptions, SegmentationEngine},
    models::ModelId,
    session_cache::SessionCache,
    view::Preview,
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// One inference request, consumed exactly once by the worker
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub image: Arc<DynamicImage>,
    pub model: ModelId,
    pub matting: MattingOptions,
    /// Bounding box for the result preview
    pub preview_size: (u32, u32),
}

/// Result of a successful job
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Full resolution cutout with transparent background
    pub image: Arc<RgbaImage>,
    /// Downscaled copy for the result pane
    pub preview: Preview,
    pub model: ModelId,
    /// Wall time from job start, including any session construction
    pub elapsed: Duration,
}

impl ProcessingJob {
    /// Fetch the session and run the engine
    ///
    /// # Errors
    /// - `SessionConstruction` when the model cannot be loaded
    /// - `Inference` when the engine fails
    #[instrument(
        skip(self, cache),
        fields(
            model = %self.model,
            edge_refinement = self.matting.enabled,
            dimensions = %format!("{}x{}", self.image.width(), self.image.height())
        )
    )]
    pub fn run<E: SegmentationEngine>(self, cache: &SessionCache<E>) -> Result<ProcessedImage> {
        let start = Instant::now();

        let session = cache.get_or_create(self.model)?;
        let cutout = cache
            .engine()
            .remove_background(&self.image, &session, &self.matting)
            .map_err(|e| match e {
                StudioError::Inference(_) => e,
                other => StudioError::inference(other.detail()),
            })?;

        let preview = Preview::fit(&cutout, self.preview_size);
        let elapsed = start.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "Background removed");

        Ok(ProcessedImage {
            image: Arc::new(cutout),
            preview,
            model: self.model,
            elapsed,
        })
    }
}
