//! View contract between the controller and the GUI toolkit
//!
//! The toolkit owns widgets; the controller only talks to it through
//! [`StudioView`], always on the controlling thread. [`ViewModel`] mirrors what
//! the controller last told the view so redundant widget updates are skipped.

use crate::{controller::ApplicationState, error::Failure, models::ModelId};
use image::{imageops, imageops::FilterType, RgbaImage};
use std::sync::Arc;
use std::time::Duration;

/// Image pane of the main window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pane {
    Original,
    Result,
}

/// Downscaled image ready to be displayed in a pane
#[derive(Debug, Clone)]
pub struct Preview {
    pub image: Arc<RgbaImage>,
    /// Dimensions of the image the preview was made from
    pub source_size: (u32, u32),
}

impl Preview {
    /// Shrink `image` to fit inside `bounds`, preserving aspect ratio
    ///
    /// Images that already fit are not enlarged.
    #[must_use]
    pub fn fit(image: &RgbaImage, bounds: (u32, u32)) -> Self {
        let source_size = image.dimensions();
        let (width, height) = fit_dimensions(source_size, bounds);
        let scaled = if (width, height) == source_size {
            image.clone()
        } else {
            imageops::resize(image, width, height, FilterType::Lanczos3)
        };
        Self {
            image: Arc::new(scaled),
            source_size,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Largest size within `bounds` with the aspect ratio of `size`, never upscaled
#[must_use]
pub fn fit_dimensions(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (width, height) = size;
    if width == 0 || height == 0 || (width <= bounds.0 && height <= bounds.1) {
        return size;
    }
    let scale = f64::min(
        f64::from(bounds.0) / f64::from(width),
        f64::from(bounds.1) / f64::from(height),
    );
    let scaled_width = (f64::from(width) * scale).round().max(1.0) as u32;
    let scaled_height = (f64::from(height) * scale).round().max(1.0) as u32;
    (scaled_width.min(bounds.0), scaled_height.min(bounds.1))
}

/// State the controller last pushed to the view
#[derive(Debug, Clone, Default)]
pub struct ViewModel {
    pub status: String,
    pub process_enabled: bool,
    pub save_enabled: bool,
    pub busy: bool,
    original: Option<Preview>,
    result: Option<Preview>,
}

impl ViewModel {
    /// Currently displayed preview of a pane
    #[must_use]
    pub fn preview(&self, pane: Pane) -> Option<&Preview> {
        match pane {
            Pane::Original => self.original.as_ref(),
            Pane::Result => self.result.as_ref(),
        }
    }

    /// Swap the pane's preview, returning the one it replaced
    pub fn replace_preview(&mut self, pane: Pane, preview: Option<Preview>) -> Option<Preview> {
        let slot = match pane {
            Pane::Original => &mut self.original,
            Pane::Result => &mut self.result,
        };
        std::mem::replace(slot, preview)
    }
}

/// Callbacks the GUI layer implements
///
/// Every method runs on the controlling thread.
pub trait StudioView {
    /// Startup preload finished and processing can be triggered
    fn on_engine_ready(&mut self);

    /// Startup preload failed under [`PreloadPolicy::Report`](crate::config::PreloadPolicy::Report)
    fn on_engine_degraded(&mut self, _failure: &Failure) {}

    /// The latest model switch finished loading
    fn on_model_switched(&mut self, model: ModelId);

    fn on_processing_started(&mut self);

    fn on_processing_succeeded(&mut self, result: &Preview, elapsed: Duration);

    /// Show a modal error for a failed job
    fn on_processing_failed(&mut self, message: &str);

    fn set_status(&mut self, text: &str);

    fn set_process_enabled(&mut self, enabled: bool);

    fn set_save_enabled(&mut self, enabled: bool);

    /// Show or hide the indeterminate progress indicator
    fn set_busy(&mut self, _busy: bool) {}

    /// Replace a pane's image; `None` restores its placeholder
    fn show_preview(&mut self, _pane: Pane, _preview: Option<&Preview>) {}

    fn on_state_changed(&mut self, _from: ApplicationState, _to: ApplicationState) {}
}
