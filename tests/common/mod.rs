//! Shared stub engine and recording view for integration tests

#![allow(dead_code)]

use bgremove_studio::{
    ApplicationState, Failure, MattingOptions, ModelId, Preview, Result, SegmentationEngine,
    SessionSettings, StudioError, StudioView,
};
use image::{DynamicImage, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Handle tagged with the model and its construction number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubHandle {
    pub model: ModelId,
    pub tag: String,
}

/// Engine stub with configurable latency and failures
#[derive(Debug, Default)]
pub struct StubEngine {
    constructions: AtomicUsize,
    construction_delay: Duration,
    inference_delay: Duration,
    inference_error: Option<String>,
    /// Tags of the handles used for inference, in order
    used_handles: Mutex<Vec<String>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_construction_delay(mut self, delay: Duration) -> Self {
        self.construction_delay = delay;
        self
    }

    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }

    pub fn with_inference_error(mut self, message: &str) -> Self {
        self.inference_error = Some(message.to_string());
        self
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn used_handles(&self) -> Vec<String> {
        self.used_handles.lock().unwrap().clone()
    }
}

impl SegmentationEngine for StubEngine {
    type Session = StubHandle;

    fn name(&self) -> &str {
        "stub"
    }

    fn create_session(&self, model: ModelId, _settings: &SessionSettings) -> Result<StubHandle> {
        let serial = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
        std::thread::sleep(self.construction_delay);
        Ok(StubHandle {
            model,
            tag: format!("{model}#{serial}"),
        })
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        session: &StubHandle,
        _matting: &MattingOptions,
    ) -> Result<RgbaImage> {
        self.used_handles.lock().unwrap().push(session.tag.clone());
        std::thread::sleep(self.inference_delay);

        if let Some(message) = &self.inference_error {
            return Err(StudioError::inference(message.clone()));
        }

        // Fully transparent background
        let mut output = image.to_rgba8();
        for pixel in output.pixels_mut() {
            pixel[3] = 0;
        }
        Ok(output)
    }
}

/// View that records every callback
#[derive(Debug, Default)]
pub struct RecordingView {
    pub ready_count: usize,
    pub degraded: Vec<Failure>,
    pub switched: Vec<ModelId>,
    pub started: usize,
    pub succeeded: Vec<Duration>,
    pub errors: Vec<String>,
    pub statuses: Vec<String>,
    pub process_toggles: Vec<bool>,
    pub save_toggles: Vec<bool>,
    pub busy_toggles: Vec<bool>,
    pub transitions: Vec<(ApplicationState, ApplicationState)>,
}

impl RecordingView {
    pub fn last_status(&self) -> &str {
        self.statuses.last().map_or("", String::as_str)
    }

    /// Times the trigger was switched back on
    pub fn trigger_enables(&self) -> usize {
        self.process_toggles.iter().filter(|&&enabled| enabled).count()
    }
}

impl StudioView for RecordingView {
    fn on_engine_ready(&mut self) {
        self.ready_count += 1;
    }

    fn on_engine_degraded(&mut self, failure: &Failure) {
        self.degraded.push(failure.clone());
    }

    fn on_model_switched(&mut self, model: ModelId) {
        self.switched.push(model);
    }

    fn on_processing_started(&mut self) {
        self.started += 1;
    }

    fn on_processing_succeeded(&mut self, _result: &Preview, elapsed: Duration) {
        self.succeeded.push(elapsed);
    }

    fn on_processing_failed(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn set_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn set_process_enabled(&mut self, enabled: bool) {
        self.process_toggles.push(enabled);
    }

    fn set_save_enabled(&mut self, enabled: bool) {
        self.save_toggles.push(enabled);
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy_toggles.push(busy);
    }

    fn on_state_changed(&mut self, from: ApplicationState, to: ApplicationState) {
        self.transitions.push((from, to));
    }
}

/// Non-blocking pump until `done` holds, as a GUI event loop would
pub fn pump_until<E, V>(
    controller: &mut bgremove_studio::AppController<E, V>,
    done: impl Fn(&bgremove_studio::AppController<E, V>) -> bool,
) where
    E: SegmentationEngine,
    V: StudioView,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !done(controller) {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for the controller"
        );
        controller.pump();
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(image::RgbImage::from_pixel(width, height, image::Rgb([30, 120, 200])))
}
