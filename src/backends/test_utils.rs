//! Test utilities and a mock segmentation engine
//!
//! `MockEngine` implements `SegmentationEngine` without model files or ONNX
//! Runtime so the cache, worker and controller can be tested in isolation.

use crate::{
    error::{Result, StudioError},
    inference::{MattingOptions, SegmentationEngine, SessionSettings},
    models::ModelId,
};
use image::{DynamicImage, RgbaImage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handle returned by [`MockEngine::create_session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSession {
    pub model: ModelId,
    /// Construction order, starting at 1
    pub serial: u64,
}

/// Mock engine for testing
#[derive(Debug, Default)]
pub struct MockEngine {
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    create_calls: AtomicUsize,
    serial: AtomicU64,
    construction_delay: Duration,
    inference_delay: Duration,
    preload_failure: Option<String>,
    inference_failure: Option<String>,
    failing_models: Mutex<HashSet<ModelId>>,
    panic_on_inference: bool,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `create_session`
    #[must_use]
    pub fn with_construction_delay(mut self, delay: Duration) -> Self {
        self.construction_delay = delay;
        self
    }

    /// Sleep this long inside every `remove_background`
    #[must_use]
    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }

    /// Make `preload` fail with the given message
    #[must_use]
    pub fn with_preload_failure<S: Into<String>>(mut self, message: S) -> Self {
        self.preload_failure = Some(message.into());
        self
    }

    /// Make `remove_background` fail with the given message
    #[must_use]
    pub fn with_inference_failure<S: Into<String>>(mut self, message: S) -> Self {
        self.inference_failure = Some(message.into());
        self
    }

    /// Make `remove_background` panic
    #[must_use]
    pub fn with_inference_panic(mut self) -> Self {
        self.panic_on_inference = true;
        self
    }

    /// Toggle construction failures for one model
    pub fn set_construction_failure(&self, model: ModelId, fail: bool) {
        let mut failing = self.failing_models.lock().unwrap();
        if fail {
            failing.insert(model);
        } else {
            failing.remove(&model);
        }
    }

    /// Number of `create_session` calls so far
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call);
        }
    }
}

impl SegmentationEngine for MockEngine {
    type Session = MockSession;

    fn name(&self) -> &str {
        "mock"
    }

    fn preload(&self) -> Result<()> {
        self.record_call("preload".to_string());
        match &self.preload_failure {
            Some(message) => Err(StudioError::engine_init(message.clone())),
            None => Ok(()),
        }
    }

    fn create_session(&self, model: ModelId, _settings: &SessionSettings) -> Result<MockSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.record_call(format!("create_session:{model}"));

        if !self.construction_delay.is_zero() {
            std::thread::sleep(self.construction_delay);
        }

        if self.failing_models.lock().unwrap().contains(&model) {
            return Err(StudioError::session_construction(
                model,
                format!("{} not found", model.weights_file()),
            ));
        }

        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockSession { model, serial })
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        session: &MockSession,
        matting: &MattingOptions,
    ) -> Result<RgbaImage> {
        self.record_call(format!(
            "remove_background:{}:{}",
            session.model, matting.enabled
        ));

        if !self.inference_delay.is_zero() {
            std::thread::sleep(self.inference_delay);
        }

        if self.panic_on_inference {
            panic!("mock engine exploded");
        }

        if let Some(message) = &self.inference_failure {
            return Err(StudioError::inference(message.clone()));
        }

        // Keep the left half, clear the right half
        let mut output = image.to_rgba8();
        let half = output.width() / 2;
        for (x, _, pixel) in output.enumerate_pixels_mut() {
            if x >= half {
                pixel[3] = 0;
            }
        }
        Ok(output)
    }
}
