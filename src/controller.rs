//! Application controller
//!
//! Owns everything the GUI shows and drives it through [`StudioView`]. All
//! methods run on the controlling thread; long work goes to the
//! [`WorkerDispatcher`] and comes back as [`Completion`]s that the event loop
//! feeds into [`AppController::handle_completion`] (or [`AppController::pump`]).
//!
//! ```text
//! Idle -> LoadingEngine -> Ready -> Processing -> Succeeded | Failed -> Ready
//! ```

use crate::{
    config::{PreloadPolicy, StudioConfig},
    dispatcher::{Completion, Outcome, RequestId, TaskKind, WorkerDispatcher},
    error::{Failure, Result, StudioError},
    inference::SegmentationEngine,
    job::{ProcessedImage, ProcessingJob},
    models::ModelId,
    session_cache::SessionCache,
    view::{Pane, Preview, StudioView, ViewModel},
};
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File extensions accepted by [`AppController::load_image`]
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "bgremove-worker";

/// Phase of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationState {
    /// Constructed, engine not started
    Idle,
    /// Startup preload running
    LoadingEngine,
    /// Waiting for the user
    Ready,
    /// One inference job in flight
    Processing,
    /// Last job succeeded (transient)
    Succeeded,
    /// Last job failed (transient)
    Failed,
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LoadingEngine => "loading-engine",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State machine coordinating the view, the session cache and the worker
pub struct AppController<E: SegmentationEngine, V: StudioView> {
    config: StudioConfig,
    cache: Arc<SessionCache<E>>,
    dispatcher: WorkerDispatcher,
    view: V,
    view_model: ViewModel,
    state: ApplicationState,
    selected_model: ModelId,
    edge_refinement: bool,
    original: Option<Arc<DynamicImage>>,
    processed: Option<ProcessedImage>,
    /// Latest outstanding request per category; anything else is stale
    pending: HashMap<TaskKind, RequestId>,
}

impl<E: SegmentationEngine, V: StudioView> AppController<E, V> {
    /// Create a controller with its own session cache
    ///
    /// The view is expected to start with processing and saving disabled.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Worker thread could not be spawned
    pub fn new(engine: Arc<E>, config: StudioConfig, view: V) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(SessionCache::new(engine, config.session_settings()));
        Self::with_cache(cache, config, view)
    }

    /// Create a controller around an existing session cache
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Worker thread could not be spawned
    pub fn with_cache(cache: Arc<SessionCache<E>>, config: StudioConfig, view: V) -> Result<Self> {
        config.validate()?;
        let dispatcher = WorkerDispatcher::new(WORKER_THREAD_NAME)?;
        Ok(Self {
            selected_model: config.default_model,
            edge_refinement: config.edge_refinement,
            config,
            cache,
            dispatcher,
            view,
            view_model: ViewModel::default(),
            state: ApplicationState::Idle,
            original: None,
            processed: None,
            pending: HashMap::new(),
        })
    }

    /// Begin the engine preload
    ///
    /// Call once the first frame is on screen.
    ///
    /// # Errors
    /// - Already started
    /// - Worker unavailable
    pub fn start(&mut self) -> Result<()> {
        if self.state != ApplicationState::Idle {
            return Err(StudioError::invalid_state(format!(
                "engine already started (state: {})",
                self.state
            )));
        }

        self.transition(ApplicationState::LoadingEngine);
        self.set_status("Initializing engine (first start can take a few seconds)...");

        let cache = Arc::clone(&self.cache);
        let model = self.selected_model;
        let id = self.dispatcher.dispatch(TaskKind::Preload, move || {
            cache.engine().preload().map_err(|e| match e {
                StudioError::EngineInit(_) => e,
                other => StudioError::engine_init(other.detail()),
            })?;
            cache.get_or_create(model)?;
            Ok(Outcome::EngineReady(model))
        })?;
        self.pending.insert(TaskKind::Preload, id);
        info!(request = %id, model = %model, "Engine preload dispatched");
        Ok(())
    }

    /// Select the model used by subsequent jobs, loading it in the background
    ///
    /// # Errors
    /// - Worker unavailable
    pub fn select_model(&mut self, model: ModelId) -> Result<()> {
        if model == self.selected_model {
            return Ok(());
        }

        self.selected_model = model;
        self.set_status(&format!("Switching to {model}..."));

        let cache = Arc::clone(&self.cache);
        let id = self.dispatcher.dispatch(TaskKind::ModelLoad, move || {
            cache.get_or_create(model)?;
            Ok(Outcome::ModelLoaded(model))
        })?;
        if let Some(superseded) = self.pending.insert(TaskKind::ModelLoad, id) {
            debug!(superseded = %superseded, request = %id, "Model load superseded");
        }
        info!(request = %id, model = %model, "Model switch dispatched");
        Ok(())
    }

    /// Select a model by its picker label; unknown labels pick the default model
    ///
    /// # Errors
    /// - Worker unavailable
    pub fn select_model_label(&mut self, label: &str) -> Result<()> {
        self.select_model(ModelId::from_label(label))
    }

    pub fn set_edge_refinement(&mut self, enabled: bool) {
        self.edge_refinement = enabled;
    }

    /// Load an image file as the new source
    ///
    /// # Errors
    /// - `InvalidState` while a job is running
    /// - `Input` for unsupported extensions or undecodable files
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_not_processing()?;
        let path = path.as_ref();

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StudioError::input(format!(
                "Unsupported file type '{}'. Supported: {}",
                path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        let image = image::open(path).map_err(|e| StudioError::image_load_error(path, &e))?;
        info!(path = %path.display(), width = image.width(), height = image.height(), "Image loaded");
        self.load_image_data(image)
    }

    /// Use an already decoded image as the new source
    ///
    /// Clears any previous result and disables saving.
    ///
    /// # Errors
    /// - `InvalidState` while a job is running
    pub fn load_image_data(&mut self, image: DynamicImage) -> Result<()> {
        self.ensure_not_processing()?;

        let preview = Preview::fit(&image.to_rgba8(), self.config.preview_size);
        self.original = Some(Arc::new(image));
        self.processed = None;

        self.replace_preview(Pane::Original, Some(preview));
        self.replace_preview(Pane::Result, None);
        self.set_save_enabled(false);
        self.sync_trigger();
        self.set_status("Waiting for processing...");
        Ok(())
    }

    /// Start background removal on the loaded image
    ///
    /// # Errors
    /// - `InvalidState` when not `Ready` or a job is already running
    /// - `Input` when no image is loaded
    /// - Worker unavailable
    pub fn process(&mut self) -> Result<()> {
        match self.state {
            ApplicationState::Ready => {},
            ApplicationState::Processing => {
                return Err(StudioError::invalid_state("a job is already running"));
            },
            other => {
                return Err(StudioError::invalid_state(format!(
                    "engine is not ready (state: {other})"
                )));
            },
        }
        let image = self
            .original
            .clone()
            .ok_or_else(|| StudioError::input("No image loaded"))?;

        let job = ProcessingJob {
            image,
            model: self.selected_model,
            matting: self.config.matting_options(self.edge_refinement),
            preview_size: self.config.preview_size,
        };

        self.transition(ApplicationState::Processing);
        self.set_process_enabled(false);
        self.set_busy(true);
        self.set_status("Processing...");
        self.view.on_processing_started();

        let cache = Arc::clone(&self.cache);
        let model = job.model;
        match self
            .dispatcher
            .dispatch(TaskKind::Inference, move || job.run(&cache).map(Outcome::Processed))
        {
            Ok(id) => {
                self.processed = None;
                self.replace_preview(Pane::Result, None);
                self.set_save_enabled(false);
                self.pending.insert(TaskKind::Inference, id);
                info!(request = %id, model = %model, "Inference dispatched");
                Ok(())
            },
            Err(e) => {
                self.set_busy(false);
                self.transition(ApplicationState::Ready);
                self.sync_trigger();
                self.set_status("Error");
                Err(e)
            },
        }
    }

    /// Apply a completion from the worker
    ///
    /// # Returns
    /// `false` when the completion was stale and ignored
    pub fn handle_completion(&mut self, completion: Completion) -> bool {
        let Completion { id, kind, result } = completion;

        if self.pending.get(&kind) != Some(&id) {
            debug!(request = %id, kind = %kind, "Ignoring stale completion");
            return false;
        }
        self.pending.remove(&kind);

        match (kind, result) {
            (_, Ok(Outcome::EngineReady(model))) => self.finish_preload(Ok(model)),
            (_, Ok(Outcome::ModelLoaded(model))) => self.finish_model_load(Ok(model)),
            (_, Ok(Outcome::Processed(processed))) => self.finish_processing(Ok(processed)),
            (TaskKind::Preload, Err(failure)) => self.finish_preload(Err(failure)),
            (TaskKind::ModelLoad, Err(failure)) => self.finish_model_load(Err(failure)),
            (TaskKind::Inference, Err(failure)) => self.finish_processing(Err(failure)),
        }
        true
    }

    /// Handle every completion that is already available
    ///
    /// # Returns
    /// Number of completions consumed, stale ones included
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(completion) = self.dispatcher.try_next() {
            self.handle_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Block until one completion arrives and handle it
    ///
    /// For headless front ends only; a GUI must use [`Self::pump`] or the
    /// async receiver from [`Self::completions`].
    ///
    /// # Returns
    /// `false` when the worker has stopped
    pub fn wait_for_completion(&mut self) -> bool {
        match self.dispatcher.wait_next() {
            Some(completion) => {
                self.handle_completion(completion);
                true
            },
            None => false,
        }
    }

    /// Completion stream for event loops that await asynchronously
    pub fn completions(&self) -> async_channel::Receiver<Completion> {
        self.dispatcher.completions()
    }

    /// Save the processed image as PNG
    ///
    /// A path without extension gets `.png` appended.
    ///
    /// # Errors
    /// - `Input` when there is no result
    /// - Encoding or write failures
    pub fn save_result<P: AsRef<Path>>(&mut self, path: P) -> Result<PathBuf> {
        let processed = self
            .processed
            .as_ref()
            .ok_or_else(|| StudioError::input("No processed image to save"))?;

        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension("png");
        }
        processed.image.save_with_format(&path, ImageFormat::Png)?;

        info!(path = %path.display(), "Result saved");
        self.set_status(&format!("Saved to {}", path.display()));
        Ok(path)
    }

    /// Stop the worker after its current task
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
    }

    pub fn state(&self) -> ApplicationState {
        self.state
    }

    pub fn selected_model(&self) -> ModelId {
        self.selected_model
    }

    pub fn edge_refinement(&self) -> bool {
        self.edge_refinement
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SessionCache<E>> {
        &self.cache
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn view_model(&self) -> &ViewModel {
        &self.view_model
    }

    pub fn original(&self) -> Option<&Arc<DynamicImage>> {
        self.original.as_ref()
    }

    pub fn processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }

    /// Whether a task of this category is outstanding
    pub fn is_pending(&self, kind: TaskKind) -> bool {
        self.pending.contains_key(&kind)
    }

    fn finish_preload(&mut self, result: std::result::Result<ModelId, Failure>) {
        match result {
            Ok(model) => {
                info!(model = %model, "Engine ready");
                self.set_status(&format!("Engine ready, model {model} loaded"));
            },
            Err(failure) => {
                warn!(error = %failure, policy = ?self.config.preload_policy, "Engine preload failed");
                match self.config.preload_policy {
                    PreloadPolicy::Tolerate => {
                        self.set_status("Engine ready (model loads on first use)");
                    },
                    PreloadPolicy::Report => {
                        self.view.on_engine_degraded(&failure);
                        self.set_status(&format!("Engine degraded: {}", failure.message));
                    },
                }
            },
        }

        if self.state == ApplicationState::LoadingEngine {
            self.transition(ApplicationState::Ready);
        }
        self.view.on_engine_ready();
        self.sync_trigger();
    }

    fn finish_model_load(&mut self, result: std::result::Result<ModelId, Failure>) {
        match result {
            Ok(model) => {
                info!(model = %model, "Model switched");
                self.view.on_model_switched(model);
                if self.state != ApplicationState::Processing {
                    self.set_status(&format!("Model {model} ready"));
                }
            },
            Err(failure) => {
                warn!(error = %failure, model = %self.selected_model, "Model load failed");
                if self.state != ApplicationState::Processing {
                    self.set_status("Model load failed: check the model files");
                }
            },
        }
    }

    fn finish_processing(&mut self, result: std::result::Result<ProcessedImage, Failure>) {
        match result {
            Ok(processed) => {
                self.transition(ApplicationState::Succeeded);
                let elapsed = processed.elapsed;
                self.replace_preview(Pane::Result, Some(processed.preview.clone()));
                self.view.on_processing_succeeded(&processed.preview, elapsed);
                self.set_status(&format!("Done in {:.2}s", elapsed.as_secs_f64()));
                self.processed = Some(processed);
                self.set_save_enabled(true);
            },
            Err(failure) => {
                self.transition(ApplicationState::Failed);
                warn!(error = %failure, "Processing failed");
                self.view.on_processing_failed(&failure.message);
                self.set_status("Error");
            },
        }

        self.set_busy(false);
        self.transition(ApplicationState::Ready);
        self.sync_trigger();
    }

    fn ensure_not_processing(&self) -> Result<()> {
        if self.state == ApplicationState::Processing {
            return Err(StudioError::invalid_state(
                "cannot change the image while a job is running",
            ));
        }
        Ok(())
    }

    fn can_trigger(&self) -> bool {
        self.state == ApplicationState::Ready
            && self.original.is_some()
            && !self.pending.contains_key(&TaskKind::Inference)
    }

    fn transition(&mut self, to: ApplicationState) {
        let from = self.state;
        if from != to {
            debug!(from = %from, to = %to, "State transition");
            self.state = to;
            self.view.on_state_changed(from, to);
        }
    }

    fn sync_trigger(&mut self) {
        let enabled = self.can_trigger();
        self.set_process_enabled(enabled);
    }

    fn set_status(&mut self, text: &str) {
        self.view_model.status = text.to_string();
        self.view.set_status(text);
    }

    fn set_process_enabled(&mut self, enabled: bool) {
        if self.view_model.process_enabled != enabled {
            self.view_model.process_enabled = enabled;
            self.view.set_process_enabled(enabled);
        }
    }

    fn set_save_enabled(&mut self, enabled: bool) {
        if self.view_model.save_enabled != enabled {
            self.view_model.save_enabled = enabled;
            self.view.set_save_enabled(enabled);
        }
    }

    fn set_busy(&mut self, busy: bool) {
        if self.view_model.busy != busy {
            self.view_model.busy = busy;
            self.view.set_busy(busy);
        }
    }

    fn replace_preview(&mut self, pane: Pane, preview: Option<Preview>) {
        let had_preview = self.view_model.preview(pane).is_some();
        if !had_preview && preview.is_none() {
            return;
        }
        self.view_model.replace_preview(pane, preview);
        self.view.show_preview(pane, self.view_model.preview(pane));
    }
}

impl<E: SegmentationEngine, V: StudioView> std::fmt::Debug for AppController<E, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppController")
            .field("state", &self.state)
            .field("selected_model", &self.selected_model)
            .field("edge_refinement", &self.edge_refinement)
            .field("pending", &self.pending)
            .field("cache_stats", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockEngine;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingView {
        events: Vec<String>,
        process_toggles: Vec<bool>,
        save_toggles: Vec<bool>,
        errors: Vec<String>,
        degraded: Vec<Failure>,
        transitions: Vec<(ApplicationState, ApplicationState)>,
    }

    impl StudioView for RecordingView {
        fn on_engine_ready(&mut self) {
            self.events.push("engine_ready".to_string());
        }

        fn on_engine_degraded(&mut self, failure: &Failure) {
            self.degraded.push(failure.clone());
        }

        fn on_model_switched(&mut self, model: ModelId) {
            self.events.push(format!("model_switched:{model}"));
        }

        fn on_processing_started(&mut self) {
            self.events.push("processing_started".to_string());
        }

        fn on_processing_succeeded(&mut self, _result: &Preview, _elapsed: Duration) {
            self.events.push("processing_succeeded".to_string());
        }

        fn on_processing_failed(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }

        fn set_status(&mut self, _text: &str) {}

        fn set_process_enabled(&mut self, enabled: bool) {
            self.process_toggles.push(enabled);
        }

        fn set_save_enabled(&mut self, enabled: bool) {
            self.save_toggles.push(enabled);
        }

        fn on_state_changed(&mut self, from: ApplicationState, to: ApplicationState) {
            self.transitions.push((from, to));
        }
    }

    fn controller(engine: MockEngine) -> AppController<MockEngine, RecordingView> {
        AppController::new(
            Arc::new(engine),
            StudioConfig::default(),
            RecordingView::default(),
        )
        .unwrap()
    }

    fn started(engine: MockEngine) -> AppController<MockEngine, RecordingView> {
        let mut ctrl = controller(engine);
        ctrl.start().unwrap();
        assert!(ctrl.wait_for_completion());
        assert_eq!(ctrl.state(), ApplicationState::Ready);
        ctrl
    }

    #[test]
    fn test_start_preloads_default_model() {
        let ctrl = started(MockEngine::new());

        assert_eq!(ctrl.cache().cached_models(), vec![ModelId::U2Net]);
        assert_eq!(ctrl.view().events, vec!["engine_ready"]);
        assert_eq!(
            ctrl.view().transitions,
            vec![
                (ApplicationState::Idle, ApplicationState::LoadingEngine),
                (ApplicationState::LoadingEngine, ApplicationState::Ready),
            ]
        );
        // No image yet, trigger stays disabled
        assert!(ctrl.view().process_toggles.is_empty());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut ctrl = started(MockEngine::new());
        assert!(matches!(ctrl.start(), Err(StudioError::InvalidState(_))));
    }

    #[test]
    fn test_tolerated_preload_failure_still_ready() {
        let ctrl = started(MockEngine::new().with_preload_failure("runtime missing"));

        assert_eq!(ctrl.view().events, vec!["engine_ready"]);
        assert!(ctrl.view().degraded.is_empty());
        assert!(ctrl.cache().is_empty());
    }

    #[test]
    fn test_reported_preload_failure_notifies_view() {
        let config = StudioConfig::builder()
            .preload_policy(PreloadPolicy::Report)
            .build()
            .unwrap();
        let mut ctrl = AppController::new(
            Arc::new(MockEngine::new().with_preload_failure("runtime missing")),
            config,
            RecordingView::default(),
        )
        .unwrap();
        ctrl.start().unwrap();
        assert!(ctrl.wait_for_completion());

        assert_eq!(ctrl.state(), ApplicationState::Ready);
        assert_eq!(ctrl.view().degraded.len(), 1);
        assert_eq!(ctrl.view().degraded[0].message, "runtime missing");
    }

    #[test]
    fn test_process_before_ready_is_rejected() {
        let mut ctrl = controller(MockEngine::new());
        ctrl.load_image_data(DynamicImage::new_rgb8(8, 8)).unwrap();
        assert!(matches!(ctrl.process(), Err(StudioError::InvalidState(_))));
    }

    #[test]
    fn test_process_without_image_is_rejected() {
        let mut ctrl = started(MockEngine::new());
        assert!(matches!(ctrl.process(), Err(StudioError::Input(_))));
        assert_eq!(ctrl.state(), ApplicationState::Ready);
    }

    #[test]
    fn test_successful_job_reenables_trigger_once() {
        let mut ctrl = started(MockEngine::new());
        ctrl.load_image_data(DynamicImage::new_rgb8(64, 32)).unwrap();
        assert_eq!(ctrl.view().process_toggles, vec![true]);

        ctrl.process().unwrap();
        assert_eq!(ctrl.state(), ApplicationState::Processing);
        assert_eq!(ctrl.view().process_toggles, vec![true, false]);
        assert!(matches!(ctrl.process(), Err(StudioError::InvalidState(_))));

        assert!(ctrl.wait_for_completion());
        assert_eq!(ctrl.state(), ApplicationState::Ready);
        assert_eq!(ctrl.view().process_toggles, vec![true, false, true]);
        assert_eq!(ctrl.view().save_toggles, vec![true]);
        assert!(ctrl.processed().is_some());
        assert!(ctrl.view_model().preview(Pane::Result).is_some());
    }

    #[test]
    fn test_panicking_engine_fails_the_job() {
        let mut ctrl = started(MockEngine::new().with_inference_panic());
        ctrl.load_image_data(DynamicImage::new_rgb8(16, 16)).unwrap();

        ctrl.process().unwrap();
        assert!(ctrl.wait_for_completion());

        assert_eq!(ctrl.view().errors, vec!["mock engine exploded"]);
        assert_eq!(ctrl.state(), ApplicationState::Ready);
        assert!(ctrl.view_model().process_enabled);
    }

    #[test]
    fn test_load_image_while_processing_is_rejected() {
        let mut ctrl = started(MockEngine::new().with_inference_delay(Duration::from_millis(50)));
        ctrl.load_image_data(DynamicImage::new_rgb8(16, 16)).unwrap();
        ctrl.process().unwrap();

        let result = ctrl.load_image_data(DynamicImage::new_rgb8(16, 16));
        assert!(matches!(result, Err(StudioError::InvalidState(_))));

        assert!(ctrl.wait_for_completion());
    }

    #[test]
    fn test_stale_model_load_is_ignored() {
        let mut ctrl = started(MockEngine::new());

        ctrl.select_model(ModelId::IsNetAnime).unwrap();
        ctrl.select_model(ModelId::IsNetGeneralUse).unwrap();

        // First load is superseded, second one is reported
        let superseded = ctrl.dispatcher.wait_next().unwrap();
        assert!(!ctrl.handle_completion(superseded));
        let latest = ctrl.dispatcher.wait_next().unwrap();
        assert!(ctrl.handle_completion(latest));

        assert_eq!(
            ctrl.view().events,
            vec!["engine_ready", "model_switched:isnet-general-use"]
        );
        assert_eq!(ctrl.cache().cached_models(), vec![ModelId::IsNetGeneralUse]);
    }

    #[test]
    fn test_selecting_current_model_is_a_no_op() {
        let mut ctrl = started(MockEngine::new());
        ctrl.select_model(ModelId::U2Net).unwrap();
        assert!(!ctrl.is_pending(TaskKind::ModelLoad));
    }

    #[test]
    fn test_select_model_label_falls_back_to_default() {
        let mut ctrl = started(MockEngine::new());
        ctrl.select_model_label("isnet-anime (anime)").unwrap();
        assert_eq!(ctrl.selected_model(), ModelId::IsNetAnime);

        ctrl.select_model_label("no such label").unwrap();
        assert_eq!(ctrl.selected_model(), ModelId::U2Net);
    }

    #[test]
    fn test_unsupported_extension_is_input_error() {
        let mut ctrl = started(MockEngine::new());
        let result = ctrl.load_image("photo.gif");
        assert!(matches!(result, Err(StudioError::Input(_))));
        assert!(ctrl.original().is_none());
    }

    #[test]
    fn test_unreadable_file_is_input_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let mut ctrl = started(MockEngine::new());
        assert!(matches!(ctrl.load_image(&path), Err(StudioError::Input(_))));
    }

    #[test]
    fn test_save_without_result_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut ctrl = started(MockEngine::new());
        let result = ctrl.save_result(temp.path().join("out.png"));
        assert!(matches!(result, Err(StudioError::Input(_))));
    }

    #[test]
    fn test_save_appends_png_extension() {
        let temp = TempDir::new().unwrap();
        let mut ctrl = started(MockEngine::new());
        ctrl.load_image_data(DynamicImage::new_rgb8(8, 8)).unwrap();
        ctrl.process().unwrap();
        assert!(ctrl.wait_for_completion());

        let saved = ctrl.save_result(temp.path().join("cutout")).unwrap();
        assert_eq!(saved, temp.path().join("cutout.png"));

        let reloaded = image::open(&saved).unwrap().to_rgba8();
        assert_eq!(reloaded.dimensions(), (8, 8));
        assert_eq!(reloaded.get_pixel(7, 0)[3], 0);
        assert_eq!(reloaded.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_edge_refinement_reaches_engine() {
        let mut ctrl = started(MockEngine::new());
        ctrl.set_edge_refinement(true);
        ctrl.load_image_data(DynamicImage::new_rgb8(8, 8)).unwrap();
        ctrl.process().unwrap();
        assert!(ctrl.wait_for_completion());

        let history = ctrl.cache().engine().get_call_history();
        assert_eq!(history.first().map(String::as_str), Some("preload"));
        assert_eq!(
            history.last().map(String::as_str),
            Some("remove_background:u2net:true")
        );
    }

    #[test]
    fn test_failed_dispatch_keeps_previous_result() {
        let mut ctrl = started(MockEngine::new());
        ctrl.load_image_data(DynamicImage::new_rgb8(8, 8)).unwrap();
        ctrl.process().unwrap();
        assert!(ctrl.wait_for_completion());
        ctrl.shutdown();

        assert!(matches!(ctrl.process(), Err(StudioError::Internal(_))));
        assert_eq!(ctrl.state(), ApplicationState::Ready);
        assert!(ctrl.processed().is_some());
        assert!(ctrl.view_model().preview(Pane::Result).is_some());
        assert!(ctrl.view_model().save_enabled);
        assert_eq!(ctrl.view().save_toggles, vec![true]);
    }

    #[test]
    fn test_debug_reports_cache_stats() {
        let mut ctrl =
            controller(MockEngine::new().with_construction_delay(Duration::from_millis(50)));
        ctrl.start().unwrap();

        let debug = format!("{ctrl:?}");
        assert!(debug.contains("cache_stats"));
        assert!(!debug.contains("cached_models"));

        assert!(ctrl.wait_for_completion());
    }
}
