//! ONNX Runtime segmentation engine
//!
//! Loads `<model>.onnx` weight files from the configured model directory and
//! runs them with the execution providers requested in [`SessionSettings`].

use crate::{
    config::ExecutionProvider,
    error::{Result, StudioError},
    inference::{MattingOptions, SegmentationEngine, SessionSettings},
    models::{ModelId, ModelProfile},
    utils::{apply_alpha, image_to_tensor, prediction_to_mask, refine_edges},
};
use image::{DynamicImage, RgbaImage};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProvider as OrtExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Loaded ONNX model
///
/// Running a session needs exclusive access, so the handle is guarded by a
/// mutex. Jobs are serialized by the worker anyway.
#[derive(Debug)]
pub struct OnnxSession {
    model: ModelId,
    profile: ModelProfile,
    session: Mutex<Session>,
}

impl OnnxSession {
    pub fn model(&self) -> ModelId {
        self.model
    }
}

/// ONNX Runtime engine
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxEngine;

impl OnnxEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// List execution providers with availability status and descriptions
    pub fn list_providers() -> Vec<(ExecutionProvider, bool, &'static str)> {
        debug!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "Checking execution provider availability"
        );

        vec![
            (
                ExecutionProvider::Cpu,
                true,
                "Always available, uses CPU for inference",
            ),
            (
                ExecutionProvider::Cuda,
                cuda_available(),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)",
            ),
            (
                ExecutionProvider::CoreMl,
                coreml_available(),
                "Apple Silicon GPU acceleration (macOS only)",
            ),
        ]
    }

    /// Translate the configured providers into ort dispatches
    ///
    /// Unavailable accelerators are skipped; CPU is always the implicit fallback.
    fn execution_providers(requested: &[ExecutionProvider]) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        for provider in requested {
            match provider {
                ExecutionProvider::Auto => {
                    if cuda_available() {
                        providers.push(CUDAExecutionProvider::default().build());
                    }
                    if coreml_available() {
                        providers
                            .push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                    }
                },
                ExecutionProvider::Cuda => {
                    if cuda_available() {
                        providers.push(CUDAExecutionProvider::default().build());
                    } else {
                        warn!("CUDA execution provider requested but not available, skipping");
                    }
                },
                ExecutionProvider::CoreMl => {
                    if coreml_available() {
                        providers
                            .push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                    } else {
                        warn!("CoreML execution provider requested but not available, skipping");
                    }
                },
                ExecutionProvider::Cpu => {
                    providers.push(CPUExecutionProvider::default().build());
                },
            }
        }
        providers
    }
}

impl SegmentationEngine for OnnxEngine {
    type Session = OnnxSession;

    fn name(&self) -> &str {
        "onnx"
    }

    fn preload(&self) -> Result<()> {
        match OrtExecutionProvider::is_available(&CPUExecutionProvider::default()) {
            Ok(true) => {
                info!("ONNX Runtime loaded");
                Ok(())
            },
            Ok(false) => Err(StudioError::engine_init(
                "ONNX Runtime has no usable CPU execution provider",
            )),
            Err(e) => Err(StudioError::engine_init(format!(
                "Failed to load ONNX Runtime: {e}"
            ))),
        }
    }

    #[instrument(skip(self, settings), fields(model = %model))]
    fn create_session(&self, model: ModelId, settings: &SessionSettings) -> Result<OnnxSession> {
        let path = settings.weights_path(model).ok_or_else(|| {
            StudioError::session_construction(model, "no model directory configured")
        })?;
        if !path.is_file() {
            return Err(StudioError::session_construction(
                model,
                format!("{} not found", path.display()),
            ));
        }

        let mut builder = Session::builder()
            .map_err(|e| construction_error(model, "Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| construction_error(model, "Failed to set optimization level", e))?;

        let providers = Self::execution_providers(&settings.execution_providers);
        if !providers.is_empty() {
            debug!(count = providers.len(), "Registering execution providers");
            builder = builder
                .with_execution_providers(providers)
                .map_err(|e| construction_error(model, "Failed to set execution providers", e))?;
        }

        if settings.intra_threads > 0 {
            builder = builder
                .with_intra_threads(settings.intra_threads)
                .map_err(|e| construction_error(model, "Failed to set intra threads", e))?;
        }

        let session = builder
            .commit_from_file(&path)
            .map_err(|e| construction_error(model, "Failed to load model", e))?;

        info!(path = %path.display(), "ONNX session created");
        Ok(OnnxSession {
            model,
            profile: model.profile(),
            session: Mutex::new(session),
        })
    }

    #[instrument(skip_all, fields(model = %session.model, edge_refinement = matting.enabled))]
    fn remove_background(
        &self,
        image: &DynamicImage,
        session: &OnnxSession,
        matting: &MattingOptions,
    ) -> Result<RgbaImage> {
        let tensor = image_to_tensor(image, &session.profile)?;
        let input = Value::from_array(tensor)
            .map_err(|e| StudioError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mask = {
            let mut runner = session
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let outputs = runner
                .run(ort::inputs![input])
                .map_err(|e| StudioError::inference(format!("ONNX inference failed: {e}")))?;

            let first_key = outputs
                .keys()
                .next()
                .ok_or_else(|| StudioError::inference("No output tensors found"))?;
            let prediction = outputs
                .get(first_key)
                .ok_or_else(|| StudioError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    StudioError::inference(format!("Failed to extract output tensor: {e}"))
                })?;

            prediction_to_mask(&prediction, (image.width(), image.height()))?
        };

        let mask = if matting.enabled {
            refine_edges(&mask, matting)
        } else {
            mask
        };

        apply_alpha(image, &mask)
    }
}

fn construction_error<E: std::fmt::Display>(model: ModelId, stage: &str, error: E) -> StudioError {
    StudioError::session_construction(model, format!("{stage}: {error}"))
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}
