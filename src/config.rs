//! Configuration types for the studio core

use crate::error::{Result, StudioError};
use crate::inference::{MattingOptions, SessionSettings};
use crate::models::ModelId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the weights directory looked up next to the executable
pub const MODEL_DIR_NAME: &str = "models";

/// Execution provider options passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Let the engine pick its best available provider
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(StudioError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// What to do when the startup preload fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadPolicy {
    /// Log a warning and mark the engine ready; the error resurfaces on first use
    Tolerate,
    /// Mark the engine ready but also notify the view about the failure
    Report,
}

impl Default for PreloadPolicy {
    fn default() -> Self {
        Self::Tolerate
    }
}

/// Alpha matting thresholds used when edge refinement is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MattingConfig {
    /// Mask values above this are certain foreground
    pub foreground_threshold: u8,
    /// Mask values below this are certain background
    pub background_threshold: u8,
    /// Erosion radius applied to the certain regions of the trimap
    pub erode_size: u32,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

/// Top-level configuration for the studio core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Model warmed during startup preload and selected initially
    pub default_model: ModelId,

    /// Directory holding `<model>.onnx` weight files (None = discover)
    pub model_dir: Option<PathBuf>,

    /// Execution providers in priority order
    pub execution_providers: Vec<ExecutionProvider>,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Edge refinement enabled initially
    pub edge_refinement: bool,

    /// Thresholds used by edge refinement
    pub matting: MattingConfig,

    /// Startup preload failure handling
    pub preload_policy: PreloadPolicy,

    /// Bounding box (width, height) of the pane previews
    pub preview_size: (u32, u32),
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            default_model: ModelId::default(),
            model_dir: None,
            execution_providers: vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu],
            intra_threads: 0,
            edge_refinement: false,
            matting: MattingConfig::default(),
            preload_policy: PreloadPolicy::default(),
            preview_size: (400, 500),
        }
    }
}

impl StudioConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> StudioConfigBuilder {
        StudioConfigBuilder::new()
    }

    /// Default config file location: `<config dir>/bgremove-studio/config.json`
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bgremove-studio")
            .join("config.json")
    }

    /// Load and validate a configuration file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or field values
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| StudioError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when absent or invalid
    #[must_use]
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            },
        }
    }

    /// Persist to the given path, creating parent directories
    ///
    /// # Errors
    /// - Directory creation or write failures
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StudioError::file_io_error("create config directory", parent, &e))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).map_err(|e| StudioError::file_io_error("write config file", path, &e))
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - Background threshold not below foreground threshold
    /// - Empty provider list
    /// - Preview box too small
    pub fn validate(&self) -> Result<()> {
        if self.matting.background_threshold >= self.matting.foreground_threshold {
            return Err(StudioError::invalid_config(format!(
                "Background threshold ({}) must be below foreground threshold ({})",
                self.matting.background_threshold, self.matting.foreground_threshold
            )));
        }
        if self.execution_providers.is_empty() {
            return Err(StudioError::invalid_config(
                "At least one execution provider is required",
            ));
        }
        if self.preview_size.0 < 50 || self.preview_size.1 < 50 {
            return Err(StudioError::invalid_config(format!(
                "Preview size {}x{} is too small (minimum 50x50)",
                self.preview_size.0, self.preview_size.1
            )));
        }
        Ok(())
    }

    /// Resolve the weights directory
    ///
    /// An explicitly configured directory always wins. Otherwise a `models`
    /// directory next to the running executable is used when it exists.
    #[must_use]
    pub fn resolve_model_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.model_dir {
            return Some(dir.clone());
        }
        let exe = std::env::current_exe().ok()?;
        discover_model_dir(exe.parent()?)
    }

    /// Session construction parameters handed to the cache
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            model_dir: self.resolve_model_dir(),
            execution_providers: self.execution_providers.clone(),
            intra_threads: self.intra_threads,
        }
    }

    /// Matting options for a job with the given refinement flag
    #[must_use]
    pub fn matting_options(&self, edge_refinement: bool) -> MattingOptions {
        MattingOptions {
            enabled: edge_refinement,
            foreground_threshold: self.matting.foreground_threshold,
            background_threshold: self.matting.background_threshold,
            erode_size: self.matting.erode_size,
        }
    }
}

/// Look for a weights directory under `base`
#[must_use]
pub fn discover_model_dir(base: &Path) -> Option<PathBuf> {
    let candidate = base.join(MODEL_DIR_NAME);
    candidate.is_dir().then_some(candidate)
}

/// Builder for `StudioConfig`
pub struct StudioConfigBuilder {
    config: StudioConfig,
}

impl StudioConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StudioConfig::default(),
        }
    }

    /// Start from an existing configuration
    #[must_use]
    pub fn from_config(config: StudioConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn default_model(mut self, model: ModelId) -> Self {
        self.config.default_model = model;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn execution_providers(mut self, providers: Vec<ExecutionProvider>) -> Self {
        self.config.execution_providers = providers;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn edge_refinement(mut self, enabled: bool) -> Self {
        self.config.edge_refinement = enabled;
        self
    }

    #[must_use]
    pub fn matting(mut self, matting: MattingConfig) -> Self {
        self.config.matting = matting;
        self
    }

    #[must_use]
    pub fn preload_policy(mut self, policy: PreloadPolicy) -> Self {
        self.config.preload_policy = policy;
        self
    }

    #[must_use]
    pub fn preview_size(mut self, width: u32, height: u32) -> Self {
        self.config.preview_size = (width, height);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any check in [`StudioConfig::validate`] failing
    pub fn build(self) -> Result<StudioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for StudioConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
