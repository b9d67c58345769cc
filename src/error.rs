//! Error types for background removal sessions and jobs

use crate::models::ModelId;
use thiserror::Error;

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Error taxonomy for the session cache, worker and controller
#[derive(Error, Debug)]
pub enum StudioError {
    /// Segmentation engine or its runtime failed to load
    #[error("Engine initialization error: {0}")]
    EngineInit(String),

    /// Inference session for a model could not be constructed
    #[error("Failed to load model '{model}': {reason}")]
    SessionConstruction { model: ModelId, reason: String },

    /// The engine raised while processing an image
    #[error("Inference error: {0}")]
    Inference(String),

    /// Unsupported or unreadable input
    #[error("Input error: {0}")]
    Input(String),

    /// Operation not allowed in the current controller state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Config file (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudioError {
    /// Create a new engine initialization error
    pub fn engine_init<S: Into<String>>(msg: S) -> Self {
        Self::EngineInit(msg.into())
    }

    /// Create a new session construction error
    pub fn session_construction<S: Into<String>>(model: ModelId, reason: S) -> Self {
        Self::SessionConstruction {
            model,
            reason: reason.into(),
        }
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new input error
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Self::Input(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create image loading error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_display = path.as_ref().display();
        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Input(format!(
            "Failed to load image '{}' (format: {}): {}",
            path_display, extension, error
        ))
    }

    /// Bare description of the failure, without the category prefix
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::EngineInit(msg)
            | Self::Inference(msg)
            | Self::Input(msg)
            | Self::InvalidState(msg)
            | Self::InvalidConfig(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::SessionConstruction { reason, .. } => reason.clone(),
            Self::Io(e) => e.to_string(),
            Self::Image(e) => e.to_string(),
            Self::Serialization(e) => e.to_string(),
        }
    }

    /// Category used when this error crosses the worker boundary
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::EngineInit(_) => FailureKind::EngineInit,
            Self::SessionConstruction { .. } => FailureKind::SessionConstruction,
            Self::Inference(_) => FailureKind::Inference,
            Self::Input(_) | Self::Image(_) => FailureKind::Input,
            Self::InvalidState(_)
            | Self::InvalidConfig(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Category of a [`Failure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    EngineInit,
    SessionConstruction,
    Inference,
    Input,
    /// The background operation panicked
    Panic,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EngineInit => "engine initialization",
            Self::SessionConstruction => "session construction",
            Self::Inference => "inference",
            Self::Input => "input",
            Self::Panic => "panic",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Plain description of a background failure, safe to send between threads
///
/// Worker jobs never hand their `StudioError` to the controlling thread;
/// they are flattened into this value at the job boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a failure from a panic payload caught on the worker
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "background task panicked".to_string()
        };
        Self::new(FailureKind::Panic, message)
    }
}

impl From<&StudioError> for Failure {
    fn from(error: &StudioError) -> Self {
        Self::new(error.failure_kind(), error.detail())
    }
}

impl From<StudioError> for Failure {
    fn from(error: StudioError) -> Self {
        Self::from(&error)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}
