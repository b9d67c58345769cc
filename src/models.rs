//! Model catalogue
//!
//! Identifies the pretrained segmentation networks the tool can drive and the
//! input profile each one expects.

use crate::error::{Result, StudioError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Pretrained segmentation network selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    /// General purpose U²-Net
    #[serde(rename = "u2net")]
    U2Net,
    /// `ISNet` trained for higher accuracy on general images
    #[serde(rename = "isnet-general-use")]
    IsNetGeneralUse,
    /// `ISNet` tuned for anime and illustrations
    #[serde(rename = "isnet-anime")]
    IsNetAnime,
}

/// Input requirements of a segmentation network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    /// Square input resolution in pixels
    pub input_size: u32,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
}

impl ModelId {
    /// Every model in menu order
    pub const ALL: [ModelId; 3] = [Self::U2Net, Self::IsNetGeneralUse, Self::IsNetAnime];

    /// Stable identifier, also the weight file stem
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::IsNetGeneralUse => "isnet-general-use",
            Self::IsNetAnime => "isnet-anime",
        }
    }

    /// Label shown in the model picker
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::U2Net => "u2net (standard)",
            Self::IsNetGeneralUse => "isnet-general-use (high accuracy)",
            Self::IsNetAnime => "isnet-anime (anime)",
        }
    }

    /// Map a picker label back to a model
    ///
    /// Unknown labels select the default model.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|model| model.label() == label)
            .unwrap_or_default()
    }

    /// File name of the ONNX weights inside the model directory
    #[must_use]
    pub fn weights_file(self) -> String {
        format!("{}.onnx", self.as_str())
    }

    #[must_use]
    pub fn profile(self) -> ModelProfile {
        match self {
            Self::U2Net => ModelProfile {
                input_size: 320,
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            },
            Self::IsNetGeneralUse | Self::IsNetAnime => ModelProfile {
                input_size: 1024,
                mean: [0.5, 0.5, 0.5],
                std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::U2Net
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                StudioError::invalid_config(format!(
                    "Unknown model '{}'. Available models: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}
