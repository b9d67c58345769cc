//! Segmentation engine implementations
//!
//! - ONNX Runtime engine (`onnx` feature)

#[cfg(feature = "onnx")]
pub mod onnx;

// Mock engine for unit tests
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxEngine, OnnxSession};
