//! Shared image utilities for segmentation engines

pub mod mask;
pub mod preprocessing;

pub use mask::{apply_alpha, prediction_to_mask, refine_edges};
pub use preprocessing::image_to_tensor;
