//! Image to tensor conversion for segmentation models

use crate::{
    error::{Result, StudioError},
    models::ModelProfile,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Convert an image into the model's NCHW input tensor
///
/// The image is stretched to the model's square input size, scaled by its
/// brightest channel value and normalized per channel with the profile's
/// mean and standard deviation.
///
/// # Errors
/// - Empty image
pub fn image_to_tensor(image: &DynamicImage, profile: &ModelProfile) -> Result<Array4<f32>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(StudioError::input("Cannot process an empty image"));
    }

    let size = profile.input_size;
    let resized = image
        .resize_exact(size, size, FilterType::Lanczos3)
        .to_rgb8();

    Ok(canvas_to_tensor(&resized, profile))
}

fn canvas_to_tensor(canvas: &RgbImage, profile: &ModelProfile) -> Array4<f32> {
    let (width, height) = canvas.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    let max_value = canvas
        .as_raw()
        .iter()
        .copied()
        .max()
        .map_or(1.0, |value| f32::from(value).max(1e-6));

    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / max_value;
            let normalized = (value - profile.mean[channel]) / profile.std[channel];
            if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                *slot = normalized;
            }
        }
    }

    tensor
}
