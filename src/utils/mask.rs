//! Segmentation mask post-processing
//!
//! Turns raw model output into an alpha mask at source resolution, optionally
//! refines its edges, and applies it to the source image.

use crate::{
    error::{Result, StudioError},
    inference::MattingOptions,
};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use ndarray::ArrayViewD;

/// Convert the model's prediction into a mask of `target` size
///
/// The first channel of the output is min-max normalized to 0..=255 and
/// resized with Lanczos3.
///
/// # Errors
/// - Output with fewer than two dimensions or too few values
pub fn prediction_to_mask(prediction: &ArrayViewD<'_, f32>, target: (u32, u32)) -> Result<GrayImage> {
    let shape = prediction.shape();
    let (height, width) = match shape {
        [.., h, w] if *h > 0 && *w > 0 => (*h, *w),
        _ => {
            return Err(StudioError::inference(format!(
                "Unexpected model output shape {shape:?}"
            )));
        },
    };

    let values: Vec<f32> = prediction.iter().take(height * width).copied().collect();
    if values.len() != height * width {
        return Err(StudioError::inference(format!(
            "Model output has {} values, expected {}",
            values.len(),
            height * width
        )));
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(1e-6);

    let pixels: Vec<u8> = values
        .iter()
        .map(|&v| (((v - min) / range).clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    let mask = GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| StudioError::internal("Mask buffer size mismatch"))?;

    if mask.dimensions() == target {
        Ok(mask)
    } else {
        Ok(imageops::resize(&mask, target.0, target.1, FilterType::Lanczos3))
    }
}

/// Sharpen confident regions and soften the uncertain band of a mask
///
/// Pixels above the foreground threshold and below the background threshold
/// form a trimap whose definite regions are eroded by `erode_size`. Definite
/// regions become fully opaque or fully transparent; the band between them
/// keeps a blurred copy of the original mask.
#[must_use]
pub fn refine_edges(mask: &GrayImage, options: &MattingOptions) -> GrayImage {
    let (width, height) = mask.dimensions();
    let radius = options.erode_size as usize;

    let foreground: Vec<bool> = mask
        .pixels()
        .map(|p| p[0] > options.foreground_threshold)
        .collect();
    let background: Vec<bool> = mask
        .pixels()
        .map(|p| p[0] < options.background_threshold)
        .collect();

    let foreground = erode(&foreground, width as usize, height as usize, radius);
    let background = erode(&background, width as usize, height as usize, radius);

    let sigma = (options.erode_size as f32 / 2.0).max(1.0);
    let softened = imageops::blur(mask, sigma);

    let mut refined = GrayImage::new(width, height);
    for (x, y, pixel) in refined.enumerate_pixels_mut() {
        let index = y as usize * width as usize + x as usize;
        let value = if foreground.get(index).copied().unwrap_or(false) {
            255
        } else if background.get(index).copied().unwrap_or(false) {
            0
        } else {
            softened.get_pixel(x, y)[0]
        };
        *pixel = Luma([value]);
    }
    refined
}

/// Binary erosion with a square structuring element of side `2 * radius + 1`
///
/// Pixels outside the image count as unset.
fn erode(bits: &[bool], width: usize, height: usize, radius: usize) -> Vec<bool> {
    if radius == 0 {
        return bits.to_vec();
    }

    let horizontal = erode_lines(bits, width, height, radius, |line, i| line * width + i);
    erode_lines(&horizontal, height, width, radius, |line, i| i * width + line)
}

/// Erode every line independently using prefix counts of unset pixels
fn erode_lines(
    bits: &[bool],
    lines_len: usize,
    lines: usize,
    radius: usize,
    index: impl Fn(usize, usize) -> usize,
) -> Vec<bool> {
    let mut out = vec![false; bits.len()];
    let mut unset_prefix = vec![0usize; lines_len + 1];

    for line in 0..lines {
        for i in 0..lines_len {
            let set = bits.get(index(line, i)).copied().unwrap_or(false);
            let previous = unset_prefix.get(i).copied().unwrap_or(0);
            if let Some(slot) = unset_prefix.get_mut(i + 1) {
                *slot = previous + usize::from(!set);
            }
        }
        for i in 0..lines_len {
            if i < radius || i + radius >= lines_len {
                continue;
            }
            let start = unset_prefix.get(i - radius).copied().unwrap_or(0);
            let end = unset_prefix.get(i + radius + 1).copied().unwrap_or(0);
            if end == start {
                if let Some(slot) = out.get_mut(index(line, i)) {
                    *slot = true;
                }
            }
        }
    }
    out
}

/// Use `mask` as the alpha channel of `image`
///
/// Fully transparent pixels are zeroed.
///
/// # Errors
/// - Mask and image dimensions differ
pub fn apply_alpha(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
    let mut output = image.to_rgba8();
    if output.dimensions() != mask.dimensions() {
        return Err(StudioError::internal(format!(
            "Mask is {:?} but image is {:?}",
            mask.dimensions(),
            output.dimensions()
        )));
    }

    for (pixel, alpha) in output.pixels_mut().zip(mask.pixels()) {
        let alpha = alpha[0];
        *pixel = if alpha == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([pixel[0], pixel[1], pixel[2], alpha])
        };
    }
    Ok(output)
}
