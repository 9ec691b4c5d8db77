//! # Image Thresholding Module
//!
//! Scales a screenshot within a pixel budget and converts it to a pure
//! black/white canvas using a contrast-boosted fixed threshold.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use std::time::Instant;

use super::types::{PreprocessedImage, PreprocessingError};
use crate::config::PreprocessConfig;

/// Scale actually usable for an image of `width` x `height`.
///
/// The requested scale is lowered so the scaled canvas stays within
/// `max_canvas_pixels`, then clamped to `[min_scale, max_scale]`.
pub fn effective_scale(width: u32, height: u32, requested: f32, config: &PreprocessConfig) -> f32 {
    let area = (u64::from(width) * u64::from(height)).max(1) as f64;
    let budget = (config.max_canvas_pixels as f64 / area).sqrt() as f32;
    requested
        .min(budget)
        .min(config.max_scale)
        .max(config.min_scale)
}

/// Luminance after contrast gain, before thresholding
fn boosted_luma(r: u8, g: u8, b: u8, gain: f32) -> f32 {
    let gray = f32::from(r) * 0.3 + f32::from(g) * 0.59 + f32::from(b) * 0.11;
    (gray - 128.0) * gain + 128.0
}

/// Binarizes an image for recognition.
///
/// The image is resized with nearest-neighbour sampling to the effective
/// scale, converted to luminance (`0.3R + 0.59G + 0.11B`), contrast boosted
/// around mid-grey by `gain`, and thresholded: brighter than `threshold`
/// becomes white, everything else black.
///
/// # Arguments
///
/// * `image` - The decoded source image
/// * `requested_scale` - Desired upsampling factor
/// * `config` - Pixel budget, scale bounds, gain and threshold
///
/// # Returns
///
/// The binary canvas together with the scale actually applied
///
/// # Examples
///
/// ```
/// use stock_grid::config::PreprocessConfig;
/// use stock_grid::preprocessing::binarize;
/// use image::DynamicImage;
///
/// let img = DynamicImage::new_rgb8(100, 50);
/// let pre = binarize(&img, 2.0, &PreprocessConfig::default()).unwrap();
/// assert_eq!(pre.image.dimensions(), (200, 100));
/// assert_eq!(pre.effective_scale, 2.0);
/// ```
pub fn binarize(
    image: &DynamicImage,
    requested_scale: f32,
    config: &PreprocessConfig,
) -> Result<PreprocessedImage, PreprocessingError> {
    let start_time = Instant::now();

    if !requested_scale.is_finite() || requested_scale <= 0.0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: format!("invalid scale {}", requested_scale),
        });
    }

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: "image has no pixels".to_string(),
        });
    }

    let scale = effective_scale(width, height, requested_scale, config);
    let target_w = ((width as f32 * scale).round() as u32).max(1);
    let target_h = ((height as f32 * scale).round() as u32).max(1);

    let rgb = image.to_rgb8();
    let scaled = if (target_w, target_h) == (width, height) {
        rgb
    } else {
        image::imageops::resize(&rgb, target_w, target_h, FilterType::Nearest)
    };

    let mut binary = GrayImage::new(target_w, target_h);
    for (x, y, pixel) in scaled.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let value = if boosted_luma(r, g, b, config.gain) > config.threshold {
            255u8
        } else {
            0u8
        };
        binary.put_pixel(x, y, Luma([value]));
    }

    let processing_time = start_time.elapsed();

    tracing::debug!(
        requested_scale,
        effective_scale = scale,
        width = target_w,
        height = target_h,
        "Binarized image in {}ms",
        processing_time.as_millis()
    );

    Ok(PreprocessedImage {
        image: binary,
        effective_scale: scale,
        requested_scale,
        source_dimensions: (width, height),
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_effective_scale_respects_budget() {
        let config = PreprocessConfig::default();
        // 1080x2400 = 2.59M px; sqrt(5M / 2.59M) = 1.389
        let scale = effective_scale(1080, 2400, 2.0, &config);
        assert!((scale - 1.389).abs() < 0.01, "scale = {}", scale);

        assert_eq!(effective_scale(100, 100, 2.0, &config), 2.0);
        assert_eq!(effective_scale(100, 100, 9.0, &config), 4.0);
        // Never below the minimum even for huge images
        assert_eq!(effective_scale(10_000, 10_000, 2.0, &config), 1.0);
    }

    #[test]
    fn test_threshold_with_gain() {
        let mut img = RgbImage::new(3, 1);
        // gray 200 -> 218 > 175: white
        img.put_pixel(0, 0, Rgb([200, 200, 200]));
        // gray 160 -> 168 <= 175: black
        img.put_pixel(1, 0, Rgb([160, 160, 160]));
        // gray 170 -> 180.5 > 175: white (above the plain threshold only after gain)
        img.put_pixel(2, 0, Rgb([170, 170, 170]));

        let pre = binarize(&DynamicImage::ImageRgb8(img), 1.0, &PreprocessConfig::default())
            .expect("binarize");
        assert_eq!(pre.image.get_pixel(0, 0)[0], 255);
        assert_eq!(pre.image.get_pixel(1, 0)[0], 0);
        assert_eq!(pre.image.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn test_nearest_upscale_keeps_binary_edges() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let pre = binarize(&DynamicImage::ImageRgb8(img), 2.0, &PreprocessConfig::default())
            .expect("binarize");
        assert_eq!(pre.image.dimensions(), (4, 2));
        assert!(pre.image.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(pre.image.get_pixel(0, 0)[0], 0);
        assert_eq!(pre.image.get_pixel(3, 1)[0], 255);
        assert_eq!(pre.source_dimensions, (2, 1));
    }

    #[test]
    fn test_invalid_input() {
        let config = PreprocessConfig::default();
        assert!(binarize(&DynamicImage::new_rgb8(0, 0), 2.0, &config).is_err());
        assert!(binarize(&DynamicImage::new_rgb8(4, 4), f32::NAN, &config).is_err());
    }
}
