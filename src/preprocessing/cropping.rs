//! # Image Cropping Module
//!
//! Cuts grid tiles out of the binarized canvas, optionally upsampling them
//! before recognition, and renders smoothed thumbnails for the
//! confirmation surface.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

use super::types::{PreprocessedImage, PreprocessingError, Thumbnail};
use crate::config::PreprocessConfig;
use crate::geometry::TileRect;

/// Extra upsampling factor for a tile recognized at `target_scale`.
///
/// Returns `None` when the canvas is already close enough to the target
/// (ratio not above `upsample_margin`); otherwise the ratio capped at
/// `upsample_cap`.
pub fn extra_upsample_factor(
    effective_scale: f32,
    target_scale: f32,
    config: &PreprocessConfig,
) -> Option<f32> {
    if effective_scale <= 0.0 || !target_scale.is_finite() {
        return None;
    }
    let up = (target_scale / effective_scale).max(1.0);
    (up > config.upsample_margin).then(|| up.min(config.upsample_cap))
}

/// Crops a region of the binarized canvas.
///
/// When `target_scale` asks for more resolution than the canvas was rendered
/// at, the crop is enlarged with nearest-neighbour sampling so glyph edges stay
/// sharp. The enlargement is capped by `config.upsample_cap`.
///
/// # Arguments
///
/// * `pre` - Binarized canvas and the scale it was rendered at
/// * `x`, `y`, `width`, `height` - Region in canvas pixels
/// * `target_scale` - Recognition scale requested for this attempt, if any
/// * `config` - Upsampling margin and cap
///
/// # Returns
///
/// The tile image, or `PreprocessingError::OutOfBounds` if the region does
/// not fit inside the canvas
pub fn extract_tile(
    pre: &PreprocessedImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    target_scale: Option<f32>,
    config: &PreprocessConfig,
) -> Result<GrayImage, PreprocessingError> {
    let (canvas_w, canvas_h) = pre.image.dimensions();
    let fits = width > 0
        && height > 0
        && x.checked_add(width).is_some_and(|right| right <= canvas_w)
        && y.checked_add(height).is_some_and(|bottom| bottom <= canvas_h);
    if !fits {
        return Err(PreprocessingError::OutOfBounds {
            x,
            y,
            width,
            height,
        });
    }

    let tile = image::imageops::crop_imm(&pre.image, x, y, width, height).to_image();

    let Some(factor) =
        target_scale.and_then(|target| extra_upsample_factor(pre.effective_scale, target, config))
    else {
        return Ok(tile);
    };

    let up_w = ((width as f32 * factor).round() as u32).max(1);
    let up_h = ((height as f32 * factor).round() as u32).max(1);
    tracing::trace!(factor, up_w, up_h, "Upsampling tile");
    Ok(image::imageops::resize(&tile, up_w, up_h, FilterType::Nearest))
}

/// Crops the tile for a grid cell given in source coordinates.
///
/// The rectangle is mapped through the canvas' effective scale; rounding
/// overflow at the canvas edge is trimmed.
pub fn extract_grid_tile(
    pre: &PreprocessedImage,
    rect: &TileRect,
    target_scale: Option<f32>,
    config: &PreprocessConfig,
) -> Result<GrayImage, PreprocessingError> {
    let (x, y, w, h) = pre.scaled_region(rect.x, rect.y, rect.width, rect.height);
    let (canvas_w, canvas_h) = pre.image.dimensions();
    let w = w.min(canvas_w.saturating_sub(x));
    let h = h.min(canvas_h.saturating_sub(y));
    extract_tile(pre, x, y, w, h, target_scale, config)
}

/// Renders a smoothed preview of a grid cell from the original image.
///
/// The width is `thumbnail_width` pixels (the scale is bounded to `0.05..=1`),
/// keeping the tile's aspect ratio.
pub fn make_thumbnail(
    source: &DynamicImage,
    rect: &TileRect,
    config: &PreprocessConfig,
) -> Result<Thumbnail, PreprocessingError> {
    if rect.x < 0 || rect.y < 0 || rect.width <= 0 || rect.height <= 0 {
        return Err(PreprocessingError::OutOfBounds {
            x: rect.x.max(0) as u32,
            y: rect.y.max(0) as u32,
            width: rect.width.max(0) as u32,
            height: rect.height.max(0) as u32,
        });
    }
    let (x, y, w, h) = (
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
    );
    if x + w > source.width() || y + h > source.height() {
        return Err(PreprocessingError::OutOfBounds {
            x,
            y,
            width: w,
            height: h,
        });
    }

    let scale = (config.thumbnail_width as f32 / w as f32).clamp(0.05, 1.0);
    let thumb_w = ((w as f32 * scale).round() as u32).max(1);
    let thumb_h = ((h as f32 * scale).round() as u32).max(1);

    let crop = source.crop_imm(x, y, w, h).to_rgb8();
    let image = image::imageops::resize(&crop, thumb_w, thumb_h, FilterType::Triangle);

    Ok(Thumbnail {
        width: thumb_w,
        height: thumb_h,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn canvas(width: u32, height: u32, effective_scale: f32) -> PreprocessedImage {
        let mut image = GrayImage::new(width, height);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            *pixel = Luma([if x % 2 == 0 { 0 } else { 255 }]);
        }
        PreprocessedImage {
            image,
            effective_scale,
            requested_scale: effective_scale,
            source_dimensions: (width, height),
            processing_time_ms: 0,
        }
    }

    #[test]
    fn test_upsample_factor() {
        let config = PreprocessConfig::default();
        assert_eq!(extra_upsample_factor(2.0, 2.0, &config), None);
        assert_eq!(extra_upsample_factor(2.0, 2.01, &config), None);
        assert_eq!(extra_upsample_factor(1.0, 2.0, &config), Some(2.0));
        assert_eq!(extra_upsample_factor(1.0, 9.0, &config), Some(3.0));
        assert_eq!(extra_upsample_factor(2.0, 1.0, &config), None);
    }

    #[test]
    fn test_extract_tile_plain_crop() {
        let pre = canvas(20, 10, 2.0);
        let tile = extract_tile(&pre, 2, 1, 6, 4, Some(2.0), &PreprocessConfig::default())
            .expect("crop");
        assert_eq!(tile.dimensions(), (6, 4));
        assert_eq!(tile.get_pixel(0, 0)[0], 0);
        assert_eq!(tile.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_extract_tile_upsamples_without_smoothing() {
        let pre = canvas(20, 10, 1.0);
        let tile = extract_tile(&pre, 0, 0, 4, 2, Some(2.0), &PreprocessConfig::default())
            .expect("crop");
        assert_eq!(tile.dimensions(), (8, 4));
        assert!(tile.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_extract_tile_rejects_out_of_bounds() {
        let pre = canvas(20, 10, 1.0);
        let err = extract_tile(&pre, 15, 0, 10, 2, None, &PreprocessConfig::default());
        assert!(matches!(err, Err(PreprocessingError::OutOfBounds { .. })));
        let err = extract_tile(&pre, 0, 0, 0, 2, None, &PreprocessConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_extract_grid_tile_trims_rounding_overflow() {
        // 7 * 1.5 = 10.5 -> canvas is 11 wide; rect 3..7 maps to 5 + 6 = 11
        let pre = canvas(11, 6, 1.5);
        let rect = TileRect {
            index: 0,
            row: 0,
            col: 0,
            x: 3,
            y: 0,
            width: 4,
            height: 4,
        };
        let tile = extract_grid_tile(&pre, &rect, None, &PreprocessConfig::default())
            .expect("tile");
        assert_eq!(tile.dimensions(), (6, 6));
    }

    #[test]
    fn test_thumbnail_width() {
        let source = DynamicImage::new_rgb8(300, 400);
        let rect = TileRect {
            index: 0,
            row: 0,
            col: 0,
            x: 50,
            y: 10,
            width: 225,
            height: 340,
        };
        let thumb = make_thumbnail(&source, &rect, &PreprocessConfig::default()).expect("thumb");
        assert_eq!(thumb.width, 40);
        assert_eq!(thumb.height, 60);

        let outside = TileRect { x: 200, ..rect };
        assert!(make_thumbnail(&source, &outside, &PreprocessConfig::default()).is_err());
    }
}
