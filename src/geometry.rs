//! # Grid Geometry Module
//!
//! Pure layout math for the inventory grid: bottom-anchored placement,
//! clamp ranges for the user adjustable horizontal gap and vertical offset,
//! the effective column count and the resulting tile rectangles.
//!
//! All coordinates are in source image pixels (before any recognition scale).

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Largest number of rows an inventory page shows
pub const MAX_ROWS: i32 = 4;

/// Bottom edge of the default 4-row layout: `510 + 3 * (340 + 38) + 340`
pub const DEFAULT_BOTTOM: i32 = 1984;

/// Grid placement parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub cols: i32,
    pub rows: i32,
    pub left: i32,
    /// Bottom-anchored base top, before `y_offset` is applied
    pub top: i32,
    pub tile_w: i32,
    pub tile_h: i32,
    pub gap_x: i32,
    pub gap_y: i32,
    /// Recognition upsampling factor
    pub scale: f32,
    /// Vertical shift applied to `top` (positive moves the grid down)
    pub y_offset: i32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            cols: 4,
            rows: 4,
            left: 50,
            top: 510,
            tile_w: 225,
            tile_h: 340,
            gap_x: 24,
            gap_y: 38,
            scale: 2.0,
            y_offset: 0,
        }
    }
}

impl GridParams {
    /// Vertical distance between the tops of two consecutive rows
    pub fn step_y(&self) -> i32 {
        self.tile_h + self.gap_y
    }

    /// Horizontal distance between the left edges of two consecutive columns
    pub fn step_x(&self) -> i32 {
        self.tile_w + self.gap_x
    }

    /// Bottom edge of the last row, ignoring `y_offset`
    pub fn bottom(&self) -> i32 {
        self.top + (self.rows - 1) * self.step_y() + self.tile_h
    }

    /// Total height of the tile box
    pub fn box_height(&self) -> i32 {
        self.rows * self.tile_h + (self.rows - 1).max(0) * self.gap_y
    }

    /// Top of the first row once the offset is applied
    pub fn origin_y(&self) -> i32 {
        self.top + self.y_offset
    }

    /// Change the row count keeping the bottom edge at `fixed_bottom`
    pub fn with_rows(mut self, rows: i32, fixed_bottom: i32) -> Self {
        self.rows = rows.clamp(1, MAX_ROWS);
        self.top = compute_top_from_bottom(self.rows, self.tile_h, self.gap_y, fixed_bottom);
        self
    }

    /// Validate grid parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.cols < 1 {
            return Err(AppError::Config("cols must be at least 1".to_string()));
        }
        if !(1..=MAX_ROWS).contains(&self.rows) {
            return Err(AppError::Config(format!(
                "rows ({}) must be within 1..={}",
                self.rows, MAX_ROWS
            )));
        }
        if self.tile_w <= 0 || self.tile_h <= 0 {
            return Err(AppError::Config(
                "tile dimensions must be positive".to_string(),
            ));
        }
        if self.gap_x < 0 || self.gap_y < 0 {
            return Err(AppError::Config("gaps cannot be negative".to_string()));
        }
        if !self.scale.is_finite() || self.scale < 1.0 {
            return Err(AppError::Config(format!(
                "scale ({}) must be a finite value >= 1",
                self.scale
            )));
        }
        Ok(())
    }
}

/// Inclusive range of feasible values for an adjustable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampRange {
    pub min: i32,
    pub max: i32,
}

impl ClampRange {
    /// Clamp `value` into the range
    pub fn clamp(&self, value: i32) -> i32 {
        value.max(self.min).min(self.max)
    }

    /// Map a slider position in percent (0..=100) onto the range
    pub fn from_percent(&self, percent: f64) -> i32 {
        let pct = percent.clamp(0.0, 100.0);
        let span = f64::from(self.max - self.min);
        (f64::from(self.min) + span * pct / 100.0).round() as i32
    }

    /// Whether the range has collapsed to a single value
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }
}

/// Bounds declared by the adjusting control, applied on top of the computed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclaredBounds {
    pub min: i32,
    pub max: Option<i32>,
}

/// Top of the first row such that the last row ends at `fixed_bottom`.
///
/// `rows` is clamped to `1..=4` before use.
pub fn compute_top_from_bottom(rows: i32, tile_h: i32, gap_y: i32, fixed_bottom: i32) -> i32 {
    let rows = rows.clamp(1, MAX_ROWS);
    let top = f64::from(fixed_bottom)
        - f64::from(tile_h)
        - f64::from(rows - 1) * f64::from(tile_h + gap_y);
    top.round() as i32
}

/// Feasible horizontal gap so that every column fits inside the image.
///
/// A degenerate range (declared minimum above the computed maximum) collapses to the maximum.
pub fn clamp_horizontal_gap(
    image_width: u32,
    params: &GridParams,
    declared: DeclaredBounds,
) -> ClampRange {
    let width = f64::from(image_width);
    let left = f64::from(params.left);
    let tile_w = f64::from(params.tile_w);

    let computed = if params.cols <= 1 {
        (width - left - tile_w).floor().max(0.0)
    } else {
        let numer = width - left - tile_w * f64::from(params.cols);
        let raw = (numer / f64::from(params.cols - 1)).floor();
        if raw.is_finite() && raw >= 0.0 {
            raw
        } else {
            0.0
        }
    };
    let mut max = computed as i32;

    if let Some(declared_max) = declared.max {
        max = max.min(declared_max);
    }

    if declared.min > max {
        return ClampRange { min: max, max };
    }
    ClampRange {
        min: declared.min,
        max,
    }
}

/// Feasible vertical offset so the whole tile box stays within `[0, image_height]`.
///
/// A degenerate range (box taller than the image) collapses to the minimum,
/// which aligns the grid with the image top.
pub fn clamp_vertical_offset(image_height: u32, params: &GridParams) -> ClampRange {
    let base_top = params.top;
    let min = -base_top;
    let max = image_height as i32 - (base_top + params.box_height());
    if min > max {
        return ClampRange { min, max: min };
    }
    ClampRange { min, max }
}

/// Number of columns that fit horizontally, never more than `params.cols` and never below 1
pub fn effective_column_count(image_width: u32, params: &GridParams) -> i32 {
    let step = params.step_x();
    if step <= 0 {
        return 1;
    }
    let usable = (image_width as i32 - params.left + params.gap_x).max(0);
    let fitting = (usable / step).max(1);
    params.cols.min(fitting).max(1)
}

/// One grid cell in source image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    /// Position in row-major order among produced tiles (0-based)
    pub index: usize,
    pub row: i32,
    pub col: i32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Row-major tile rectangles that fit entirely inside the image.
///
/// Cells crossing an image edge are skipped rather than produced.
pub fn tile_layout(image_width: u32, image_height: u32, params: &GridParams) -> Vec<TileRect> {
    let eff_cols = effective_column_count(image_width, params);
    let (w, h) = (image_width as i32, image_height as i32);
    let mut tiles = Vec::new();

    for row in 0..params.rows.clamp(1, MAX_ROWS) {
        for col in 0..eff_cols {
            let x = params.left + col * params.step_x();
            let y = params.origin_y() + row * params.step_y();
            if x < 0 || y < 0 || x + params.tile_w > w || y + params.tile_h > h {
                continue;
            }
            tiles.push(TileRect {
                index: tiles.len(),
                row,
                col,
                x,
                y,
                width: params.tile_w,
                height: params.tile_h,
            });
        }
    }

    tiles
}

/// Clamp the adjustable parameters of `params` against an image.
///
/// Rows are forced into range and the base top recomputed from `fixed_bottom`,
/// then the gap and offset are pulled into their feasible ranges.
pub fn clamp_to_image(
    image_width: u32,
    image_height: u32,
    params: &GridParams,
    fixed_bottom: i32,
    declared_gap: DeclaredBounds,
) -> (GridParams, ClampRange, ClampRange) {
    let mut clamped = params.with_rows(params.rows, fixed_bottom);
    clamped.cols = clamped.cols.max(1);

    let gap_range = clamp_horizontal_gap(image_width, &clamped, declared_gap);
    clamped.gap_x = gap_range.clamp(clamped.gap_x);

    let offset_range = clamp_vertical_offset(image_height, &clamped);
    clamped.y_offset = offset_range.clamp(clamped.y_offset);

    (clamped, gap_range, offset_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bottom_matches_default_grid() {
        assert_eq!(GridParams::default().bottom(), DEFAULT_BOTTOM);
    }

    #[test]
    fn test_top_from_bottom_round_trip() {
        for rows in 1..=4 {
            let top = compute_top_from_bottom(rows, 340, 38, DEFAULT_BOTTOM);
            let params = GridParams {
                rows,
                top,
                ..Default::default()
            };
            assert_eq!(params.bottom(), DEFAULT_BOTTOM, "rows={}", rows);
        }
        assert_eq!(compute_top_from_bottom(4, 340, 38, DEFAULT_BOTTOM), 510);
        assert_eq!(compute_top_from_bottom(1, 340, 38, DEFAULT_BOTTOM), 1644);
    }

    #[test]
    fn test_rows_are_clamped() {
        assert_eq!(
            compute_top_from_bottom(9, 340, 38, DEFAULT_BOTTOM),
            compute_top_from_bottom(4, 340, 38, DEFAULT_BOTTOM)
        );
        assert_eq!(
            compute_top_from_bottom(0, 340, 38, DEFAULT_BOTTOM),
            compute_top_from_bottom(1, 340, 38, DEFAULT_BOTTOM)
        );
        let params = GridParams::default().with_rows(7, DEFAULT_BOTTOM);
        assert_eq!(params.rows, 4);
    }

    #[test]
    fn test_horizontal_gap_range() {
        let params = GridParams::default();
        // (1080 - 50 - 900) / 3 = 43.33
        let range = clamp_horizontal_gap(1080, &params, DeclaredBounds::default());
        assert_eq!(range, ClampRange { min: 0, max: 43 });

        // Too narrow: negative numerator floors at 0
        let range = clamp_horizontal_gap(800, &params, DeclaredBounds::default());
        assert_eq!(range, ClampRange { min: 0, max: 0 });

        let single = GridParams {
            cols: 1,
            ..Default::default()
        };
        let range = clamp_horizontal_gap(400, &single, DeclaredBounds::default());
        assert_eq!(range, ClampRange { min: 0, max: 125 });

        let range = clamp_horizontal_gap(
            1080,
            &params,
            DeclaredBounds {
                min: 0,
                max: Some(30),
            },
        );
        assert_eq!(range.max, 30);
    }

    #[test]
    fn test_horizontal_gap_degenerate_collapses_to_max() {
        let params = GridParams::default();
        let range = clamp_horizontal_gap(
            800,
            &params,
            DeclaredBounds {
                min: 10,
                max: None,
            },
        );
        assert_eq!(range, ClampRange { min: 0, max: 0 });
        assert!(range.is_degenerate());
    }

    #[test]
    fn test_vertical_offset_range() {
        let params = GridParams::default();
        let range = clamp_vertical_offset(2400, &params);
        // box height = 4*340 + 3*38 = 1474; max = 2400 - (510 + 1474)
        assert_eq!(range, ClampRange { min: -510, max: 416 });

        let tall = clamp_vertical_offset(1000, &params);
        assert!(tall.min <= tall.max);
        assert_eq!(tall.min, tall.max);
    }

    #[test]
    fn test_effective_columns() {
        let params = GridParams::default();
        assert_eq!(effective_column_count(1080, &params), 4);
        // (700 - 50 + 24) / 249 = 2
        assert_eq!(effective_column_count(700, &params), 2);
        assert_eq!(effective_column_count(10, &params), 1);
    }

    #[test]
    fn test_tile_layout_stays_inside_image() {
        for width in [300_u32, 700, 1080, 1500] {
            for height in [600_u32, 2000, 2400] {
                let params = GridParams::default();
                let tiles = tile_layout(width, height, &params);
                assert!(effective_column_count(width, &params) <= params.cols);
                for tile in &tiles {
                    assert!(tile.x + tile.width <= width as i32);
                    assert!(tile.y + tile.height <= height as i32);
                    assert!(tile.x >= 0 && tile.y >= 0);
                }
            }
        }
    }

    #[test]
    fn test_tile_layout_row_major_order() {
        let tiles = tile_layout(1080, 2400, &GridParams::default());
        assert_eq!(tiles.len(), 16);
        assert_eq!((tiles[0].row, tiles[0].col), (0, 0));
        assert_eq!((tiles[1].row, tiles[1].col), (0, 1));
        assert_eq!((tiles[4].row, tiles[4].col), (1, 0));
        assert_eq!(tiles[5].x, 50 + 249);
        assert_eq!(tiles[5].y, 510 + 378);
        assert!(tiles.iter().enumerate().all(|(i, t)| t.index == i));
    }

    #[test]
    fn test_out_of_bounds_rows_are_skipped() {
        // Image ends in the middle of the last row
        let tiles = tile_layout(1080, 1900, &GridParams::default());
        assert_eq!(tiles.len(), 12);
    }

    #[test]
    fn test_slider_mapping() {
        let range = ClampRange { min: -510, max: 416 };
        assert_eq!(range.from_percent(0.0), -510);
        assert_eq!(range.from_percent(100.0), 416);
        assert_eq!(range.from_percent(50.0), -47);
        assert_eq!(range.from_percent(150.0), 416);
        assert_eq!(range.clamp(1000), 416);
        assert_eq!(range.clamp(-1000), -510);
    }

    #[test]
    fn test_clamp_to_image() {
        let params = GridParams {
            gap_x: 80,
            y_offset: 900,
            ..Default::default()
        };
        let (clamped, gap, offset) =
            clamp_to_image(1080, 2400, &params, DEFAULT_BOTTOM, DeclaredBounds::default());
        assert_eq!(clamped.gap_x, gap.max);
        assert_eq!(clamped.y_offset, offset.max);
        assert_eq!(clamped.top, 510);
    }

    #[test]
    fn test_validate() {
        assert!(GridParams::default().validate().is_ok());
        let bad = GridParams {
            rows: 5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = GridParams {
            scale: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
