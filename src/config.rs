//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! It supports loading from environment variables, validation, and provides
//! a clean interface for accessing configuration throughout the application.

use crate::errors::{error_logging, AppError, AppResult};
use crate::geometry::{GridParams, DEFAULT_BOTTOM};
use crate::matcher::DEFAULT_STOPWORDS;
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{ModelType, OcrConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Fuzzy matching and reconciliation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Largest edit distance at which a candidate is accepted at all
    pub max_distance: usize,
    /// Largest edit distance eligible for auto-apply
    pub auto_apply_distance_max: usize,
    /// Quantities at or above this value always require confirmation
    pub auto_confirm_quantity_min: u32,
    /// Generic flavour modifiers excluded from the keyword index
    pub stopwords: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_distance: 3,
            auto_apply_distance_max: 1,
            auto_confirm_quantity_min: 300,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MatcherConfig {
    /// Validate matcher configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.auto_apply_distance_max > self.max_distance {
            return Err(AppError::Config(format!(
                "auto_apply_distance_max ({}) cannot exceed max_distance ({})",
                self.auto_apply_distance_max, self.max_distance
            )));
        }
        if self.auto_confirm_quantity_min == 0 {
            return Err(AppError::Config(
                "auto_confirm_quantity_min must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Multi-scale retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Recognition scales tried in order; the first is the primary attempt
    pub scale_candidates: Vec<f32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            scale_candidates: vec![2.0, 3.0],
        }
    }
}

impl RetryConfig {
    /// Parse a comma separated list such as `"2,3.5"`
    pub fn parse_scales(value: &str) -> AppResult<Vec<f32>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f32>()
                    .map_err(|_| AppError::Config(format!("RETRY_SCALES entry '{}' is not a number", s)))
            })
            .collect()
    }

    /// Validate retry configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.scale_candidates.is_empty() {
            return Err(AppError::Config(
                "scale_candidates must contain at least one scale".to_string(),
            ));
        }
        if let Some(bad) = self
            .scale_candidates
            .iter()
            .find(|s| !s.is_finite() || **s < 1.0)
        {
            return Err(AppError::Config(format!(
                "scale candidate {} must be a finite value >= 1",
                bad
            )));
        }
        Ok(())
    }
}

/// Binarization and tiling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Pixel budget of the scaled canvas
    pub max_canvas_pixels: u64,
    /// Lower bound of the effective scale
    pub min_scale: f32,
    /// Upper bound of the effective scale
    pub max_scale: f32,
    /// Contrast gain applied around mid-grey
    pub gain: f32,
    /// Luminance above which a pixel becomes white
    pub threshold: f32,
    /// Maximum extra upsampling applied to a single tile
    pub upsample_cap: f32,
    /// Extra upsampling only happens above this ratio
    pub upsample_margin: f32,
    /// Width of confirmation thumbnails in pixels
    pub thumbnail_width: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_canvas_pixels: 5_000_000,
            min_scale: 1.0,
            max_scale: 4.0,
            gain: 1.25,
            threshold: 175.0,
            upsample_cap: 3.0,
            upsample_margin: 1.01,
            thumbnail_width: 40,
        }
    }
}

impl PreprocessConfig {
    /// Validate preprocessing configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.max_canvas_pixels == 0 {
            return Err(AppError::Config(
                "max_canvas_pixels must be greater than 0".to_string(),
            ));
        }
        if self.min_scale <= 0.0 || self.min_scale > self.max_scale {
            return Err(AppError::Config(format!(
                "scale bounds are invalid: min_scale={} max_scale={}",
                self.min_scale, self.max_scale
            )));
        }
        if !(0.0..=255.0).contains(&self.threshold) {
            return Err(AppError::Config(format!(
                "threshold ({}) must be within 0..=255",
                self.threshold
            )));
        }
        if self.gain <= 0.0 {
            return Err(AppError::Config("gain must be positive".to_string()));
        }
        if self.upsample_cap < 1.0 || self.upsample_margin < 1.0 {
            return Err(AppError::Config(
                "upsample_cap and upsample_margin must be >= 1".to_string(),
            ));
        }
        if self.thumbnail_width == 0 {
            return Err(AppError::Config(
                "thumbnail_width must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of tiles recognized concurrently
    pub max_concurrent_tiles: usize,
    /// How long a completed batch can be undone
    pub undo_window: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tiles: 2,
            undo_window: Duration::from_secs(3),
        }
    }
}

impl PipelineConfig {
    /// Validate pipeline configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_tiles == 0 {
            return Err(AppError::Config(
                "max_concurrent_tiles cannot be 0".to_string(),
            ));
        }
        if self.max_concurrent_tiles > 16 {
            return Err(AppError::Config(
                "max_concurrent_tiles cannot be greater than 16".to_string(),
            ));
        }
        if self.undo_window.is_zero() {
            return Err(AppError::Config("undo_window cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Initial grid geometry
    pub grid: GridParams,
    /// Bottom edge the grid stays anchored to when rows change
    pub fixed_bottom: i32,
    /// Matcher and reconciliation thresholds
    pub matcher: MatcherConfig,
    /// Multi-scale retry configuration
    pub retry: RetryConfig,
    /// Binarization and tiling parameters
    pub preprocess: PreprocessConfig,
    /// Batch orchestration settings
    pub pipeline: PipelineConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
    /// Ingredient catalog file; the embedded catalog is used when unset
    pub catalog_path: Option<String>,
    /// Stock persistence file
    pub stock_path: String,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> AppResult<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a valid number", key)))
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        config.catalog_path = env::var("CATALOG_PATH").ok();
        config.stock_path = env::var("STOCK_PATH").unwrap_or_else(|_| config.stock_path.clone());

        // Load grid configuration
        let rows: i32 = parse_env("GRID_ROWS", "4")?;
        config.grid = config.grid.with_rows(rows, config.fixed_bottom);
        config.grid.scale = parse_env("GRID_SCALE", "2")?;

        // Load OCR configuration
        if let Ok(languages) = env::var("OCR_NAME_LANGUAGES") {
            config.ocr.name_pass.languages = languages;
        }
        if let Ok(languages) = env::var("OCR_DIGIT_LANGUAGES") {
            config.ocr.digit_pass.languages = languages;
        }
        if let Ok(model) = env::var("OCR_MODEL_TYPE") {
            config.ocr.model_type = ModelType::parse(&model).ok_or_else(|| {
                AppError::Config("OCR_MODEL_TYPE must be 'fast' or 'best'".to_string())
            })?;
        }
        config.ocr.recovery.operation_timeout_secs = parse_env("OCR_TIMEOUT_SECS", "30")?;

        // Load pipeline configuration
        config.pipeline.max_concurrent_tiles = parse_env("MAX_CONCURRENT_TILES", "2")?;
        config.pipeline.undo_window = Duration::from_secs(parse_env("UNDO_WINDOW_SECS", "3")?);

        if let Ok(scales) = env::var("RETRY_SCALES") {
            config.retry.scale_candidates = RetryConfig::parse_scales(&scales)?;
        }

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.grid.validate()?;
        self.matcher.validate()?;
        self.retry.validate()?;
        self.preprocess.validate()?;
        self.pipeline.validate()?;
        self.ocr.validate()?;
        self.observability.validate().map_err(AppError::Config)?;
        if self.stock_path.trim().is_empty() {
            return Err(AppError::Config("stock_path cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Validate and hand the configuration back, logging why it was rejected
    pub fn into_validated(self) -> AppResult<Self> {
        if let Err(e) = self.validate() {
            error_logging::log_config_error(&e, "app_config", "validate");
            return Err(e);
        }
        Ok(self)
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: rows={}, scale={}, scales={:?}, workers={}, name_languages={}, digit_languages={}, model={}, catalog={}, stock={}",
            self.grid.rows,
            self.grid.scale,
            self.retry.scale_candidates,
            self.pipeline.max_concurrent_tiles,
            self.ocr.name_pass.languages,
            self.ocr.digit_pass.languages,
            self.ocr.model_type.tessdata_dir(),
            self.catalog_path.as_deref().unwrap_or("<embedded>"),
            self.stock_path
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            grid: GridParams::default(),
            fixed_bottom: DEFAULT_BOTTOM,
            matcher: MatcherConfig::default(),
            retry: RetryConfig::default(),
            preprocess: PreprocessConfig::default(),
            pipeline: PipelineConfig::default(),
            ocr: OcrConfig::default(),
            observability: ObservabilityConfig::default(),
            catalog_path: None,
            stock_path: "stock.json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fixed_bottom, config.grid.bottom());
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_matcher_config_validation() {
        let mut config = MatcherConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.stopwords.iter().any(|s| s == "とくせん"));

        config.auto_apply_distance_max = 5;
        assert!(config.validate().is_err());
        config.auto_apply_distance_max = 1;

        config.auto_confirm_quantity_min = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_scales() {
        assert_eq!(
            RetryConfig::parse_scales("2, 3.5").unwrap(),
            vec![2.0, 3.5]
        );
        assert!(RetryConfig::parse_scales("2,abc").is_err());

        let config = RetryConfig {
            scale_candidates: vec![],
        };
        assert!(config.validate().is_err());
        let config = RetryConfig {
            scale_candidates: vec![0.5],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_preprocess_and_pipeline_validation() {
        let mut preprocess = PreprocessConfig::default();
        assert!(preprocess.validate().is_ok());
        preprocess.min_scale = 5.0;
        assert!(preprocess.validate().is_err());
        preprocess.min_scale = 1.0;
        preprocess.threshold = 300.0;
        assert!(preprocess.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        assert!(pipeline.validate().is_ok());
        pipeline.max_concurrent_tiles = 0;
        assert!(pipeline.validate().is_err());
        pipeline.max_concurrent_tiles = 2;
        pipeline.undo_window = Duration::ZERO;
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_summary_mentions_sections() {
        let summary = AppConfig::default().summary();
        assert!(summary.contains("rows=4"));
        assert!(summary.contains("<embedded>"));
        assert!(summary.contains("tessdata_fast"));
    }

    #[test]
    fn test_into_validated() {
        let config = AppConfig::default().into_validated().expect("valid");
        assert_eq!(config.stock_path, "stock.json");

        let mut config = AppConfig::default();
        config.pipeline.max_concurrent_tiles = 0;
        let err = config.into_validated().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
