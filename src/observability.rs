//! Observability module for tracing and metrics setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and format
//! - Metrics recording helpers for the grid OCR pipeline
//! - Span constructors for batch processing
//!
//! No metrics exporter is installed here; the embedding application chooses
//! the recorder. Without one, the `metrics` macros are no-ops.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize structured logging with tracing and configuration
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("stock_grid={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    match config.effective_format() {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .try_init()?;
        }
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Create a span for one grid OCR batch
///
/// `tiles` is recorded once the layout is known.
pub fn batch_span(source: &str, scale: f32) -> tracing::Span {
    tracing::info_span!(
        "grid_ocr_batch",
        source = source,
        tiles = tracing::field::Empty,
        scale = scale,
        component = "ocr"
    )
}

/// Metric recording for the grid OCR pipeline.
///
/// A disabled handle records nothing, so `ENABLE_METRICS=false` keeps the
/// pipeline silent even when the embedding application installed a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineMetrics {
    enabled: bool,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PipelineMetrics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::new(config.enable_metrics)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the outcome of a batch: `completed`, `nothing_detected`, `no_image` or `failed`
    pub fn record_batch_outcome(&self, outcome: &'static str, duration: Duration) {
        if !self.enabled {
            return;
        }
        metrics::counter!("grid_ocr_batches_total", "outcome" => outcome).increment(1);
        metrics::histogram!("grid_ocr_batch_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record per-bucket tile counts after reconciliation
    pub fn record_tile_buckets(&self, auto_applied: usize, needs_confirmation: usize, discarded: usize) {
        if !self.enabled {
            return;
        }
        metrics::counter!("grid_ocr_tiles_total", "bucket" => "auto_apply")
            .increment(auto_applied as u64);
        metrics::counter!("grid_ocr_tiles_total", "bucket" => "needs_confirmation")
            .increment(needs_confirmation as u64);
        metrics::counter!("grid_ocr_tiles_total", "bucket" => "discarded")
            .increment(discarded as u64);
    }

    /// Record the recognition time of a single tile
    pub fn record_tile_duration(&self, duration: Duration) {
        if self.enabled {
            metrics::histogram!("grid_ocr_tile_duration_seconds").record(duration.as_secs_f64());
        }
    }

    /// Record a recognition attempt beyond the first scale
    pub fn record_retry_attempt(&self) {
        if self.enabled {
            metrics::counter!("grid_ocr_retry_attempts_total").increment(1);
        }
    }

    /// Record an image cache lookup
    pub fn record_image_cache(&self, hit: bool) {
        if self.enabled {
            metrics::counter!("grid_ocr_image_cache_total", "result" => if hit { "hit" } else { "miss" })
                .increment(1);
        }
    }
}
