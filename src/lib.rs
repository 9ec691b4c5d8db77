//! # Stock Grid
//!
//! Reads a photographed in-game inventory grid and turns it into ingredient
//! stock updates: grid geometry, image preprocessing and tiling, dual-pass
//! text recognition per tile, fuzzy ingredient matching, reconciliation into
//! auto-applied writes or confirmation rows, and single-level undo.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod geometry;
pub mod instance_manager;
pub mod matcher;
pub mod observability;
pub mod observability_config;
pub mod ocr_config;
pub mod ocr_errors;
pub mod pipeline;
pub mod preprocessing;
pub mod recognizer;
pub mod reconcile;
pub mod snapshot;
pub mod stock;

// Re-export types for easier access
pub use pipeline::{GridOcrPipeline, GridPreview, PipelineEvent, RunReport, RunStatus};
pub use reconcile::{ConfirmationRow, RowResolution};
