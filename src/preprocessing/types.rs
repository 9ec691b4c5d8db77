//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types and errors used across
//! the preprocessing sub-modules.

use image::{GrayImage, RgbImage};
use serde::Serialize;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// The source could not be read (missing file, network failure)
    ImageLoad { source_name: String, message: String },
    /// The source bytes are not a decodable image
    Decode { source_name: String, message: String },
    /// A crop region reaches outside the canvas
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::ImageLoad {
                source_name,
                message,
            } => write!(f, "Failed to load image '{}': {}", source_name, message),
            PreprocessingError::Decode {
                source_name,
                message,
            } => write!(f, "Failed to decode image '{}': {}", source_name, message),
            PreprocessingError::OutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(
                f,
                "Crop region {}x{} at ({}, {}) is outside the canvas",
                width, height, x, y
            ),
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Binarized canvas ready for tile extraction.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// Black/white canvas at `effective_scale`
    pub image: GrayImage,
    /// Scale actually applied; may be below `requested_scale` because of the pixel budget
    pub effective_scale: f32,
    /// Scale the caller asked for
    pub requested_scale: f32,
    /// Dimensions of the decoded source (width, height)
    pub source_dimensions: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

impl PreprocessedImage {
    /// Map a source-space rectangle onto this canvas
    pub fn scaled_region(&self, x: i32, y: i32, width: i32, height: i32) -> (u32, u32, u32, u32) {
        let scale = self.effective_scale;
        let map = |v: i32| (v as f32 * scale).round().max(0.0) as u32;
        (map(x), map(y), map(width), map(height))
    }
}

/// Small smoothed preview of a tile for the confirmation surface.
#[derive(Debug, Clone, Serialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub image: RgbImage,
}
