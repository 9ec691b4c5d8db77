//! # Image Preprocessing Module
//!
//! This module turns a screenshot into recognition-ready tiles.
//!
//! The module is organized into focused sub-modules:
//! - `loader`: Reading and decoding sources with a signature-keyed cache
//! - `thresholding`: Pixel-budgeted scaling and gain-adjusted binarization
//! - `cropping`: Tile extraction with nearest-neighbour upsampling, thumbnails
//! - `types`: Shared types and error definitions

pub mod cropping;
pub mod loader;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{PreprocessedImage, PreprocessingError, Thumbnail};

pub use cropping::{extra_upsample_factor, extract_grid_tile, extract_tile, make_thumbnail};
pub use loader::{ImageLoader, ImageSource};
pub use thresholding::{binarize, effective_scale};
