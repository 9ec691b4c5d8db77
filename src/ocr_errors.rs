//! # OCR Error Types Module
//!
//! This module defines the error taxonomy of the grid OCR pipeline.
//!
//! Only [`OcrError::NoImage`], [`OcrError::ImageLoad`] and
//! [`OcrError::EngineUnavailable`] abort a batch. Weak recognition results are
//! never errors: they are routed to confirmation or discarded by the
//! reconciliation step.

/// Custom error types for grid OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// A run was requested before any image was selected
    NoImage,
    /// The source image could not be read or decoded
    ImageLoad {
        /// Human readable identification of the source (file name, URL, blob name)
        source_name: String,
        /// Underlying decoder or I/O message
        message: String,
    },
    /// The recognition engine failed to initialize
    EngineUnavailable(String),
    /// A single recognition request failed
    Extraction(String),
    /// A recognition request exceeded the configured timeout
    Timeout(String),
    /// Another batch is already running
    Busy,
    /// Tile extraction or binarization failed
    Preprocessing(String),
    /// A confirmation action was issued with no pending confirmation payload
    NothingToConfirm,
    /// Invalid parameters supplied by the caller
    Validation(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::NoImage => write!(f, "[NO_IMAGE] No image has been selected"),
            OcrError::ImageLoad {
                source_name,
                message,
            } => write!(
                f,
                "[IMAGE_LOAD] Failed to load image '{}': {}",
                source_name, message
            ),
            OcrError::EngineUnavailable(msg) => {
                write!(f, "[OCR_INIT] Recognition engine unavailable: {}", msg)
            }
            OcrError::Extraction(msg) => {
                write!(f, "[OCR_EXTRACT] Text recognition failed: {}", msg)
            }
            OcrError::Timeout(msg) => write!(f, "[OCR_TIMEOUT] Recognition timed out: {}", msg),
            OcrError::Busy => write!(f, "[BUSY] A grid OCR batch is already running"),
            OcrError::Preprocessing(msg) => {
                write!(f, "[PREPROCESS] Image preprocessing failed: {}", msg)
            }
            OcrError::NothingToConfirm => {
                write!(f, "[CONFIRM] No confirmation is pending")
            }
            OcrError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
        }
    }
}

impl std::error::Error for OcrError {}

impl OcrError {
    /// Whether this error aborts the whole batch (as opposed to a single tile)
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(
            self,
            OcrError::NoImage
                | OcrError::ImageLoad { .. }
                | OcrError::EngineUnavailable(_)
                | OcrError::Busy
        )
    }
}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Extraction(err.to_string())
    }
}

impl From<crate::preprocessing::PreprocessingError> for OcrError {
    fn from(err: crate::preprocessing::PreprocessingError) -> Self {
        use crate::preprocessing::PreprocessingError;
        match err {
            PreprocessingError::ImageLoad {
                source_name,
                message,
            }
            | PreprocessingError::Decode {
                source_name,
                message,
            } => OcrError::ImageLoad {
                source_name,
                message,
            },
            other => OcrError::Preprocessing(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::PreprocessingError;

    #[test]
    fn test_display_tags_distinguish_failures() {
        assert!(OcrError::NoImage.to_string().starts_with("[NO_IMAGE]"));
        assert!(OcrError::EngineUnavailable("x".into())
            .to_string()
            .starts_with("[OCR_INIT]"));
        let load = OcrError::ImageLoad {
            source_name: "inv.png".into(),
            message: "bad header".into(),
        };
        assert!(load.to_string().contains("inv.png"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(OcrError::NoImage.is_fatal_for_batch());
        assert!(OcrError::EngineUnavailable("down".into()).is_fatal_for_batch());
        assert!(!OcrError::Timeout("slow".into()).is_fatal_for_batch());
        assert!(!OcrError::Extraction("garbled".into()).is_fatal_for_batch());
    }

    #[test]
    fn test_decode_error_maps_to_image_load() {
        let err: OcrError = PreprocessingError::Decode {
            source_name: "shot.jpg".into(),
            message: "truncated".into(),
        }
        .into();
        assert!(matches!(err, OcrError::ImageLoad { ref source_name, .. } if source_name == "shot.jpg"));

        let err: OcrError = PreprocessingError::OutOfBounds {
            x: 10,
            y: 10,
            width: 5,
            height: 5,
        }
        .into();
        assert!(matches!(err, OcrError::Preprocessing(_)));
    }
}
