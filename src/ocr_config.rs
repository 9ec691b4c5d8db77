//! # OCR Configuration Module
//!
//! This module defines configuration structures for tile recognition,
//! including the two recognition passes, model selection and timeouts.

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_NAME_LANGUAGES: &str = "jpn";
pub const DEFAULT_DIGIT_LANGUAGES: &str = "eng";
pub const DEFAULT_DPI_HINT: u32 = 300;
pub const DIGIT_PASS_WHITELIST: &str = "0123456789xX×✕";
pub const NAME_PASS_BLACKLIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Recovery configuration for recognition requests
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single recognition request in seconds
    pub operation_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 30, // 30 seconds
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_secs > 600 {
            return Err(AppError::Config(format!(
                "operation_timeout_secs ({}) cannot exceed 600",
                self.operation_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    #[default]
    SingleLine = 7,
    /// Treat the image as a single word
    SingleWord = 8,
    /// Find as much text as possible in no particular order
    SparseText = 11,
    /// Treat the image as a single text line, bypassing hacks that are Tesseract-specific
    RawLine = 13,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SingleWord => "8",
            PageSegMode::SparseText => "11",
            PageSegMode::RawLine => "13",
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }

    /// Parse the `OCR_MODEL_TYPE` environment value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Some(ModelType::Fast),
            "best" => Some(ModelType::Best),
            _ => None,
        }
    }
}

/// Engine parameters for one recognition pass over a tile
#[derive(Debug, Clone, PartialEq)]
pub struct PassConfig {
    /// OCR language codes (e.g., "jpn", "eng")
    pub languages: String,
    /// Page segmentation mode
    pub psm_mode: PageSegMode,
    /// Characters the engine may emit, if restricted
    pub character_whitelist: Option<String>,
    /// Characters the engine must not emit, if restricted
    pub character_blacklist: Option<String>,
    /// Resolution hint passed to the engine
    pub dpi_hint: u32,
    /// Bias the classifier towards digits
    pub numeric_mode: bool,
    /// Keep spaces between words in the output
    pub preserve_interword_spaces: bool,
}

impl PassConfig {
    /// Name pass: target script only, digits and Latin letters suppressed
    pub fn name_pass() -> Self {
        Self {
            languages: DEFAULT_NAME_LANGUAGES.to_string(),
            psm_mode: PageSegMode::SingleLine,
            character_whitelist: None,
            character_blacklist: Some(NAME_PASS_BLACKLIST.to_string()),
            dpi_hint: DEFAULT_DPI_HINT,
            numeric_mode: false,
            preserve_interword_spaces: true,
        }
    }

    /// Digit pass: digits and multiplier glyphs only
    pub fn digit_pass() -> Self {
        Self {
            languages: DEFAULT_DIGIT_LANGUAGES.to_string(),
            psm_mode: PageSegMode::SingleLine,
            character_whitelist: Some(DIGIT_PASS_WHITELIST.to_string()),
            character_blacklist: None,
            dpi_hint: DEFAULT_DPI_HINT,
            numeric_mode: true,
            preserve_interword_spaces: true,
        }
    }

    /// Validate pass parameters
    pub fn validate(&self, pass: &str) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config(format!(
                "{} pass languages cannot be empty",
                pass
            )));
        }
        if self.dpi_hint < 70 || self.dpi_hint > 2400 {
            return Err(AppError::Config(format!(
                "{} pass dpi_hint ({}) must be between 70 and 2400",
                pass, self.dpi_hint
            )));
        }
        if let Some(whitelist) = &self.character_whitelist {
            if whitelist.is_empty() {
                return Err(AppError::Config(format!(
                    "{} pass whitelist cannot be empty when set",
                    pass
                )));
            }
        }
        Ok(())
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Parameters for the ingredient-name pass
    pub name_pass: PassConfig,
    /// Parameters for the quantity pass
    pub digit_pass: PassConfig,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            name_pass: PassConfig::name_pass(),
            digit_pass: PassConfig::digit_pass(),
            model_type: ModelType::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        self.name_pass.validate("name")?;
        self.digit_pass.validate("digit")?;
        self.recovery.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_passes() {
        let config = OcrConfig::default();
        assert_eq!(config.name_pass.languages, "jpn");
        assert_eq!(config.digit_pass.languages, "eng");
        assert_eq!(config.name_pass.psm_mode.as_str(), "7");
        assert!(config.digit_pass.numeric_mode);
        assert!(!config.name_pass.numeric_mode);

        let whitelist = config
            .digit_pass
            .character_whitelist
            .as_deref()
            .unwrap_or_default();
        assert!(whitelist.contains('×'));
        assert!(whitelist.contains('✕'));

        let blacklist = config
            .name_pass
            .character_blacklist
            .as_deref()
            .unwrap_or_default();
        assert!(blacklist.contains('7'));
        assert!(blacklist.contains('x'));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_validation() {
        let mut config = OcrConfig::default();

        config.name_pass.languages = "  ".to_string();
        assert!(config.validate().is_err());
        config.name_pass.languages = "jpn".to_string();

        config.digit_pass.dpi_hint = 10;
        assert!(config.validate().is_err());
        config.digit_pass.dpi_hint = 300;

        config.recovery.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.recovery.operation_timeout_secs = 30;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_type() {
        assert_eq!(ModelType::default(), ModelType::Fast);
        assert_eq!(ModelType::Best.tessdata_dir(), "tessdata_best");
        assert_eq!(ModelType::parse("BEST"), Some(ModelType::Best));
        assert_eq!(ModelType::parse("medium"), None);
    }
}
