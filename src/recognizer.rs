//! # Tile Recognition Module
//!
//! Thin adapter over the text recognition engine. Every tile is read twice:
//! once with a configuration tuned for ingredient names and once tuned for
//! digits and multiplier glyphs. The two requests are independent and run
//! concurrently.
//!
//! A failed or slow request is not an error for the batch: it yields empty
//! text and the tile is routed by the reconciliation step like any other weak
//! result. Only engine unavailability propagates.

use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::instance_manager::OcrInstanceManager;
use crate::ocr_config::{OcrConfig, PassConfig};
use crate::ocr_errors::OcrError;

/// Which of the two recognition passes a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionPass {
    /// Target script characters, digits and Latin letters suppressed
    Name,
    /// Digits and multiplier glyphs only
    Digit,
}

impl RecognitionPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionPass::Name => "name",
            RecognitionPass::Digit => "digit",
        }
    }
}

/// Black-box text recognition capability.
///
/// Calls are blocking; the recognizer runs them on the blocking thread pool.
pub trait RecognitionEngine: Send + Sync + 'static {
    /// Initialize the engine if needed.
    ///
    /// Must return [`OcrError::EngineUnavailable`] when the engine cannot be
    /// loaded.
    fn ensure_ready(&self) -> Result<(), OcrError>;

    /// Recognize the text of one tile for the given pass
    fn recognize(&self, pass: RecognitionPass, tile: &GrayImage) -> Result<String, OcrError>;
}

/// Tesseract-backed engine with one reused instance per pass
pub struct TesseractEngine {
    config: OcrConfig,
    instances: OcrInstanceManager,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            instances: OcrInstanceManager::new(),
        }
    }

    fn pass_config(&self, pass: RecognitionPass) -> &PassConfig {
        match pass {
            RecognitionPass::Name => &self.config.name_pass,
            RecognitionPass::Digit => &self.config.digit_pass,
        }
    }
}

impl RecognitionEngine for TesseractEngine {
    fn ensure_ready(&self) -> Result<(), OcrError> {
        for pass in [RecognitionPass::Name, RecognitionPass::Digit] {
            self.instances
                .get_instance(self.pass_config(pass), self.config.model_type)
                .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn recognize(&self, pass: RecognitionPass, tile: &GrayImage) -> Result<String, OcrError> {
        let pass_config = self.pass_config(pass);
        let instance = self
            .instances
            .get_instance(pass_config, self.config.model_type)
            .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;

        let mut encoded = Cursor::new(Vec::new());
        tile.write_to(&mut encoded, ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("failed to encode tile: {}", e)))?;

        let mut tess = instance.lock();
        tess.set_image_from_mem(encoded.get_ref()).map_err(|e| {
            OcrError::Extraction(format!("Failed to load tile for OCR: {e}"))
        })?;
        tess.set_source_resolution(pass_config.dpi_hint as i32);

        let text = tess.get_utf8_text().map_err(|e| {
            OcrError::Extraction(format!("Failed to extract text from tile: {e}"))
        })?;

        Ok(clean_text(&text))
    }
}

/// Trim every line and drop empty ones
fn clean_text(text: &str) -> String {
    text.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Raw text pair for one tile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileText {
    pub name_text: String,
    pub digit_text: String,
}

/// Runs the two recognition passes for a tile
#[derive(Clone)]
pub struct TileRecognizer {
    engine: Arc<dyn RecognitionEngine>,
    timeout: Duration,
}

impl TileRecognizer {
    pub fn new(engine: Arc<dyn RecognitionEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Make sure the engine is loaded before a batch starts
    pub async fn ensure_ready(&self) -> Result<(), OcrError> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.ensure_ready())
            .await
            .map_err(|e| OcrError::EngineUnavailable(format!("initialization task failed: {}", e)))?
    }

    /// Recognize one tile with both passes concurrently.
    ///
    /// # Errors
    ///
    /// Only [`OcrError::EngineUnavailable`] is returned; any other failure of a
    /// pass leaves that pass' text empty.
    pub async fn recognize_tile(&self, tile: GrayImage) -> Result<TileText, OcrError> {
        let tile = Arc::new(tile);
        let (name_text, digit_text) = tokio::join!(
            self.run_pass(RecognitionPass::Name, Arc::clone(&tile)),
            self.run_pass(RecognitionPass::Digit, tile),
        );

        Ok(TileText {
            name_text: name_text?,
            digit_text: digit_text?,
        })
    }

    async fn run_pass(
        &self,
        pass: RecognitionPass,
        tile: Arc<GrayImage>,
    ) -> Result<String, OcrError> {
        let start_time = Instant::now();
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.recognize(pass, &tile));

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(OcrError::Extraction(format!(
                "recognition task failed: {}",
                join_error
            ))),
            Err(_) => Err(OcrError::Timeout(format!(
                "{} pass exceeded {}s",
                pass.as_str(),
                self.timeout.as_secs_f32()
            ))),
        };

        match outcome {
            Ok(text) => {
                debug!(
                    pass = pass.as_str(),
                    chars = text.chars().count(),
                    "Recognized tile in {}ms",
                    start_time.elapsed().as_millis()
                );
                Ok(text)
            }
            Err(OcrError::EngineUnavailable(msg)) => Err(OcrError::EngineUnavailable(msg)),
            Err(e) => {
                warn!(pass = pass.as_str(), error = %e, "Recognition pass yielded no text");
                Ok(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedEngine {
        calls: AtomicUsize,
        fail_digit: bool,
        unavailable: bool,
    }

    impl RecognitionEngine for ScriptedEngine {
        fn ensure_ready(&self) -> Result<(), OcrError> {
            if self.unavailable {
                return Err(OcrError::EngineUnavailable("no traineddata".into()));
            }
            Ok(())
        }

        fn recognize(&self, pass: RecognitionPass, _tile: &GrayImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(OcrError::EngineUnavailable("no traineddata".into()));
            }
            match pass {
                RecognitionPass::Name => Ok("とくせんリンゴ".to_string()),
                RecognitionPass::Digit if self.fail_digit => {
                    Err(OcrError::Extraction("garbled".into()))
                }
                RecognitionPass::Digit => Ok("×12".to_string()),
            }
        }
    }

    fn recognizer(fail_digit: bool, unavailable: bool) -> (TileRecognizer, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine {
            calls: AtomicUsize::new(0),
            fail_digit,
            unavailable,
        });
        let recognizer = TileRecognizer::new(engine.clone(), Duration::from_secs(5));
        (recognizer, engine)
    }

    #[tokio::test]
    async fn test_both_passes_run() {
        let (recognizer, engine) = recognizer(false, false);
        let text = recognizer
            .recognize_tile(GrayImage::new(4, 4))
            .await
            .expect("recognize");
        assert_eq!(text.name_text, "とくせんリンゴ");
        assert_eq!(text.digit_text, "×12");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_pass_yields_empty_text() {
        let (recognizer, _) = recognizer(true, false);
        let text = recognizer
            .recognize_tile(GrayImage::new(4, 4))
            .await
            .expect("recognize");
        assert_eq!(text.name_text, "とくせんリンゴ");
        assert!(text.digit_text.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_engine_propagates() {
        let (recognizer, _) = recognizer(false, true);
        assert!(matches!(
            recognizer.ensure_ready().await,
            Err(OcrError::EngineUnavailable(_))
        ));
        assert!(matches!(
            recognizer.recognize_tile(GrayImage::new(4, 4)).await,
            Err(OcrError::EngineUnavailable(_))
        ));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  リンゴ \n\n  x3 \n"), "リンゴ\nx3");
        assert_eq!(clean_text("\n \n"), "");
    }
}
