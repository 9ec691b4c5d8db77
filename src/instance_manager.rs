//! # OCR Instance Manager Module
//!
//! This module keeps one Tesseract instance per recognition pass configuration
//! so the engine is initialized lazily, once, and reused for every tile.

use leptess::{LepTess, Variable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::{ModelType, PassConfig};

/// Thread-safe pool of Tesseract instances keyed by pass configuration
///
/// The name pass and the digit pass need different variables (character lists,
/// numeric mode), so each gets its own instance. Instances are created on the
/// first request and persist until removed or the manager is dropped.
///
/// Each instance sits behind its own mutex: Tesseract is not reentrant, so
/// concurrent tiles serialize on an instance while the two passes of one tile
/// run side by side.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create an empty manager; instances are built on demand
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn instance_key(pass: &PassConfig, model_type: ModelType) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            pass.languages,
            model_type.tessdata_dir(),
            pass.psm_mode.as_str(),
            pass.character_whitelist.as_deref().unwrap_or_default(),
            pass.character_blacklist.as_deref().unwrap_or_default(),
            pass.numeric_mode
        )
    }

    /// Get or create the instance for a recognition pass
    ///
    /// # Errors
    ///
    /// Returns an error if Tesseract cannot be initialized for the pass'
    /// languages or rejects one of its variables
    pub fn get_instance(
        &self,
        pass: &PassConfig,
        model_type: ModelType,
    ) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = Self::instance_key(pass, model_type);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            "Creating new OCR instance for languages: {} with model: {}",
            pass.languages,
            model_type.tessdata_dir()
        );

        let tessdata_path = Self::get_tessdata_path(model_type);
        let mut tess = LepTess::new(tessdata_path.as_deref(), &pass.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        Self::configure(&mut tess, pass)?;

        let instance = Arc::new(Mutex::new(tess));
        // Another worker may have raced us here; keep whichever landed first
        let mut instances = self.instances.lock();
        let stored = instances.entry(key).or_insert_with(|| Arc::clone(&instance));
        Ok(Arc::clone(stored))
    }

    fn configure(tess: &mut LepTess, pass: &PassConfig) -> anyhow::Result<()> {
        let mut set = |variable: Variable, value: &str, label: &str| {
            tess.set_variable(variable, value)
                .map_err(|e| anyhow::anyhow!("Failed to set {}: {}", label, e))
        };

        set(
            Variable::TesseditPagesegMode,
            pass.psm_mode.as_str(),
            "PSM mode",
        )?;
        set(
            Variable::UserDefinedDpi,
            &pass.dpi_hint.to_string(),
            "DPI hint",
        )?;
        set(
            Variable::PreserveInterwordSpaces,
            if pass.preserve_interword_spaces { "1" } else { "0" },
            "interword spaces",
        )?;
        set(
            Variable::ClassifyBlnNumericMode,
            if pass.numeric_mode { "1" } else { "0" },
            "numeric mode",
        )?;

        if let Some(whitelist) = &pass.character_whitelist {
            set(
                Variable::TesseditCharWhitelist,
                whitelist,
                "character whitelist",
            )?;
            info!(
                "Configured Tesseract with character whitelist: {} characters",
                whitelist.chars().count()
            );
        }

        if let Some(blacklist) = &pass.character_blacklist {
            set(
                Variable::TesseditCharBlacklist,
                blacklist,
                "character blacklist",
            )?;
            info!(
                "Configured Tesseract with character blacklist: {} characters",
                blacklist.chars().count()
            );
        }

        Ok(())
    }

    /// Get the tessdata path for the specified model type
    ///
    /// Falls back to Tesseract's default lookup when no model-specific
    /// directory is installed.
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        let possible_paths: &[&str] = match model_type {
            ModelType::Fast => &[
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => &[
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        if let Some(path) = possible_paths
            .iter()
            .find(|path| std::path::Path::new(path).exists())
        {
            info!("Using tessdata path: {}", path);
            return Some(path.to_string());
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Drop every instance, forcing re-initialization on next use
    pub fn clear_all_instances(&self) {
        let mut instances = self.instances.lock();
        let count = instances.len();
        instances.clear();
        if count > 0 {
            info!("Cleared {count} OCR instances");
        }
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_get_distinct_keys() {
        let name = OcrInstanceManager::instance_key(&PassConfig::name_pass(), ModelType::Fast);
        let digit = OcrInstanceManager::instance_key(&PassConfig::digit_pass(), ModelType::Fast);
        assert_ne!(name, digit);

        let best = OcrInstanceManager::instance_key(&PassConfig::name_pass(), ModelType::Best);
        assert_ne!(name, best);
        assert_eq!(
            name,
            OcrInstanceManager::instance_key(&PassConfig::name_pass(), ModelType::Fast)
        );
    }

    #[test]
    fn test_new_manager_is_empty() {
        let manager = OcrInstanceManager::new();
        assert_eq!(manager.instance_count(), 0);
        manager.clear_all_instances();
        assert_eq!(manager.instance_count(), 0);
    }
}
