//! # Stock Store
//!
//! Ingredient name -> quantity map shared between the pipeline and its
//! consumers, with optional JSON file persistence.

use crate::errors::{error_logging, AppError, AppResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single "set ingredient X to quantity Y" operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWrite {
    pub ingredient: String,
    pub quantity: u32,
}

impl StockWrite {
    pub fn new(ingredient: impl Into<String>, quantity: u32) -> Self {
        Self {
            ingredient: ingredient.into(),
            quantity,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StockFile {
    entries: BTreeMap<String, u32>,
}

/// Thread-safe stock map
#[derive(Debug, Default)]
pub struct StockStore {
    entries: RwLock<BTreeMap<String, u32>>,
    path: Option<PathBuf>,
}

impl StockStore {
    /// Empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted at `path`; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                AppError::Stock(format!("failed to read '{}': {}", path.display(), e))
            })?;
            let file: StockFile = serde_json::from_str(&content).map_err(|e| {
                AppError::Stock(format!("invalid stock file '{}': {}", path.display(), e))
            })?;
            file.entries
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), entries = entries.len(), "Opened stock store");
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    /// Quantity for an ingredient, 0 when unknown
    pub fn get(&self, ingredient: &str) -> u32 {
        self.entries.read().get(ingredient).copied().unwrap_or(0)
    }

    /// Set a quantity, returning the previous value
    pub fn set(&self, ingredient: &str, quantity: u32) -> u32 {
        self.entries
            .write()
            .insert(ingredient.to_string(), quantity)
            .unwrap_or(0)
    }

    /// Apply writes under a single lock; returns the writes that changed a value
    pub fn apply(&self, writes: &[StockWrite]) -> Vec<StockWrite> {
        let mut entries = self.entries.write();
        let mut changed = Vec::new();
        for write in writes {
            let previous = entries
                .insert(write.ingredient.clone(), write.quantity)
                .unwrap_or(0);
            if previous != write.quantity {
                changed.push(write.clone());
            }
        }
        debug!(requested = writes.len(), changed = changed.len(), "Applied stock writes");
        changed
    }

    /// Quantities for the given names, in order
    pub fn quantities<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<StockWrite> {
        let entries = self.entries.read();
        names
            .into_iter()
            .map(|name| StockWrite::new(name, entries.get(name).copied().unwrap_or(0)))
            .collect()
    }

    /// Copy of every stored entry
    pub fn entries(&self) -> BTreeMap<String, u32> {
        self.entries.read().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist to the backing file, if any
    pub fn save(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = StockFile {
            entries: self.entries(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(path, content).map_err(|e| {
            let err = AppError::Stock(format!("failed to write '{}': {}", path.display(), e));
            error_logging::log_stock_error(&err, "save", path.to_str());
            err
        })?;
        debug!(path = %path.display(), "Saved stock store");
        Ok(())
    }
}
