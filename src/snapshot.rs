//! # Snapshot and Undo
//!
//! A batch overwrites stock in bulk, so the quantities of every catalog
//! ingredient are captured before it starts. Once the batch completes the
//! snapshot can be restored exactly once, within a bounded window.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::stock::{StockStore, StockWrite};

/// Stock quantities captured before a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    entries: Vec<StockWrite>,
    taken_at: DateTime<Utc>,
}

impl StockSnapshot {
    /// Record the current quantity of every catalog ingredient
    pub fn capture(stock: &StockStore, catalog: &Catalog) -> Self {
        let entries = stock.quantities(catalog.names());
        debug!(entries = entries.len(), "Captured stock snapshot");
        Self {
            entries,
            taken_at: Utc::now(),
        }
    }

    pub fn entries(&self) -> &[StockWrite] {
        &self.entries
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Overwrite stock with the captured values; returns how many entries changed
    pub fn restore(&self, stock: &StockStore) -> usize {
        stock.apply(&self.entries).len()
    }
}

#[derive(Debug)]
struct Slot {
    snapshot: StockSnapshot,
    generation: u64,
    /// `None` while the batch is still running
    expires_at: Option<Instant>,
}

/// Holds at most one live snapshot and grants a single undo
#[derive(Debug, Default)]
pub struct UndoManager {
    slot: Mutex<Option<Slot>>,
    generation: Mutex<u64>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `snapshot` for the batch about to start.
    ///
    /// Any previous snapshot is discarded; returns whether one was still
    /// undoable.
    pub fn capture(&self, snapshot: StockSnapshot) -> bool {
        let generation = {
            let mut generation = self.generation.lock();
            *generation += 1;
            *generation
        };
        let previous = self.slot.lock().replace(Slot {
            snapshot,
            generation,
            expires_at: None,
        });
        previous.is_some_and(|slot| Self::slot_available(&slot, Instant::now()))
    }

    /// Open (or reopen) the undo window; returns the generation to pass to [`Self::expire`]
    pub fn arm(&self, window: Duration) -> Option<u64> {
        let mut slot = self.slot.lock();
        let slot = slot.as_mut()?;
        slot.expires_at = Some(Instant::now() + window);
        Some(slot.generation)
    }

    /// Drop the snapshot of `generation` if its window has elapsed.
    ///
    /// Returns `true` when it was dropped by this call.
    pub fn expire(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        let elapsed = slot.as_ref().is_some_and(|s| {
            s.generation == generation && s.expires_at.is_some_and(|at| at <= Instant::now())
        });
        if elapsed {
            *slot = None;
            debug!(generation, "Undo window elapsed");
        }
        elapsed
    }

    /// Drop the snapshot unconditionally (failed batch)
    pub fn discard(&self) {
        if self.slot.lock().take().is_some() {
            debug!("Discarded stock snapshot");
        }
    }

    /// Whether an undo is currently possible
    pub fn is_available(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|slot| Self::slot_available(slot, Instant::now()))
    }

    /// Whether a snapshot is held, armed or not
    pub fn is_held(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn slot_available(slot: &Slot, now: Instant) -> bool {
        slot.expires_at.is_some_and(|at| now < at)
    }

    /// Restore the snapshot into `stock` and consume it.
    ///
    /// Returns the number of changed entries, or `None` when no undo is
    /// available (never armed, already used, or expired).
    pub fn undo(&self, stock: &StockStore) -> Option<usize> {
        let slot = {
            let mut guard = self.slot.lock();
            match guard.as_ref() {
                Some(slot) if Self::slot_available(slot, Instant::now()) => guard.take(),
                Some(slot) if slot.expires_at.is_some() => {
                    // Window elapsed before the timer fired
                    *guard = None;
                    None
                }
                _ => None,
            }
        }?;

        let restored = slot.snapshot.restore(stock);
        info!(
            restored,
            captured_at = %slot.snapshot.taken_at(),
            "Restored stock snapshot"
        );
        Some(restored)
    }
}
