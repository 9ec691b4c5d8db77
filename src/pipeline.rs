//! # Grid OCR Pipeline
//!
//! Orchestrates one screenshot through the whole ingestion path:
//!
//! ```text
//! image -> grid layout -> binarized canvas -> tiles -> (name, digit) text
//!       -> ingredient + quantity -> reconciliation -> stock writes / confirmation
//! ```
//!
//! The caller drives the pipeline through explicit entry points
//! ([`GridOcrPipeline::on_image_selected`], [`GridOcrPipeline::on_grid_params_changed`],
//! [`GridOcrPipeline::on_run_requested`], ...) and observes it through
//! [`PipelineEvent`]s. Only one batch runs at a time. Tiles are recognized by a
//! small worker pool; stock is written once, after every tile is done, and the
//! pre-batch stock can be restored by a single undo within a bounded window.

use image::DynamicImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::catalog::Catalog;
use crate::config::{AppConfig, MatcherConfig, PreprocessConfig};
use crate::errors::{error_logging, AppResult};
use crate::geometry::{
    clamp_to_image, effective_column_count, tile_layout, ClampRange, DeclaredBounds, GridParams,
    TileRect,
};
use crate::matcher::{analyze_tile, build_index, KeywordIndex};
use crate::observability::{self, PipelineMetrics};
use crate::ocr_errors::OcrError;
use crate::preprocessing::{
    binarize, extract_grid_tile, make_thumbnail, ImageLoader, ImageSource, PreprocessedImage,
    Thumbnail,
};
use crate::recognizer::{RecognitionEngine, TileRecognizer};
use crate::reconcile::{
    reconcile, resolve_confirmations, ConfirmationRow, Reconciliation, RecognitionResult,
    RowResolution,
};
use crate::snapshot::{StockSnapshot, UndoManager};
use crate::stock::{StockStore, StockWrite};

const EVENT_CAPACITY: usize = 64;

/// Where the current batch is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Capturing,
    Recognizing,
    Reconciling,
    AutoApplied,
    AwaitingConfirmation,
}

/// User-facing outcome of a run request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    NoImage,
    NothingDetected,
    Completed {
        tiles: usize,
        auto_applied: usize,
        awaiting_confirmation: usize,
    },
    Failed {
        message: String,
    },
}

impl RunStatus {
    /// Short status line for display
    pub fn message(&self) -> &'static str {
        match self {
            RunStatus::NoImage => "no image selected",
            RunStatus::NothingDetected => "nothing detected",
            RunStatus::Completed { .. } => "recognition complete",
            RunStatus::Failed { .. } => "an error occurred",
        }
    }
}

/// Notifications for whatever renders stock and the undo affordance
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Stock entries whose value changed
    StockUpdated(Vec<StockWrite>),
    /// Whether an undo is currently possible
    SnapshotAvailable(bool),
    /// The snapshot was restored; `restored` entries changed
    UndoConsumed { restored: usize },
    Progress { done: usize, total: usize },
    Status(RunStatus),
}

/// Layout of the grid over the selected image
#[derive(Debug, Clone, Serialize)]
pub struct GridPreview {
    pub image_width: u32,
    pub image_height: u32,
    /// Parameters after clamping to the image
    pub params: GridParams,
    pub gap_range: ClampRange,
    pub offset_range: ClampRange,
    pub effective_columns: i32,
    /// Row-major cells fully inside the image
    pub tiles: Vec<TileRect>,
    pub thumbnails: Vec<Thumbnail>,
}

/// Everything a completed run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub status: RunStatus,
    pub params: GridParams,
    pub effective_scale: f32,
    /// Kept attempt of every recognized tile, in row-major order
    pub results: Vec<RecognitionResult>,
    pub reconciliation: Reconciliation,
    pub duration_ms: u64,
}

impl RunReport {
    /// One line per tile: `#i rRcC [name xQ] name="..." num="..."`
    pub fn debug_lines(&self, catalog: &Catalog) -> Vec<String> {
        self.results
            .iter()
            .map(|result| {
                let name = result
                    .ingredient_id()
                    .and_then(|id| catalog.get(id))
                    .map_or("?", |ingredient| ingredient.name.as_str());
                format!(
                    "#{} r{}c{} [{} x{}] name=\"{}\" num=\"{}\"",
                    result.tile.index,
                    result.tile.row,
                    result.tile.col,
                    name,
                    result.quantity,
                    result.raw_name_text.replace('\n', " "),
                    result.raw_digit_text.replace('\n', " ")
                )
            })
            .collect()
    }
}

struct Session {
    source: Option<ImageSource>,
    params: GridParams,
    pending: Vec<ConfirmationRow>,
    state: BatchState,
}

/// Clears the running flag when the batch ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared, read-only state of one batch plus the worker pool's counters
struct BatchContext {
    image: Arc<DynamicImage>,
    canvas: Arc<PreprocessedImage>,
    tiles: Vec<TileRect>,
    scales: Vec<f32>,
    recognizer: TileRecognizer,
    index: Arc<KeywordIndex>,
    matcher: MatcherConfig,
    preprocess: PreprocessConfig,
    metrics: PipelineMetrics,
    next: AtomicUsize,
    done: AtomicUsize,
    abort: AtomicBool,
    events: broadcast::Sender<PipelineEvent>,
}

/// Grid OCR ingestion pipeline
pub struct GridOcrPipeline {
    config: AppConfig,
    catalog: Arc<Catalog>,
    index: Arc<KeywordIndex>,
    stock: Arc<StockStore>,
    loader: ImageLoader,
    recognizer: TileRecognizer,
    undo: Arc<UndoManager>,
    running: AtomicBool,
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<PipelineEvent>,
    metrics: PipelineMetrics,
}

impl GridOcrPipeline {
    /// Build a pipeline; the keyword index is derived from `catalog` once here.
    pub fn new(
        config: AppConfig,
        catalog: Catalog,
        stock: Arc<StockStore>,
        engine: Arc<dyn RecognitionEngine>,
    ) -> AppResult<Self> {
        config.validate()?;

        let index = build_index(catalog.ingredients(), &config.matcher.stopwords);
        info!(
            ingredients = index.ingredient_count(),
            keywords = index.keyword_count(),
            "Built keyword index"
        );

        let timeout = Duration::from_secs(config.ocr.recovery.operation_timeout_secs);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let params = config.grid.with_rows(config.grid.rows, config.fixed_bottom);
        let metrics = PipelineMetrics::from_config(&config.observability);

        Ok(Self {
            catalog: Arc::new(catalog),
            index: Arc::new(index),
            stock,
            loader: ImageLoader::with_metrics(metrics),
            recognizer: TileRecognizer::new(engine, timeout),
            undo: Arc::new(UndoManager::new()),
            running: AtomicBool::new(false),
            session: Arc::new(Mutex::new(Session {
                source: None,
                params,
                pending: Vec::new(),
                state: BatchState::Idle,
            })),
            events,
            metrics,
            config,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stock(&self) -> &StockStore {
        &self.stock
    }

    pub fn params(&self) -> GridParams {
        self.session.lock().params
    }

    pub fn batch_state(&self) -> BatchState {
        self.session.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn pending_confirmations(&self) -> Vec<ConfirmationRow> {
        self.session.lock().pending.clone()
    }

    pub fn undo_available(&self) -> bool {
        self.undo.is_available()
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: BatchState) {
        self.session.lock().state = state;
    }

    /// Select a screenshot and lay the current grid over it
    pub async fn on_image_selected(&self, source: ImageSource) -> Result<GridPreview, OcrError> {
        let image = self.load_image(&source).await?;
        let params = self.params();
        let preview = self.build_preview(&image, &params);

        {
            let mut session = self.session.lock();
            session.source = Some(source.clone());
            session.params = preview.params;
        }

        info!(
            source = %source.display_name(),
            width = preview.image_width,
            height = preview.image_height,
            tiles = preview.tiles.len(),
            "Image selected"
        );
        Ok(preview)
    }

    /// Adopt new grid parameters; rows are clamped and the top re-anchored to the bottom.
    ///
    /// The parameters are stored even without an image, in which case
    /// `OcrError::NoImage` is returned instead of a preview.
    pub async fn on_grid_params_changed(
        &self,
        params: GridParams,
    ) -> Result<GridPreview, OcrError> {
        let params = params.with_rows(params.rows, self.config.fixed_bottom);
        params
            .validate()
            .map_err(|e| OcrError::Validation(e.to_string()))?;

        let source = {
            let mut session = self.session.lock();
            session.params = params;
            session.source.clone()
        };
        let Some(source) = source else {
            return Err(OcrError::NoImage);
        };

        let image = self.load_image(&source).await?;
        let preview = self.build_preview(&image, &params);
        self.session.lock().params = preview.params;
        debug!(
            gap_x = preview.params.gap_x,
            y_offset = preview.params.y_offset,
            rows = preview.params.rows,
            "Grid parameters updated"
        );
        Ok(preview)
    }

    async fn load_image(&self, source: &ImageSource) -> Result<Arc<DynamicImage>, OcrError> {
        self.loader.load(source).await.map_err(|e| {
            let err = OcrError::from(e);
            error_logging::log_ocr_error(
                &err,
                "load_image",
                Some(source.display_name().as_str()),
                None,
                None,
            );
            err
        })
    }

    fn build_preview(&self, image: &DynamicImage, params: &GridParams) -> GridPreview {
        let (width, height) = (image.width(), image.height());
        let (params, gap_range, offset_range) = clamp_to_image(
            width,
            height,
            params,
            self.config.fixed_bottom,
            DeclaredBounds::default(),
        );
        let tiles = tile_layout(width, height, &params);
        let thumbnails = tiles
            .iter()
            .filter_map(|rect| match make_thumbnail(image, rect, &self.config.preprocess) {
                Ok(thumbnail) => Some(thumbnail),
                Err(e) => {
                    warn!(tile = rect.index, error = %e, "Thumbnail skipped");
                    None
                }
            })
            .collect();

        GridPreview {
            image_width: width,
            image_height: height,
            effective_columns: effective_column_count(width, &params),
            params,
            gap_range,
            offset_range,
            tiles,
            thumbnails,
        }
    }

    /// Drop every cached decoded image
    pub fn clear_image_cache(&self) {
        self.loader.clear();
        info!("Cleared image cache");
    }

    /// Drop the cached decode of one source
    pub async fn forget_image(&self, source: &ImageSource) -> bool {
        self.loader.forget(source).await
    }

    /// Run one batch over the selected image.
    ///
    /// # Errors
    ///
    /// - `OcrError::Busy` if a batch is already running
    /// - `OcrError::NoImage` if no image was selected
    /// - `OcrError::ImageLoad` / `OcrError::EngineUnavailable` abort the batch;
    ///   stock is left untouched and the snapshot is discarded
    pub async fn on_run_requested(&self) -> Result<RunReport, OcrError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Run requested while a batch is in progress");
            return Err(OcrError::Busy);
        };

        let started = Instant::now();
        let (source, params) = {
            let session = self.session.lock();
            (session.source.clone(), session.params)
        };

        let Some(source) = source else {
            self.metrics.record_batch_outcome("no_image", started.elapsed());
            self.emit(PipelineEvent::Status(RunStatus::NoImage));
            return Err(OcrError::NoImage);
        };

        let span = observability::batch_span(&source.display_name(), params.scale);
        self.run_batch(source, params, started).instrument(span).await
    }

    async fn run_batch(
        &self,
        source: ImageSource,
        params: GridParams,
        started: Instant,
    ) -> Result<RunReport, OcrError> {
        self.set_state(BatchState::Capturing);
        let snapshot = StockSnapshot::capture(&self.stock, &self.catalog);
        if self.undo.capture(snapshot) {
            self.emit(PipelineEvent::SnapshotAvailable(false));
        }
        self.session.lock().pending.clear();

        let (params, effective_scale, results) = match self.recognize(&source, params).await {
            Ok(recognized) => recognized,
            Err(e) => {
                self.undo.discard();
                self.set_state(BatchState::Idle);
                error_logging::log_ocr_error(
                    &e,
                    "grid_ocr_batch",
                    Some(source.display_name().as_str()),
                    None,
                    Some(started.elapsed()),
                );
                self.metrics.record_batch_outcome("failed", started.elapsed());
                self.emit(PipelineEvent::Status(RunStatus::Failed {
                    message: e.to_string(),
                }));
                return Err(e);
            }
        };

        self.set_state(BatchState::Reconciling);
        let reconciliation = reconcile(&results, &self.catalog, &self.config.matcher);
        self.metrics.record_tile_buckets(
            reconciliation.auto_apply.len(),
            reconciliation.confirmations.len(),
            reconciliation.discarded.len() + reconciliation.collapsed.len(),
        );

        let status = if reconciliation.is_empty() {
            self.undo.discard();
            self.set_state(BatchState::Idle);
            self.metrics.record_batch_outcome("nothing_detected", started.elapsed());
            info!(tiles = results.len(), "Nothing detected");
            RunStatus::NothingDetected
        } else {
            self.apply_reconciliation(&reconciliation);
            self.metrics.record_batch_outcome("completed", started.elapsed());
            RunStatus::Completed {
                tiles: results.len(),
                auto_applied: reconciliation.auto_apply.len(),
                awaiting_confirmation: reconciliation.confirmations.len(),
            }
        };

        let report = RunReport {
            source: source.display_name(),
            status: status.clone(),
            params,
            effective_scale,
            results,
            reconciliation,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            status = status.message(),
            duration_ms = report.duration_ms,
            "Grid OCR batch finished"
        );
        self.emit(PipelineEvent::Status(status));
        Ok(report)
    }

    fn apply_reconciliation(&self, reconciliation: &Reconciliation) {
        let changed = self.stock.apply(&reconciliation.writes());
        for auto in &reconciliation.auto_apply {
            info!(
                history = %format!("overwrite: {} <- {} (auto)", auto.write.ingredient, auto.write.quantity),
                tile = auto.tile_index,
                distance = auto.distance,
                "Stock updated"
            );
        }
        if !changed.is_empty() {
            self.persist_stock();
            self.emit(PipelineEvent::StockUpdated(changed));
        }

        {
            let mut session = self.session.lock();
            session.pending = reconciliation.confirmations.clone();
            session.state = if session.pending.is_empty() {
                BatchState::AutoApplied
            } else {
                BatchState::AwaitingConfirmation
            };
        }

        self.arm_undo();
    }

    /// Load, lay out, binarize and recognize every tile
    async fn recognize(
        &self,
        source: &ImageSource,
        params: GridParams,
    ) -> Result<(GridParams, f32, Vec<RecognitionResult>), OcrError> {
        self.recognizer.ensure_ready().await?;
        let image = self.load_image(source).await?;

        let (params, _, _) = clamp_to_image(
            image.width(),
            image.height(),
            &params,
            self.config.fixed_bottom,
            DeclaredBounds::default(),
        );
        let tiles = tile_layout(image.width(), image.height(), &params);
        tracing::Span::current().record("tiles", tiles.len());

        let canvas = {
            let image = Arc::clone(&image);
            let preprocess = self.config.preprocess.clone();
            let scale = params.scale;
            tokio::task::spawn_blocking(move || binarize(&image, scale, &preprocess))
                .await
                .map_err(|e| OcrError::Preprocessing(format!("binarize task failed: {}", e)))??
        };
        let effective_scale = canvas.effective_scale;
        info!(
            tiles = tiles.len(),
            requested_scale = params.scale,
            effective_scale,
            "Prepared canvas"
        );

        if tiles.is_empty() {
            return Ok((params, effective_scale, Vec::new()));
        }

        self.set_state(BatchState::Recognizing);
        let context = Arc::new(BatchContext {
            image,
            canvas: Arc::new(canvas),
            scales: self.attempt_scales(params.scale),
            tiles,
            recognizer: self.recognizer.clone(),
            index: Arc::clone(&self.index),
            matcher: self.config.matcher.clone(),
            preprocess: self.config.preprocess.clone(),
            metrics: self.metrics,
            next: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            events: self.events.clone(),
        });

        let results = recognize_tiles(context, self.config.pipeline.max_concurrent_tiles).await?;
        Ok((params, effective_scale, results))
    }

    /// The grid scale first, then the configured candidates not equal to it
    fn attempt_scales(&self, primary: f32) -> Vec<f32> {
        let mut scales = vec![primary];
        for &candidate in &self.config.retry.scale_candidates {
            if scales.iter().all(|s| (s - candidate).abs() > f32::EPSILON) {
                scales.push(candidate);
            }
        }
        scales
    }

    fn arm_undo(&self) {
        let window = self.config.pipeline.undo_window;
        let Some(generation) = self.undo.arm(window) else {
            return;
        };
        self.emit(PipelineEvent::SnapshotAvailable(true));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let undo = Arc::clone(&self.undo);
                let session = Arc::clone(&self.session);
                let events = self.events.clone();
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    if undo.expire(generation) {
                        settle_after_expiry(&session);
                        let _ = events.send(PipelineEvent::SnapshotAvailable(false));
                    }
                });
            }
            Err(_) => debug!("No runtime; undo window expires lazily"),
        }
    }

    fn persist_stock(&self) {
        if let Err(e) = self.stock.save() {
            warn!(error = %e, "Stock changes kept in memory only");
        }
    }

    /// Write the confirmation rows with the user's edits.
    ///
    /// `resolutions` holds one entry per pending row, in order. Returns the
    /// writes that were applied; the undo window reopens if the pre-batch
    /// snapshot is still held.
    pub fn commit_confirmation(
        &self,
        resolutions: Vec<RowResolution>,
    ) -> Result<Vec<StockWrite>, OcrError> {
        let rows = {
            let session = self.session.lock();
            if session.pending.is_empty() {
                return Err(OcrError::NothingToConfirm);
            }
            session.pending.clone()
        };

        let writes = resolve_confirmations(&rows, &resolutions, &self.catalog)?;
        let changed = self.stock.apply(&writes);
        {
            let mut session = self.session.lock();
            session.pending.clear();
            session.state = BatchState::Idle;
        }

        if !writes.is_empty() {
            info!(
                history = %format!("bulk overwrite: {} rows (confirmed)", writes.len()),
                "Confirmation committed"
            );
        }
        if !changed.is_empty() {
            self.persist_stock();
            self.emit(PipelineEvent::StockUpdated(changed));
        }
        if self.undo.is_held() {
            self.arm_undo();
        }
        Ok(writes)
    }

    /// Drop every pending confirmation row; returns how many were dropped
    pub fn discard_confirmation(&self) -> usize {
        let mut session = self.session.lock();
        let dropped = session.pending.len();
        session.pending.clear();
        if session.state == BatchState::AwaitingConfirmation {
            session.state = BatchState::Idle;
        }
        if dropped > 0 {
            info!(dropped, "Confirmation discarded");
        }
        dropped
    }

    /// Restore the pre-batch stock.
    ///
    /// Returns the number of changed entries, or `None` when no undo is
    /// available. Pending confirmations are dropped with it.
    pub fn undo(&self) -> Option<usize> {
        let restored = self.undo.undo(&self.stock)?;
        {
            let mut session = self.session.lock();
            session.pending.clear();
            session.state = BatchState::Idle;
        }

        info!(
            history = %format!("undo: restored pre-batch state ({} entries)", restored),
            "Undo applied"
        );
        if restored > 0 {
            self.persist_stock();
        }
        self.emit(PipelineEvent::UndoConsumed { restored });
        self.emit(PipelineEvent::SnapshotAvailable(false));
        Some(restored)
    }
}

/// Once the undo window closes, an auto-applied batch with nothing left to
/// confirm is resolved
fn settle_after_expiry(session: &Mutex<Session>) {
    let mut session = session.lock();
    if session.pending.is_empty() && session.state == BatchState::AutoApplied {
        session.state = BatchState::Idle;
        debug!("Batch resolved after undo window");
    }
}

async fn recognize_tiles(
    context: Arc<BatchContext>,
    max_concurrent: usize,
) -> Result<Vec<RecognitionResult>, OcrError> {
    let workers = max_concurrent.clamp(1, context.tiles.len().max(1));
    let mut set = JoinSet::new();
    for _ in 0..workers {
        set.spawn(tile_worker(Arc::clone(&context)));
    }

    let mut results = Vec::with_capacity(context.tiles.len());
    let mut fatal: Option<OcrError> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(mut batch)) => results.append(&mut batch),
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(e) => {
                context.abort.store(true, Ordering::Release);
                fatal.get_or_insert(OcrError::Extraction(format!("tile worker failed: {}", e)));
            }
        }
    }

    if let Some(e) = fatal {
        return Err(e);
    }
    results.sort_by_key(|result| result.tile.index);
    Ok(results)
}

/// Pull tile indices from the shared counter until none are left
async fn tile_worker(context: Arc<BatchContext>) -> Result<Vec<RecognitionResult>, OcrError> {
    let total = context.tiles.len();
    let mut results = Vec::new();

    loop {
        if context.abort.load(Ordering::Acquire) {
            break;
        }
        let i = context.next.fetch_add(1, Ordering::SeqCst);
        if i >= total {
            break;
        }

        match process_tile(&context, &context.tiles[i]).await {
            Ok(result) => results.push(result),
            Err(e) if e.is_fatal_for_batch() => {
                context.abort.store(true, Ordering::Release);
                return Err(e);
            }
            Err(e) => warn!(tile = i, error = %e, "Tile skipped"),
        }

        let done = context.done.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = context.events.send(PipelineEvent::Progress { done, total });
    }

    Ok(results)
}

/// Recognize one tile, retrying at further scales until a result is good
/// enough to auto-apply or the scales run out
async fn process_tile(
    context: &BatchContext,
    rect: &TileRect,
) -> Result<RecognitionResult, OcrError> {
    let started = Instant::now();
    let mut best: Option<RecognitionResult> = None;

    for (attempt, &scale) in context.scales.iter().enumerate() {
        if attempt > 0 {
            context.metrics.record_retry_attempt();
        }

        let tile = extract_grid_tile(&context.canvas, rect, Some(scale), &context.preprocess)?;
        let text = context.recognizer.recognize_tile(tile).await?;
        let analysis = analyze_tile(
            &context.index,
            &text.name_text,
            &text.digit_text,
            context.matcher.max_distance,
        );
        debug!(
            tile = rect.index,
            scale,
            name = %text.name_text,
            digits = %text.digit_text,
            matched = ?analysis.matched,
            quantity = analysis.quantity,
            "Tile attempt"
        );

        let candidate = RecognitionResult {
            tile: *rect,
            raw_name_text: text.name_text,
            raw_digit_text: text.digit_text,
            tokens: analysis.tokens,
            matched: analysis.matched,
            quantity: analysis.quantity,
            scale,
            attempts: attempt + 1,
            thumbnail: None,
        };
        // An accepted reading always wins; otherwise keep the best ranked one
        if candidate.is_auto_apply(&context.matcher) {
            best = Some(candidate);
            break;
        }
        best = match best {
            Some(current) if !candidate.outranks(&current) => Some(RecognitionResult {
                attempts: attempt + 1,
                ..current
            }),
            _ => Some(candidate),
        };
    }

    context.metrics.record_tile_duration(started.elapsed());
    let mut result = best
        .ok_or_else(|| OcrError::Validation("no recognition scale configured".to_string()))?;
    result.thumbnail = match make_thumbnail(&context.image, rect, &context.preprocess) {
        Ok(thumbnail) => Some(thumbnail),
        Err(e) => {
            warn!(tile = rect.index, error = %e, "Thumbnail skipped");
            None
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::RecognitionPass;
    use image::GrayImage;

    struct SilentEngine;

    impl RecognitionEngine for SilentEngine {
        fn ensure_ready(&self) -> Result<(), OcrError> {
            Ok(())
        }

        fn recognize(&self, _pass: RecognitionPass, _tile: &GrayImage) -> Result<String, OcrError> {
            Ok(String::new())
        }
    }

    fn pipeline(config: AppConfig) -> GridOcrPipeline {
        GridOcrPipeline::new(
            config,
            Catalog::embedded().expect("catalog"),
            Arc::new(StockStore::new()),
            Arc::new(SilentEngine),
        )
        .expect("pipeline")
    }

    #[test]
    fn test_attempt_scales() {
        let mut config = AppConfig::default();
        config.retry.scale_candidates = vec![2.0, 3.0, 3.0];
        let pipeline = pipeline(config);
        assert_eq!(pipeline.attempt_scales(2.0), vec![2.0, 3.0]);
        assert_eq!(pipeline.attempt_scales(1.5), vec![1.5, 2.0, 3.0]);
    }

    #[test]
    fn test_run_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = RunGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(RunGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_status_messages_are_distinct() {
        let failed = RunStatus::Failed {
            message: "x".into(),
        };
        assert_ne!(RunStatus::NoImage.message(), RunStatus::NothingDetected.message());
        assert_ne!(RunStatus::NothingDetected.message(), failed.message());
    }

    #[test]
    fn test_confirmation_actions_without_batch() {
        let pipeline = pipeline(AppConfig::default());
        assert_eq!(pipeline.batch_state(), BatchState::Idle);
        assert!(matches!(
            pipeline.commit_confirmation(Vec::new()),
            Err(OcrError::NothingToConfirm)
        ));
        assert_eq!(pipeline.discard_confirmation(), 0);
        assert_eq!(pipeline.undo(), None);
    }

    #[tokio::test]
    async fn test_params_stored_without_image() {
        let pipeline = pipeline(AppConfig::default());
        let params = GridParams {
            rows: 9,
            ..GridParams::default()
        };
        assert!(matches!(
            pipeline.on_grid_params_changed(params).await,
            Err(OcrError::NoImage)
        ));
        let stored = pipeline.params();
        assert_eq!(stored.rows, 4);
        assert_eq!(stored.bottom(), AppConfig::default().fixed_bottom);
    }
}
