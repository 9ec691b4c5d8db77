//! # Image Loading Module
//!
//! Reads and decodes screenshots from files, in-memory blobs or URLs, caching
//! decoded images by content signature so repeated loads of the same source
//! skip the decode.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::types::PreprocessingError;
use crate::cache::{ImageCache, ImageSignature};
use crate::observability::PipelineMetrics;

/// Where a screenshot comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on disk
    File(PathBuf),
    /// Bytes already in memory (an uploaded blob)
    Bytes {
        name: String,
        data: Arc<Vec<u8>>,
        /// Modification time in milliseconds since the epoch, if known
        modified: Option<i64>,
    },
    /// Remote image fetched over HTTP
    Url(String),
}

impl ImageSource {
    /// Human readable identification used in errors and logs
    pub fn display_name(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes { name, .. } => name.clone(),
            ImageSource::Url(url) => url.clone(),
        }
    }

    /// Content signature (name, size, modification time)
    pub async fn signature(&self) -> Result<ImageSignature, PreprocessingError> {
        match self {
            ImageSource::File(path) => {
                let metadata = tokio::fs::metadata(path).await.map_err(|e| {
                    PreprocessingError::ImageLoad {
                        source_name: self.display_name(),
                        message: e.to_string(),
                    }
                })?;
                let modified = metadata
                    .modified()
                    .ok()
                    .map(|time| DateTime::<Utc>::from(time).timestamp_millis());
                Ok(ImageSignature {
                    name: self.display_name(),
                    size: metadata.len(),
                    modified,
                })
            }
            ImageSource::Bytes {
                name,
                data,
                modified,
            } => Ok(ImageSignature {
                name: name.clone(),
                size: data.len() as u64,
                modified: *modified,
            }),
            ImageSource::Url(url) => Ok(ImageSignature {
                name: url.clone(),
                size: 0,
                modified: None,
            }),
        }
    }
}

/// Decoding loader with a signature-keyed cache
pub struct ImageLoader {
    cache: ImageCache,
    http: reqwest::Client,
}

impl ImageLoader {
    pub fn new() -> Self {
        Self::with_metrics(PipelineMetrics::default())
    }

    /// Loader whose cache reports hits and misses through `metrics`
    pub fn with_metrics(metrics: PipelineMetrics) -> Self {
        Self {
            cache: ImageCache::new().with_metrics(metrics),
            http: reqwest::Client::new(),
        }
    }

    /// Load and decode `source`, returning the cached image on a repeated signature.
    ///
    /// A read failure yields `PreprocessingError::ImageLoad`; undecodable bytes
    /// yield `PreprocessingError::Decode` and evict the signature.
    pub async fn load(&self, source: &ImageSource) -> Result<Arc<DynamicImage>, PreprocessingError> {
        let signature = source.signature().await?;
        if let Some(image) = self.cache.get(&signature) {
            debug!(signature = %signature, "Image cache hit");
            return Ok(image);
        }

        let start_time = Instant::now();
        let bytes = self.read_bytes(source).await?;
        let source_name = source.display_name();

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| PreprocessingError::ProcessingFailed {
                message: format!("decode task failed: {}", e),
            })?;

        let image = match decoded {
            Ok(image) => Arc::new(image),
            Err(e) => {
                self.cache.evict(&signature);
                warn!(source = %source_name, error = %e, "Image decode failed");
                return Err(PreprocessingError::Decode {
                    source_name,
                    message: e.to_string(),
                });
            }
        };

        info!(
            source = %source_name,
            width = image.width(),
            height = image.height(),
            "Decoded image in {}ms",
            start_time.elapsed().as_millis()
        );
        self.cache.insert(signature, Arc::clone(&image));
        Ok(image)
    }

    async fn read_bytes(&self, source: &ImageSource) -> Result<Arc<Vec<u8>>, PreprocessingError> {
        let load_error = |message: String| PreprocessingError::ImageLoad {
            source_name: source.display_name(),
            message,
        };

        match source {
            ImageSource::File(path) => tokio::fs::read(path)
                .await
                .map(Arc::new)
                .map_err(|e| load_error(e.to_string())),
            ImageSource::Bytes { data, .. } => Ok(Arc::clone(data)),
            ImageSource::Url(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| load_error(e.to_string()))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| load_error(e.to_string()))?;
                Ok(Arc::new(bytes.to_vec()))
            }
        }
    }

    /// Drop the cached decode of one source; returns whether it was cached
    pub async fn forget(&self, source: &ImageSource) -> bool {
        match source.signature().await {
            Ok(signature) => self.cache.evict(&signature),
            Err(_) => false,
        }
    }

    /// Drop every cached decode
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_images(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}
