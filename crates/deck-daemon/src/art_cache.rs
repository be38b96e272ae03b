//! Album-art cache.
//!
//! Maps an art locator (URL) to a decoded image already resized to the strip's
//! art footprint.  Populated entries live in a small LRU and are shared
//! read-only through `Arc`.  A miss starts exactly one load+decode pipeline per
//! locator; concurrent callers await the same shared future and receive the
//! same `Arc` (or the same `None`).  Failures are not cached, so the next poll
//! retries naturally.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use image::imageops::FilterType;
use image::RgbaImage;
use lru::LruCache;
use tracing::{debug, warn};

pub type Art = Arc<RgbaImage>;

#[derive(Debug, thiserror::Error)]
pub enum ArtError {
    #[error("art request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("art source returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("art decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("art decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where encoded image bytes come from.
pub trait ArtSource: Send + Sync {
    fn load(&self, locator: &str) -> BoxFuture<'static, Result<Vec<u8>, ArtError>>;
}

pub struct HttpArtSource {
    client: reqwest::Client,
}

impl HttpArtSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ArtSource for HttpArtSource {
    fn load(&self, locator: &str) -> BoxFuture<'static, Result<Vec<u8>, ArtError>> {
        let request = self.client.get(locator);
        async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(ArtError::Status(response.status()));
            }
            Ok(response.bytes().await?.to_vec())
        }
        .boxed()
    }
}

type PendingArt = Shared<BoxFuture<'static, Option<Art>>>;

struct Entries {
    ready: LruCache<String, Art>,
    /// In-flight loads.  Not counted against the LRU capacity.
    pending: HashMap<String, PendingArt>,
}

pub struct ArtCache {
    entries: Arc<Mutex<Entries>>,
    source: Arc<dyn ArtSource>,
    size: u32,
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ArtCache {
    /// `size` is the edge length (px) every cached image is resized to.
    pub fn new(capacity: usize, size: u32, source: Arc<dyn ArtSource>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(Entries {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            })),
            source,
            size,
        }
    }

    /// Synchronous lookup; a hit refreshes the entry's recency.
    pub fn get(&self, locator: &str) -> Option<Art> {
        lock(&self.entries).ready.get(locator).cloned()
    }

    /// Resolve `locator`, loading it at most once no matter how many callers
    /// ask concurrently.
    pub async fn fetch(&self, locator: &str) -> Option<Art> {
        if locator.is_empty() {
            return None;
        }

        let pending = {
            let mut entries = lock(&self.entries);
            if let Some(art) = entries.ready.get(locator) {
                return Some(art.clone());
            }
            match entries.pending.get(locator) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start(locator);
                    entries
                        .pending
                        .insert(locator.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Spawn the pipeline.  Must be called with the entries lock held so the
    /// task cannot settle before its pending slot exists.
    fn start(&self, locator: &str) -> PendingArt {
        debug!("art: loading {}", locator);
        let load = self.source.load(locator);
        let entries = Arc::clone(&self.entries);
        let key = locator.to_string();
        let size = self.size;

        let task = tokio::spawn(async move {
            let art = match load.await {
                Ok(bytes) => decode(bytes, size).await,
                Err(e) => Err(e),
            };
            let art = match art {
                Ok(art) => Some(art),
                Err(e) => {
                    warn!("art: failed to load {}: {}", key, e);
                    None
                }
            };

            let mut entries = lock(&entries);
            entries.pending.remove(&key);
            if let Some(art) = &art {
                entries.ready.put(key, art.clone());
            }
            art
        });

        async move { task.await.ok().flatten() }.boxed().shared()
    }
}

async fn decode(bytes: Vec<u8>, size: u32) -> Result<Art, ArtError> {
    tokio::task::spawn_blocking(move || -> Result<Art, ArtError> {
        let image = image::load_from_memory(&bytes)?;
        Ok(Arc::new(
            image
                .resize_exact(size, size, FilterType::Triangle)
                .to_rgba8(),
        ))
    })
    .await?
}
