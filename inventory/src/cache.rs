//! Snapshot cache and shared-instance coordination.
//!
//! Readers get the published snapshot through a lock-free pointer load.
//! Reloads resolve a complete new snapshot off to the side and publish it with
//! a single atomic swap; a failed reload leaves the published snapshot alone.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::InventoryResult,
    snapshot::{ResolveOptions, Snapshot},
    source::InventorySource,
};

/// How long a cache lives and who sees it. Fixed when a handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// One cache per source for the whole process; reloads are seen by every handle.
    #[default]
    Shared,
    /// A private cache per handle.
    Isolated,
}

pub struct InventoryCache {
    source: Arc<dyn InventorySource>,
    options: ResolveOptions,
    published: ArcSwap<Snapshot>,
    generation: AtomicU64,
    first_load: Mutex<()>,
}

impl InventoryCache {
    /// Create a cache serving an empty snapshot. Nothing is read until
    /// `reload` or `ensure_loaded` is called.
    pub fn new(source: Arc<dyn InventorySource>, options: ResolveOptions) -> Self {
        let empty = Snapshot::empty(source.describe(), &options.capabilities);
        Self {
            source,
            options,
            published: ArcSwap::from_pointee(empty),
            generation: AtomicU64::new(0),
            first_load: Mutex::new(()),
        }
    }

    pub fn load(
        source: Arc<dyn InventorySource>,
        options: ResolveOptions,
    ) -> InventoryResult<Self> {
        let cache = Self::new(source, options);
        cache.reload()?;
        Ok(cache)
    }

    /// Latest published snapshot. Never reads the source and never waits on a reload.
    pub fn current(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.published.load().generation() > 0
    }

    pub fn source(&self) -> &dyn InventorySource {
        self.source.as_ref()
    }

    /// Re-read the source and publish a fresh snapshot.
    ///
    /// On failure the previous snapshot stays current and the error is
    /// returned. When reloads race, the one with the highest generation stays
    /// published; every successful call returns the snapshot it built.
    pub fn reload(&self) -> InventoryResult<Arc<Snapshot>> {
        let source = self.source.describe();
        let resolved = self.source.read().and_then(|bytes| {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            Snapshot::resolve(&bytes, &self.options, source.clone(), generation)
        });

        match resolved {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let previous = self.published.rcu(|current| {
                    if current.generation() > snapshot.generation() {
                        Arc::clone(current)
                    } else {
                        Arc::clone(&snapshot)
                    }
                });
                if previous.generation() > snapshot.generation() {
                    debug!(
                        source = %source,
                        generation = snapshot.generation(),
                        published = previous.generation(),
                        "Newer inventory snapshot already published"
                    );
                } else {
                    info!(
                        source = %source,
                        generation = snapshot.generation(),
                        hosts = snapshot.host_count(),
                        groups = snapshot.group_count(),
                        "Published inventory snapshot"
                    );
                }
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    source = %source,
                    error = %e,
                    serving_generation = self.published.load().generation(),
                    "Inventory reload failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    /// Load once if nothing has been published yet; concurrent first callers
    /// share a single load.
    pub fn ensure_loaded(&self) -> InventoryResult<Arc<Snapshot>> {
        if self.is_loaded() {
            return Ok(self.current());
        }
        let _guard = self.first_load.lock();
        if self.is_loaded() {
            return Ok(self.current());
        }
        self.reload()
    }
}

impl fmt::Debug for InventoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryCache")
            .field("source", &self.source.describe())
            .field("generation", &self.published.load().generation())
            .finish()
    }
}

static SHARED_CACHES: Lazy<Mutex<HashMap<String, Arc<InventoryCache>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Explicit handle adapters hold onto.
///
/// Shared handles for the same source (by `describe()`) point at one cache;
/// the options of the first opener win. Isolated handles never share.
#[derive(Debug, Clone)]
pub struct InventoryHandle {
    mode: CacheMode,
    cache: Arc<InventoryCache>,
}

impl InventoryHandle {
    /// Open a handle without reading anything.
    pub fn open(
        mode: CacheMode,
        source: Arc<dyn InventorySource>,
        options: ResolveOptions,
    ) -> Self {
        let cache = match mode {
            CacheMode::Shared => {
                let key = source.describe();
                let mut caches = SHARED_CACHES.lock();
                let cache = caches.entry(key.clone()).or_insert_with(|| {
                    debug!(source = %key, "Creating shared inventory cache");
                    Arc::new(InventoryCache::new(source, options))
                });
                Arc::clone(cache)
            }
            CacheMode::Isolated => Arc::new(InventoryCache::new(source, options)),
        };
        Self { mode, cache }
    }

    /// Open a handle and make sure a snapshot has been loaded.
    ///
    /// For shared handles only the first caller actually reads the source.
    pub fn load(
        mode: CacheMode,
        source: Arc<dyn InventorySource>,
        options: ResolveOptions,
    ) -> InventoryResult<Self> {
        let handle = Self::open(mode, source, options);
        handle.ensure_loaded()?;
        Ok(handle)
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn cache(&self) -> &Arc<InventoryCache> {
        &self.cache
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.cache.current()
    }

    pub fn reload(&self) -> InventoryResult<Arc<Snapshot>> {
        self.cache.reload()
    }

    pub fn ensure_loaded(&self) -> InventoryResult<Arc<Snapshot>> {
        self.cache.ensure_loaded()
    }

    pub fn shares_cache_with(&self, other: &InventoryHandle) -> bool {
        Arc::ptr_eq(&self.cache, &other.cache)
    }
}
