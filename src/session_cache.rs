//! Inference session caching
//!
//! Constructing a session means loading and optimizing model weights, which
//! takes seconds. The cache keeps the most recently loaded session so repeat
//! jobs reuse it, and serializes construction so two callers never build the
//! same handle twice.
//!
//! The cache holds a single slot: loading a different model evicts every
//! existing entry first, so only one model's resources are resident.

use crate::{
    error::{Result, StudioError},
    inference::{SegmentationEngine, SessionSettings},
    models::ModelId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Session cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// Lookups served from the cache
    pub cache_hits: u64,
    /// Lookups that required construction
    pub cache_misses: u64,
    /// Successful constructions
    pub constructions: u64,
    /// Failed constructions
    pub construction_failures: u64,
    /// Sessions dropped to make room for another model
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    constructions: AtomicU64,
    construction_failures: AtomicU64,
    evictions: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionCacheStats {
        SessionCacheStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Single-slot, thread-safe cache of inference sessions
pub struct SessionCache<E: SegmentationEngine> {
    engine: Arc<E>,
    settings: SessionSettings,
    /// One lock over the whole map; construction happens while holding it
    slots: Mutex<HashMap<ModelId, Arc<E::Session>>>,
    stats: StatCounters,
}

impl<E: SegmentationEngine> SessionCache<E> {
    /// Create an empty cache
    ///
    /// `settings` carries the model directory and execution providers used for
    /// every construction.
    pub fn new(engine: Arc<E>, settings: SessionSettings) -> Self {
        Self {
            engine,
            settings,
            slots: Mutex::new(HashMap::new()),
            stats: StatCounters::default(),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Return the session for `model`, constructing it on a miss
    ///
    /// Blocks while another caller is constructing. Must not be called from the
    /// thread that owns the view.
    ///
    /// # Errors
    /// - `SessionConstruction` when the engine fails; nothing is cached and a
    ///   later call retries
    #[instrument(skip(self), fields(engine = %self.engine.name()))]
    pub fn get_or_create(&self, model: ModelId) -> Result<Arc<E::Session>> {
        if let Some(session) = self.lock_slots().get(&model) {
            StatCounters::bump(&self.stats.cache_hits, 1);
            debug!(model = %model, "Session cache hit");
            return Ok(Arc::clone(session));
        }

        let mut slots = self.lock_slots();

        // Another caller may have finished constructing while we waited
        if let Some(session) = slots.get(&model) {
            StatCounters::bump(&self.stats.cache_hits, 1);
            debug!(model = %model, "Session constructed by a concurrent caller");
            return Ok(Arc::clone(session));
        }

        StatCounters::bump(&self.stats.cache_misses, 1);

        if !slots.is_empty() {
            let evicted: Vec<ModelId> = slots.drain().map(|(id, _)| id).collect();
            StatCounters::bump(&self.stats.evictions, evicted.len() as u64);
            info!(?evicted, model = %model, "Evicting cached sessions before model switch");
        }

        let start = instant::Instant::now();
        info!(model = %model, "Constructing inference session");

        match self.engine.create_session(model, &self.settings) {
            Ok(session) => {
                let session = Arc::new(session);
                slots.insert(model, Arc::clone(&session));
                StatCounters::bump(&self.stats.constructions, 1);
                info!(
                    model = %model,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Inference session ready"
                );
                Ok(session)
            },
            Err(e) => {
                StatCounters::bump(&self.stats.construction_failures, 1);
                warn!(model = %model, error = %e, "Inference session construction failed");
                Err(match e {
                    StudioError::SessionConstruction { .. } => e,
                    other => StudioError::session_construction(model, other.detail()),
                })
            },
        }
    }

    /// Models with a resident session
    pub fn cached_models(&self) -> Vec<ModelId> {
        let mut models: Vec<ModelId> = self.lock_slots().keys().copied().collect();
        models.sort();
        models
    }

    pub fn contains(&self, model: ModelId) -> bool {
        self.lock_slots().contains_key(&model)
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// Drop every cached session
    ///
    /// # Returns
    /// Number of sessions removed
    pub fn clear(&self) -> usize {
        let mut slots = self.lock_slots();
        let count = slots.len();
        slots.clear();
        StatCounters::bump(&self.stats.evictions, count as u64);
        count
    }

    /// Get current cache statistics
    pub fn stats(&self) -> SessionCacheStats {
        self.stats.snapshot()
    }

    /// A panic inside the engine must not make the cache unusable
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<ModelId, Arc<E::Session>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: SegmentationEngine> std::fmt::Debug for SessionCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("engine", &self.engine.name())
            .field("settings", &self.settings)
            .field("cached_models", &self.cached_models())
            .field("stats", &self.stats())
            .finish()
    }
}
