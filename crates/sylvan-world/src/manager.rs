//! Viewer-driven chunk residency.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use glam::Vec3;
use hashbrown::HashSet;
use sylvan_core::{ChunkKey, Result};
use tracing::{debug, error, trace, warn};

use crate::chunk::{ChunkData, ChunkState};
use crate::config::WorldConfig;
use crate::dispatcher::{JobOutcome, WorkerDispatcher};
use crate::generation::ChunkGenerator;
use crate::store::ChunkStore;

/// Priority entry for the chunk scheduling queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadPriority {
    key: ChunkKey,
    /// Squared distance to the viewer chunk (lower = higher priority).
    distance_sq: i64,
}

impl PartialOrd for LoadPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (closer chunks have higher priority);
        // ties broken by key so the schedule order is reproducible.
        other
            .distance_sq
            .cmp(&self.distance_sq)
            .then_with(|| other.key.packed().cmp(&self.key.packed()))
    }
}

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Keys marked pending and handed to the dispatcher, closest first.
    pub scheduled: Vec<ChunkKey>,
    /// Keys that left the resident set.
    pub evicted: Vec<ChunkKey>,
}

impl ReconcileReport {
    /// Check if the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.evicted.is_empty()
    }
}

/// What one [`WorldManager::update`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Viewer chunk after this update.
    pub center: Option<ChunkKey>,
    /// Set when the viewer crossed a chunk boundary.
    pub reconciled: Option<ReconcileReport>,
    /// Chunks that became ready.
    pub committed: Vec<ChunkKey>,
    /// Chunks whose failed generation was scheduled again.
    pub retried: Vec<ChunkKey>,
    /// Chunks given up on after exhausting retries.
    pub failed: Vec<ChunkKey>,
    /// Results discarded because their chunk had been evicted.
    pub stale: usize,
}

/// Residency summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub resident: usize,
    pub pending: usize,
    pub ready: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub memory_bytes: usize,
}

/// Keeps exactly the chunks within the view distance of the viewer resident.
///
/// Owns its [`ChunkStore`] and [`WorkerDispatcher`]; renderers get a shared
/// read handle through [`store`](Self::store). Dropping the manager cancels
/// all pending work and evicts every chunk.
pub struct WorldManager {
    config: WorldConfig,
    store: Arc<ChunkStore>,
    dispatcher: WorkerDispatcher,
    current: Option<ChunkKey>,
    resident: HashSet<ChunkKey>,
    /// Resident keys whose generation failed permanently.
    failed: HashSet<ChunkKey>,
}

impl WorldManager {
    /// Create a world manager generating on a background worker pool.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let generator = Arc::new(ChunkGenerator::new(config.generator.clone()));
        let dispatcher = WorkerDispatcher::spawn(generator, config.workers)?;
        Self::with_dispatcher(config, dispatcher)
    }

    /// Create a world manager that generates synchronously during `update`.
    pub fn new_inline(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let generator = Arc::new(ChunkGenerator::new(config.generator.clone()));
        Self::with_dispatcher(config, WorkerDispatcher::inline(generator))
    }

    /// Create a world manager around an existing dispatcher.
    pub fn with_dispatcher(config: WorldConfig, dispatcher: WorkerDispatcher) -> Result<Self> {
        config.validate()?;
        let capacity = resident_capacity(config.view_distance);
        Ok(Self {
            config,
            store: Arc::new(ChunkStore::with_capacity(capacity)),
            dispatcher,
            current: None,
            resident: HashSet::with_capacity(capacity),
            failed: HashSet::new(),
        })
    }

    /// Get the streaming configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Shared read handle to the chunk store.
    pub fn store(&self) -> Arc<ChunkStore> {
        Arc::clone(&self.store)
    }

    /// Viewer chunk as of the last reconcile.
    pub fn current_key(&self) -> Option<ChunkKey> {
        self.current
    }

    /// Keys within the view distance of the current viewer chunk.
    pub fn resident_keys(&self) -> &HashSet<ChunkKey> {
        &self.resident
    }

    /// Resident keys that will stay absent until they leave and re-enter view.
    pub fn failed_keys(&self) -> &HashSet<ChunkKey> {
        &self.failed
    }

    /// Check if a key is in the resident set.
    pub fn is_resident(&self, key: ChunkKey) -> bool {
        self.resident.contains(&key)
    }

    /// Data for a ready chunk.
    pub fn chunk(&self, key: ChunkKey) -> Option<Arc<ChunkData>> {
        self.store.data(key)
    }

    /// Get the number of jobs waiting on or running in the dispatcher.
    pub fn in_flight_count(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Check whether every resident chunk is ready or permanently failed.
    pub fn is_settled(&self) -> bool {
        self.resident.iter().all(|key| {
            self.failed.contains(key)
                || self
                    .store
                    .get(*key)
                    .is_some_and(|view| view.state == ChunkState::Ready)
        })
    }

    /// Residency summary.
    pub fn stats(&self) -> WorldStats {
        let store = self.store.stats();
        WorldStats {
            resident: self.resident.len(),
            pending: store.pending,
            ready: store.ready,
            failed: self.failed.len(),
            in_flight: self.dispatcher.in_flight(),
            memory_bytes: store.memory_bytes,
        }
    }

    /// Update streaming state based on viewer position.
    ///
    /// Collects finished generation results, then reconciles the resident
    /// set if the viewer crossed into a different chunk. Never blocks on
    /// worker threads.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn update(&mut self, viewer: Vec3) -> UpdateReport {
        let mut report = UpdateReport::default();
        self.collect_completed(&mut report);

        if !viewer.x.is_finite() || !viewer.z.is_finite() {
            warn!(?viewer, "ignoring non-finite viewer position");
            report.center = self.current;
            return report;
        }

        let view_distance = self.config.view_distance;
        let Some(center) = ChunkKey::from_world(viewer.x, viewer.z, self.config.tile_size())
            .filter(|key| key.fits_neighborhood(view_distance))
        else {
            warn!(?viewer, "ignoring viewer position outside the chunk grid");
            report.center = self.current;
            return report;
        };
        if self.current != Some(center) {
            report.reconciled = Some(self.reconcile(center));
        }
        report.center = Some(center);
        report
    }

    /// Make the resident set exactly the keys within view distance of `center`.
    ///
    /// New keys are marked pending and scheduled closest first; keys that
    /// fell out of range are evicted. Calling this again with the same
    /// center changes nothing.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn reconcile(&mut self, center: ChunkKey) -> ReconcileReport {
        self.current = Some(center);

        let required: HashSet<ChunkKey> = center
            .neighborhood(self.config.view_distance, self.config.metric)
            .collect();

        let mut report = ReconcileReport::default();

        for &key in &self.resident {
            if !required.contains(&key) {
                report.evicted.push(key);
            }
        }
        for key in &report.evicted {
            self.store.evict(*key);
            // Leaving view forgives a failure; re-entering retries from scratch.
            self.failed.remove(key);
        }

        let mut load_queue: BinaryHeap<LoadPriority> = required
            .iter()
            .filter(|key| !self.store.contains(**key) && !self.failed.contains(*key))
            .map(|&key| LoadPriority {
                key,
                distance_sq: key.distance_sq(center),
            })
            .collect();

        while let Some(entry) = load_queue.pop() {
            match self.store.mark_pending(entry.key) {
                Ok(ticket) => {
                    self.dispatcher.schedule(ticket);
                    report.scheduled.push(entry.key);
                }
                Err(err) => {
                    error!(key = %entry.key, %err, "refusing to schedule chunk twice");
                    debug_assert!(false, "duplicate chunk request: {err}");
                }
            }
        }

        self.resident = required;

        if !report.is_empty() {
            debug!(
                %center,
                scheduled = report.scheduled.len(),
                evicted = report.evicted.len(),
                "reconciled resident chunks"
            );
        }
        report
    }

    /// Commit finished results and handle failures.
    fn collect_completed(&mut self, report: &mut UpdateReport) {
        for outcome in self.dispatcher.poll() {
            match outcome {
                JobOutcome::Completed { ticket, data } => {
                    let key = ticket.key();
                    match self.store.commit(&ticket, data) {
                        Ok(()) => report.committed.push(key),
                        Err(err) if err.is_benign() => {
                            trace!(%key, "discarding result for evicted chunk");
                            report.stale += 1;
                        }
                        Err(err) => error!(%key, %err, "chunk commit rejected"),
                    }
                }
                JobOutcome::Failed {
                    ticket,
                    attempt,
                    error,
                } => {
                    let key = ticket.key();
                    if ticket.cancel_token().is_cancelled() {
                        trace!(%key, "ignoring failure for evicted chunk");
                        report.stale += 1;
                    } else if attempt < self.config.max_retries {
                        debug!(%key, attempt, %error, "retrying chunk generation");
                        self.dispatcher.reschedule(ticket, attempt + 1);
                        report.retried.push(key);
                    } else {
                        warn!(%key, %error, "giving up on chunk; it will stay absent");
                        self.store.evict(key);
                        self.failed.insert(key);
                        report.failed.push(key);
                    }
                }
            }
        }
    }

    /// Cancel all pending work and evict every chunk.
    pub fn shutdown(&mut self) {
        let evicted = self.store.clear();
        self.dispatcher.shutdown();
        self.resident.clear();
        self.failed.clear();
        self.current = None;
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "world manager shut down");
        }
    }
}

impl Drop for WorldManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Upper bound on the resident set for a view distance (square neighbourhood).
fn resident_capacity(view_distance: i32) -> usize {
    let side = view_distance.max(0) as usize * 2 + 1;
    side * side
}
