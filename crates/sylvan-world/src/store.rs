//! Authoritative map from chunk key to chunk state and data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use sylvan_core::{ChunkKey, Error, Result};

use crate::chunk::{ChunkData, ChunkState};

/// Shared flag telling a worker its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the associated work as unwanted.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check whether the associated work has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Proof that a key was marked pending, required to commit its result.
#[derive(Debug, Clone)]
pub struct PendingTicket {
    key: ChunkKey,
    generation: u64,
    cancel: CancelToken,
}

impl PendingTicket {
    /// Chunk this ticket was issued for.
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    /// Store-wide issue number; a re-requested key gets a new one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token fired when the chunk is evicted.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// `Evicted` once the store has dropped this request, `Pending` otherwise.
    pub fn state(&self) -> ChunkState {
        if self.cancel.is_cancelled() {
            ChunkState::Evicted
        } else {
            ChunkState::Pending
        }
    }
}

/// Snapshot of a store entry.
#[derive(Debug, Clone)]
pub struct ChunkView {
    pub state: ChunkState,
    pub data: Option<Arc<ChunkData>>,
}

/// Entry counts and memory footprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub pending: usize,
    pub ready: usize,
    pub memory_bytes: usize,
}

struct ChunkEntry {
    state: ChunkState,
    generation: u64,
    cancel: CancelToken,
    data: Option<Arc<ChunkData>>,
}

struct StoreInner {
    chunks: HashMap<ChunkKey, ChunkEntry>,
    next_generation: u64,
}

/// Single authoritative map from chunk key to state and data.
///
/// All mutation goes through [`mark_pending`](Self::mark_pending),
/// [`commit`](Self::commit) and [`evict`](Self::evict), each atomic under one
/// write lock. Renderers share the store through an `Arc` and only read.
pub struct ChunkStore {
    inner: RwLock<StoreInner>,
}

impl ChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty store sized for `capacity` chunks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                chunks: HashMap::with_capacity(capacity),
                next_generation: 0,
            }),
        }
    }

    /// Current state and data for a key, or `None` if absent.
    pub fn get(&self, key: ChunkKey) -> Option<ChunkView> {
        self.inner.read().chunks.get(&key).map(|entry| ChunkView {
            state: entry.state,
            data: entry.data.clone(),
        })
    }

    /// Check if a chunk (pending or ready) exists at the given key.
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.inner.read().chunks.contains_key(&key)
    }

    /// Get the number of stored chunks.
    pub fn len(&self) -> usize {
        self.inner.read().chunks.len()
    }

    /// Check if no chunks are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().chunks.is_empty()
    }

    /// Get all stored chunk keys.
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.inner.read().chunks.keys().copied().collect()
    }

    /// Get keys in a specific state.
    pub fn keys_in_state(&self, state: ChunkState) -> Vec<ChunkKey> {
        self.inner
            .read()
            .chunks
            .iter()
            .filter(|(_, entry)| entry.state == state)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Get keys whose data is available.
    pub fn ready_keys(&self) -> Vec<ChunkKey> {
        self.keys_in_state(ChunkState::Ready)
    }

    /// Shared handle to a ready chunk's data.
    pub fn data(&self, key: ChunkKey) -> Option<Arc<ChunkData>> {
        self.inner
            .read()
            .chunks
            .get(&key)
            .and_then(|entry| entry.data.clone())
    }

    /// Execute a function with read access to a ready chunk.
    ///
    /// Returns `None` if the chunk is absent or still pending.
    pub fn with_chunk<F, R>(&self, key: ChunkKey, f: F) -> Option<R>
    where
        F: FnOnce(&ChunkData) -> R,
    {
        let inner = self.inner.read();
        inner
            .chunks
            .get(&key)
            .and_then(|entry| entry.data.as_deref())
            .map(f)
    }

    /// Record that generation for `key` is about to be scheduled.
    ///
    /// Fails with [`Error::DuplicateRequest`] if the key is already pending or
    /// ready, so a key never has two generation tasks in flight.
    pub fn mark_pending(&self, key: ChunkKey) -> Result<PendingTicket> {
        let mut inner = self.inner.write();
        if inner.chunks.contains_key(&key) {
            return Err(Error::DuplicateRequest(key));
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let cancel = CancelToken::new();
        inner.chunks.insert(
            key,
            ChunkEntry {
                state: ChunkState::Pending,
                generation,
                cancel: cancel.clone(),
                data: None,
            },
        );

        Ok(PendingTicket {
            key,
            generation,
            cancel,
        })
    }

    /// Store the worker's result and move the chunk from pending to ready.
    ///
    /// Fails with [`Error::StaleCommit`] if the chunk was evicted after the
    /// ticket was issued (including evicted and re-requested). The data is
    /// dropped in that case.
    pub fn commit(&self, ticket: &PendingTicket, data: ChunkData) -> Result<()> {
        if data.key != ticket.key {
            return Err(Error::InvalidInput(format!(
                "data for chunk {} committed with ticket for {}",
                data.key, ticket.key
            )));
        }

        let mut inner = self.inner.write();
        let Some(entry) = inner.chunks.get_mut(&ticket.key) else {
            return Err(Error::StaleCommit(ticket.key));
        };
        if entry.generation != ticket.generation {
            return Err(Error::StaleCommit(ticket.key));
        }
        if entry.state != ChunkState::Pending {
            return Err(Error::DuplicateRequest(ticket.key));
        }

        entry.state = ChunkState::Ready;
        entry.data = Some(Arc::new(data));
        Ok(())
    }

    /// Remove a chunk in any state, cancelling its in-flight work if pending.
    ///
    /// Returns the state the chunk was in, or `None` if it was absent.
    pub fn evict(&self, key: ChunkKey) -> Option<ChunkState> {
        let entry = self.inner.write().chunks.remove(&key)?;
        entry.cancel.cancel();
        Some(entry.state)
    }

    /// Evict every chunk. Returns the evicted keys.
    pub fn clear(&self) -> Vec<ChunkKey> {
        let mut inner = self.inner.write();
        inner
            .chunks
            .drain()
            .map(|(key, entry)| {
                entry.cancel.cancel();
                key
            })
            .collect()
    }

    /// Entry counts and memory footprint of ready data.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        inner
            .chunks
            .values()
            .fold(StoreStats::default(), |mut stats, entry| {
                match entry.state {
                    ChunkState::Pending => stats.pending += 1,
                    ChunkState::Ready => stats.ready += 1,
                    ChunkState::Evicted => {}
                }
                stats.memory_bytes += entry.data.as_ref().map_or(0, |d| d.memory_usage());
                stats
            })
    }
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}
