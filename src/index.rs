use crate::error::{check_dim, AmemError, Result};
use crate::similarity::{cosine_similarity, rank};
use crate::types::{Embedding, MemoryEntry};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Capability contract for a bounded, similarity-indexed key/value memory
pub trait AssociativeMemory {
    /// Store a key/value pair, evicting the oldest entries past capacity
    fn insert(&mut self, key: Embedding, value: Embedding) -> Result<()>;

    /// The `k` entries whose keys are most similar to `query`, best first
    fn retrieve(&self, query: &[f64], k: usize) -> Result<Vec<MemoryEntry>>;

    /// Replace the value stored under the key most similar to `key`
    fn update(&mut self, key: &[f64], value: Embedding) -> Result<()>;

    fn clear(&mut self);

    fn size(&self) -> usize;

    fn capacity(&self) -> usize;

    fn embedding_dim(&self) -> usize;
}

/// In-process memory store with FIFO eviction
///
/// Retrieval never reorders entries, so eviction is strictly by insertion
/// order rather than by recency of access.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    capacity: usize,
    embedding_dim: usize,
    entries: VecDeque<MemoryEntry>,
}

impl MemoryStore {
    pub fn new(capacity: usize, embedding_dim: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AmemError::invalid("capacity must be positive"));
        }
        if embedding_dim == 0 {
            return Err(AmemError::invalid("embedding_dim must be positive"));
        }

        Ok(Self {
            capacity,
            embedding_dim,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        })
    }

    /// Stored entries, oldest first
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.iter().cloned().collect()
    }

    fn validate(&self, v: &[f64]) -> Result<()> {
        check_dim(self.embedding_dim, v.len())?;
        if v.iter().any(|x| !x.is_finite()) {
            return Err(AmemError::invalid("embedding contains NaN or infinite values"));
        }
        Ok(())
    }
}

impl AssociativeMemory for MemoryStore {
    fn insert(&mut self, key: Embedding, value: Embedding) -> Result<()> {
        self.validate(&key)?;
        self.validate(&value)?;

        self.entries.push_back(MemoryEntry::new(key, value));

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            tracing::trace!(capacity = self.capacity, "evicted oldest memory entry");
        }

        Ok(())
    }

    fn retrieve(&self, query: &[f64], k: usize) -> Result<Vec<MemoryEntry>> {
        self.validate(query)?;
        rank(query, &self.entries, k)
    }

    fn update(&mut self, key: &[f64], value: Embedding) -> Result<()> {
        self.validate(key)?;
        self.validate(&value)?;

        // First-inserted wins on ties
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let score = cosine_similarity(key, &entry.key)?;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        let (idx, _) = best.ok_or(AmemError::EmptyMemory)?;
        let replaced = MemoryEntry::new(self.entries[idx].key.clone(), value);
        self.entries[idx] = replaced;

        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

// =============================================================================
// SharedMemoryStore - one store, many callers
// =============================================================================

/// Cloneable handle to a store shared across threads
///
/// Insert and its eviction run under one write lock; retrievals share a read
/// lock and never observe a store mid-eviction.
#[derive(Debug, Clone)]
pub struct SharedMemoryStore {
    inner: Arc<RwLock<MemoryStore>>,
}

impl SharedMemoryStore {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn insert(&self, key: Embedding, value: Embedding) -> Result<()> {
        self.inner.write().insert(key, value)
    }

    pub fn retrieve(&self, query: &[f64], k: usize) -> Result<Vec<MemoryEntry>> {
        self.inner.read().retrieve(query, k)
    }

    pub fn update(&self, key: &[f64], value: Embedding) -> Result<()> {
        self.inner.write().update(key, value)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.read().size()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    pub fn embedding_dim(&self) -> usize {
        self.inner.read().embedding_dim()
    }
}

impl AssociativeMemory for SharedMemoryStore {
    fn insert(&mut self, key: Embedding, value: Embedding) -> Result<()> {
        SharedMemoryStore::insert(self, key, value)
    }

    fn retrieve(&self, query: &[f64], k: usize) -> Result<Vec<MemoryEntry>> {
        SharedMemoryStore::retrieve(self, query, k)
    }

    fn update(&mut self, key: &[f64], value: Embedding) -> Result<()> {
        SharedMemoryStore::update(self, key, value)
    }

    fn clear(&mut self) {
        SharedMemoryStore::clear(self)
    }

    fn size(&self) -> usize {
        SharedMemoryStore::size(self)
    }

    fn capacity(&self) -> usize {
        SharedMemoryStore::capacity(self)
    }

    fn embedding_dim(&self) -> usize {
        SharedMemoryStore::embedding_dim(self)
    }
}
