//! Bounded, write-through LRU cache over the result log.
//!
//! # Layout
//!
//! Records live in a dense slot arena. A `job id -> slot` map gives O(1)
//! lookup, and a doubly linked list threaded through the slots by index
//! keeps recency order: `head` is the most recently used entry, `tail` the
//! least. Evicted slots go on a free list and are reused by later inserts,
//! so a full cache stops allocating slots.
//!
//! # Locking
//!
//! All list and map mutation happens under the cache's exclusive lock.
//! `get` refreshes recency and therefore also takes the exclusive lock;
//! [`BoundedCache::peek`] and the size accessors only take the shared lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::journal::{DurableStore, StoreResult};
use super::record::{JobId, ResultRecord};

/// Capacity used when the caller asks for zero entries.
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
struct Slot {
    record: ResultRecord,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena-backed recency list. Not synchronized; owned by [`BoundedCache`].
#[derive(Debug, Default)]
struct RecencyList {
    slots: Vec<Slot>,
    index: HashMap<JobId, usize>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyList {
    fn with_capacity(capacity: usize) -> Self {
        // Size hints are capped so a huge configured bound does not
        // allocate up front.
        let hint = capacity.min(DEFAULT_CAPACITY);
        Self {
            slots: Vec::with_capacity(hint),
            index: HashMap::with_capacity(hint),
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn slot_of(&self, job_id: &str) -> Option<usize> {
        self.index.get(job_id).copied()
    }

    fn record(&self, slot: usize) -> &ResultRecord {
        &self.slots[slot].record
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[slot].prev = None;
        self.slots[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = None;
        self.slots[slot].next = self.head;
        match self.head {
            Some(h) => self.slots[h].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn touch(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    /// Inserts or overwrites `record` and marks it most recently used.
    fn insert(&mut self, record: ResultRecord) {
        if let Some(slot) = self.slot_of(&record.job_id) {
            self.slots[slot].record = record;
            self.touch(slot);
            return;
        }

        let job_id = record.job_id.clone();
        let fresh = Slot {
            record,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = fresh;
                slot
            }
            None => {
                self.slots.push(fresh);
                self.slots.len() - 1
            }
        };
        self.push_front(slot);
        self.index.insert(job_id, slot);
    }

    /// Removes and returns the least recently used record.
    fn pop_lru(&mut self) -> Option<ResultRecord> {
        let slot = self.tail?;
        self.unlink(slot);
        let record = std::mem::take(&mut self.slots[slot].record);
        self.index.remove(&record.job_id);
        self.free.push(slot);
        Some(record)
    }

    fn keys_mru_first(&self) -> Vec<JobId> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            keys.push(self.slots[slot].record.job_id.clone());
            cursor = self.slots[slot].next;
        }
        keys
    }
}

/// Concurrency-safe LRU cache of [`ResultRecord`]s, bounded by entry count.
///
/// Every [`add`](Self::add) is written through to the [`DurableStore`], so
/// an entry evicted from memory can still be read back with
/// [`DurableStore::lookup`].
#[derive(Debug)]
pub struct BoundedCache {
    capacity: usize,
    state: RwLock<RecencyList>,
    store: Arc<DurableStore>,
}

impl BoundedCache {
    /// Create a cache holding at most `capacity` records.
    ///
    /// A capacity of zero is replaced by [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize, store: Arc<DurableStore>) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            capacity,
            state: RwLock::new(RecencyList::with_capacity(capacity)),
            store,
        }
    }

    /// Insert a record and append it to the durable store.
    ///
    /// Empty ids are ignored. The append happens while the exclusive lock is
    /// held, so the log order matches the order in which adds took effect.
    /// If the cache now exceeds its capacity, the least recently used entry
    /// is dropped from memory; it remains in the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the append fails. The in-memory insert
    /// is kept in that case, so readers of the cache still see the record
    /// even though it is not durable.
    pub fn add(&self, job_id: &str, salt: Vec<u8>, digest: Vec<u8>) -> StoreResult<()> {
        if job_id.is_empty() {
            log::debug!("Ignoring cache insert with empty job id");
            return Ok(());
        }
        log::debug!("Adding digest to cache for job {job_id:?}");

        let record = ResultRecord::new(job_id, salt, digest);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let persisted = self.store.append(&record);
        state.insert(record);

        while state.len() > self.capacity {
            if let Some(evicted) = state.pop_lru() {
                log::debug!("Evicted job {} from cache", evicted.job_id);
            }
        }
        drop(state);

        persisted
    }

    /// Fetch a record and mark it most recently used.
    ///
    /// A miss does not consult the durable store.
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<ResultRecord> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let slot = state.slot_of(job_id)?;
        state.touch(slot);
        Some(state.record(slot).clone())
    }

    /// Fetch a record without changing recency order.
    #[must_use]
    pub fn peek(&self, job_id: &str) -> Option<ResultRecord> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.slot_of(job_id).map(|slot| state.record(slot).clone())
    }

    /// Whether `job_id` is currently held in memory.
    #[must_use]
    pub fn contains(&self, job_id: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slot_of(job_id)
            .is_some()
    }

    /// Number of records currently held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records held in memory.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached job ids, most recently used first.
    #[must_use]
    pub fn keys_by_recency(&self) -> Vec<JobId> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys_mru_first()
    }

    /// The durable store behind this cache.
    #[must_use]
    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }
}
