//! Buffer Cache.
//!
//! A bounded, write-back cache of fixed-size sectors, indexed by sector number,
//! evicted by LRU, periodically flushed. Plays the role the teacher's `bio.rs` /
//! `arena::MruArena` play, but as a single value a filesystem instance owns and
//! passes to its collaborators (per the "no global mutable state" design note in
//! spec.md §9), rather than a process-wide static arena.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::device::BlockDevice;
use crate::error::Result;
use crate::sector::{Sector, SectorId, CACHE_CAPACITY};
use crate::clock::Clock;

struct CacheEntry {
    data: Sector,
    dirty: bool,
    accessed: bool,
}

struct CacheInner {
    entries: HashMap<SectorId, CacheEntry>,
    /// Front = most-recently-used.
    order: VecDeque<SectorId>,
    capacity: usize,
    disk_accesses: u64,
    total_accesses: u64,
    last_flush: Instant,
}

impl CacheInner {
    fn touch_mru(&mut self, sector: SectorId) {
        if let Some(pos) = self.order.iter().position(|&s| s == sector) {
            self.order.remove(pos);
        }
        self.order.push_front(sector);
    }

    /// Evicts the tail entry, writing it back first if dirty. Frees its memory
    /// unconditionally: the teacher's `cache_evict` only freed `data` on the
    /// dirty path, which spec.md §9 calls out as a bug to not repeat.
    fn evict_one(&mut self, device: &dyn BlockDevice) -> Result<()> {
        let victim = match self.order.pop_back() {
            Some(s) => s,
            None => return Ok(()),
        };
        if let Some(entry) = self.entries.remove(&victim) {
            if entry.dirty {
                device.write(victim, &entry.data)?;
                self.disk_accesses += 1;
            }
            // `entry` is dropped here on every path, dirty or not.
        }
        Ok(())
    }

    fn is_full(&self) -> bool {
        // `cache_is_full` in the source was at one point hardcoded to `false`,
        // disabling eviction entirely; spec.md §9 calls that out as a bug. This
        // is the corrected "full iff count >= capacity" semantics.
        self.entries.len() >= self.capacity
    }
}

pub struct Cache {
    device: Box<dyn BlockDevice>,
    clock: Box<dyn Clock>,
    inner: spin::Mutex<CacheInner>,
}

impl Cache {
    /// Builds a cache with the standard `CACHE_CAPACITY` (64) entries.
    pub fn new(device: Box<dyn BlockDevice>, clock: Box<dyn Clock>) -> Self {
        Self::with_capacity(device, clock, CACHE_CAPACITY)
    }

    /// Builds a cache with a caller-chosen capacity, for tests that want to
    /// exercise eviction without filling 64 entries first.
    pub fn with_capacity(device: Box<dyn BlockDevice>, clock: Box<dyn Clock>, capacity: usize) -> Self {
        let now = clock.now();
        Self {
            device,
            clock,
            inner: spin::Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
                disk_accesses: 0,
                total_accesses: 0,
                last_flush: now,
            }),
        }
    }

    /// Reads `sector` into `out`. Resident sectors are served from cache and
    /// promoted to MRU; misses fetch through the block device and are inserted
    /// as clean entries.
    pub fn read(&self, sector: SectorId, out: &mut Sector) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.total_accesses += 1;

        if let Some(entry) = inner.entries.get_mut(&sector) {
            entry.accessed = true;
            out.0.copy_from_slice(&entry.data.0);
            inner.touch_mru(sector);
            return Ok(());
        }

        // Miss: fetch from device, evicting if at capacity, then insert clean.
        let mut fetched = Sector::zeroed();
        self.device.read(sector, &mut fetched)?;
        inner.disk_accesses += 1;

        if inner.is_full() {
            inner.evict_one(self.device.as_ref())?;
        }
        out.0.copy_from_slice(&fetched.0);
        inner.entries.insert(
            sector,
            CacheEntry {
                data: fetched,
                dirty: false,
                accessed: true,
            },
        );
        inner.touch_mru(sector);
        Ok(())
    }

    /// Overwrites `sector` with `data`. Resident sectors are mutated in place
    /// (the teacher's `cache_write` additionally performed a no-op hash-replace
    /// on a hit; spec.md §9 calls that out, so here a hit only mutates). A miss
    /// is write-allocated without a prior read — correct only for full-sector
    /// writes; partial writes must go through the bounce buffer in `file_io`.
    pub fn write(&self, sector: SectorId, data: &Sector) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.total_accesses += 1;

        if let Some(entry) = inner.entries.get_mut(&sector) {
            entry.data.0.copy_from_slice(&data.0);
            entry.dirty = true;
            entry.accessed = true;
            inner.touch_mru(sector);
            return Ok(());
        }

        if inner.is_full() {
            inner.evict_one(self.device.as_ref())?;
        }
        inner.entries.insert(
            sector,
            CacheEntry {
                data: data.clone(),
                dirty: true,
                accessed: true,
            },
        );
        inner.touch_mru(sector);
        Ok(())
    }

    /// Evicts every resident entry, writing dirty ones through the device first.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        while !inner.order.is_empty() {
            inner.evict_one(self.device.as_ref())?;
        }
        inner.last_flush = self.clock.now();
        Ok(())
    }

    /// Consults the clock; if `FLUSH_INTERVAL_SECS` have elapsed since the last
    /// flush, flushes and records the new time. Intended to be invoked from a
    /// timer tick, but — per spec.md §5 — the actual flush work must run outside
    /// interrupt context; this method does not know or care whether it is
    /// called from one, that's the caller's responsibility.
    pub fn tick(&self) -> Result<()> {
        let should_flush = {
            let inner = self.inner.lock();
            self.clock.now().duration_since(inner.last_flush)
                >= Duration::from_secs(crate::sector::FLUSH_INTERVAL_SECS)
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    pub fn disk_accesses(&self) -> u64 {
        self.inner.lock().disk_accesses
    }

    pub fn total_accesses(&self) -> u64 {
        self.inner.lock().total_accesses
    }

    /// Number of sectors currently resident. Exposed for tests asserting the
    /// "at most `CACHE_CAPACITY` entries" and "index and LRU order agree"
    /// invariants from spec.md §8.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_resident(&self, sector: SectorId) -> bool {
        self.inner.lock().entries.contains_key(&sector)
    }
}
