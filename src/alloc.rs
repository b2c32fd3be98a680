//! Sector Allocator collaborator: opaque free-space management the inode index
//! consumes but does not implement. Renamed from `core::alloc` on purpose — this
//! allocates device sectors, not memory.

use crate::sector::SectorId;

pub trait SectorAllocator: Send + Sync {
    /// Reserves `n` contiguous sectors, returning the first one, or `None` if no
    /// run of `n` free sectors exists.
    fn alloc(&self, n: u32) -> Option<SectorId>;

    /// Releases the `n` contiguous sectors starting at `sector`.
    fn release(&self, sector: SectorId, n: u32);

    /// Convenience for the common case, per spec.md §4.3.
    fn alloc_one(&self) -> Option<SectorId> {
        self.alloc(1)
    }
}

/// A bump-pointer allocator that never reuses released sectors. Simple enough to
/// reason about in tests, and enough to drive every scenario in spec.md §8; it
/// deliberately does not try to be the production free-space allocator, which
/// spec.md explicitly scopes out of this crate.
pub struct BumpAllocator {
    next: spin::Mutex<SectorId>,
    limit: Option<SectorId>,
}

impl BumpAllocator {
    pub fn new(start: SectorId) -> Self {
        Self {
            next: spin::Mutex::new(start),
            limit: None,
        }
    }

    /// Caps the allocator so out-of-space scenarios can be exercised.
    pub fn with_limit(start: SectorId, limit: SectorId) -> Self {
        Self {
            next: spin::Mutex::new(start),
            limit: Some(limit),
        }
    }
}

impl SectorAllocator for BumpAllocator {
    fn alloc(&self, n: u32) -> Option<SectorId> {
        let mut next = self.next.lock();
        let start = *next;
        let end = start.checked_add(n)?;
        if let Some(limit) = self.limit {
            if end > limit {
                return None;
            }
        }
        *next = end;
        Some(start)
    }

    fn release(&self, _sector: SectorId, _n: u32) {
        // Bump allocators never reclaim; releases are no-ops, same as leaking.
    }
}
