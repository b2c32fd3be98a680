//! Sector-addressable file storage core: a write-back buffer cache plus a
//! multi-level indexed inode layer, generalized from the teacher's xv6-style
//! `bio.rs` + `fs/ufs/inode.rs` pair. The directory layer, path resolution,
//! free-space allocator, and block device driver are external collaborators,
//! consumed here only through the `SectorAllocator`/`BlockDevice`/`Clock`
//! traits.

pub mod alloc;
pub mod cache;
pub mod clock;
pub mod device;
pub mod error;
pub mod file_io;
pub mod index;
pub mod inode_disk;
pub mod itable;
pub mod sector;

use crate::alloc::SectorAllocator;
use crate::cache::Cache;
use crate::clock::Clock;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::index::InodeOpen;
use crate::itable::{InodeHandle, InodeTable};
use crate::sector::SectorId;

/// Facade over the buffer cache and inode table, matching the surface spec.md
/// §6 exposes to the directory layer: `inode_init`/`inode_create`/`inode_open`/
/// `inode_reopen`/`inode_close`/`inode_remove`/`inode_read_at`/`inode_write_at`/
/// `inode_deny_write`/`inode_allow_write`/`inode_length`/`inode_get_inumber`/
/// `cache.init`/`cache.flush`, spelled as methods on one owned value instead of
/// free functions over global state (see the "no global mutable state" design
/// note in spec.md §9).
pub struct FileSystem {
    cache: Cache,
    allocator: Box<dyn SectorAllocator>,
    table: InodeTable,
}

impl FileSystem {
    /// `inode_init` / `cache.init`: wires a device, clock, and allocator
    /// together into a fresh, empty filesystem instance.
    pub fn init(device: Box<dyn BlockDevice>, clock: Box<dyn Clock>, allocator: Box<dyn SectorAllocator>) -> Self {
        Self {
            cache: Cache::new(device, clock),
            allocator,
            table: InodeTable::new(),
        }
    }

    /// `inode_create(sector, length) -> bool` in spec.md's signature; returns
    /// `Result<()>` here instead of swallowing the failure reason into a bool.
    pub fn create(&self, sector: SectorId, length: u32) -> Result<()> {
        InodeOpen::create(&self.cache, self.allocator.as_ref(), sector, length)?;
        Ok(())
    }

    pub fn open(&self, sector: SectorId) -> Result<InodeHandle> {
        self.table.open(&self.cache, sector)
    }

    pub fn reopen(&self, handle: &InodeHandle) -> InodeHandle {
        self.table.reopen(handle)
    }

    pub fn close(&self, handle: InodeHandle) -> Result<()> {
        self.table.close(handle, &self.cache, self.allocator.as_ref())
    }

    pub fn remove(&self, handle: &InodeHandle) {
        self.table.remove(handle)
    }

    pub fn read_at(&self, handle: &InodeHandle, buf: &mut [u8], offset: usize) -> Result<usize> {
        file_io::read_at(handle, &self.cache, buf, offset)
    }

    pub fn write_at(&self, handle: &InodeHandle, buf: &[u8], offset: usize) -> Result<usize> {
        file_io::write_at(handle, &self.cache, self.allocator.as_ref(), buf, offset)
    }

    pub fn deny_write(&self, handle: &InodeHandle) {
        self.table.deny_write(handle)
    }

    pub fn allow_write(&self, handle: &InodeHandle) {
        self.table.allow_write(handle)
    }

    pub fn length(&self, handle: &InodeHandle) -> u32 {
        handle.with(|i| i.length())
    }

    /// `inode_get_inumber`: the sector an inode's `InodeDisk` record lives at
    /// doubles as its stable identifier, same as xv6's inode number.
    pub fn get_inumber(&self, handle: &InodeHandle) -> SectorId {
        handle.sector
    }

    /// `cache.flush`.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush()
    }

    /// Drives the periodic-flush timer path; see the concurrency note in
    /// spec.md §5 about running this outside interrupt context.
    pub fn tick(&self) -> Result<()> {
        self.cache.tick()
    }

    pub fn disk_accesses(&self) -> u64 {
        self.cache.disk_accesses()
    }

    pub fn total_accesses(&self) -> u64 {
        self.cache.total_accesses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::BumpAllocator;
    use crate::clock::FakeClock;
    use crate::device::MemDevice;

    fn fresh_fs() -> FileSystem {
        FileSystem::init(
            Box::new(MemDevice::new()),
            Box::new(FakeClock::new()),
            Box::new(BumpAllocator::new(100)),
        )
    }

    #[test]
    fn end_to_end_create_write_read_remove() {
        let fs = fresh_fs();
        fs.create(0, 10).unwrap();
        let inode = fs.open(0).unwrap();

        assert_eq!(fs.write_at(&inode, b"hello", 0).unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(fs.read_at(&inode, &mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fs.length(&inode), 10);
        assert_eq!(fs.get_inumber(&inode), 0);

        fs.remove(&inode);
        fs.close(inode).unwrap();
    }

    #[test]
    fn reopen_shares_state_and_keeps_inode_alive_until_last_close() {
        let fs = fresh_fs();
        fs.create(0, 0).unwrap();
        let a = fs.open(0).unwrap();
        let b = fs.reopen(&a);

        fs.remove(&a);
        fs.close(a).unwrap();
        // b still holds it open; a second open must reuse the live entry.
        let c = fs.open(0).unwrap();
        fs.write_at(&c, b"x", 0).unwrap();
        assert_eq!(fs.length(&b), 1);

        fs.close(b).unwrap();
        fs.close(c).unwrap();
    }
}
