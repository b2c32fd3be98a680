//! File I/O: `read_at`/`write_at` over byte ranges, splitting into per-sector
//! operations through a bounce buffer for partial sectors. Generalizes the
//! teacher's `fs/ufs/inode.rs` `inode_read`/`inode_write`, which already split
//! on sector boundaries around a single-level `bmap`; here `offset_to_sector`
//! is the only thing that changed underneath.

use crate::alloc::SectorAllocator;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::itable::InodeHandle;
use crate::sector::{Sector, SECTOR_SIZE};

/// Reads up to `buf.len()` bytes starting at `offset`, stopping early at
/// end-of-file. Returns the number of bytes actually read.
pub fn read_at(handle: &InodeHandle, cache: &Cache, buf: &mut [u8], offset: usize) -> Result<usize> {
    let mut n = 0;
    let mut offset = offset;
    let mut remaining = buf.len();

    while remaining > 0 {
        let length = handle.with(|i| i.length()) as usize;
        if offset >= length {
            break;
        }
        let sector_id = match handle.with(|i| i.offset_to_sector(cache, &NullAllocator, offset, false)) {
            Ok(Some(s)) => s,
            Ok(None) => break,
            // Per spec.md §7, FileTooLarge is a short return, not a hard error.
            Err(Error::FileTooLarge) => break,
            Err(e) => return Err(e),
        };

        let sector_ofs = offset % SECTOR_SIZE;
        let inode_left = length - offset;
        let sector_left = SECTOR_SIZE - sector_ofs;
        let chunk = remaining.min(inode_left).min(sector_left);
        if chunk == 0 {
            break;
        }

        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            let mut out = Sector::zeroed();
            cache.read(sector_id, &mut out)?;
            buf[n..n + chunk].copy_from_slice(&out.0[..chunk]);
        } else {
            let mut bounce = Sector::zeroed();
            cache.read(sector_id, &mut bounce)?;
            buf[n..n + chunk].copy_from_slice(&bounce.0[sector_ofs..sector_ofs + chunk]);
        }

        offset += chunk;
        n += chunk;
        remaining -= chunk;
    }

    Ok(n)
}

/// Writes `buf` starting at `offset`, growing the file (via `offset_to_sector`'s
/// `for_write` path) when `offset` runs past the current length. Returns 0
/// immediately if the inode currently has `deny_write_count > 0`.
///
/// Updates `inode.length` to `max(old_length, offset + bytes_written)` once, at
/// the end of the write — per the design note in spec.md §9, not incrementally
/// as `extend` allocates sectors — and persists the `InodeDisk` record only if
/// anything was actually written.
///
/// Per spec.md §7, `OutOfSpace` (the allocator is exhausted mid-growth) and
/// `FileTooLarge` (the offset runs past `MAX_FILE_SIZE`) are both short
/// returns — `write_at` reports however many bytes it managed before hitting
/// either, rather than surfacing them as a hard error. Only a device/corruption
/// failure propagates as `Err`.
pub fn write_at(
    handle: &InodeHandle,
    cache: &Cache,
    alloc: &dyn SectorAllocator,
    buf: &[u8],
    offset: usize,
) -> Result<usize> {
    if handle.with(|i| i.deny_write_count) > 0 {
        return Ok(0);
    }

    let mut n = 0;
    let mut cursor = offset;
    let mut remaining = buf.len();

    while remaining > 0 {
        let sector_id = match handle.with(|i| i.offset_to_sector(cache, alloc, cursor, true)) {
            Ok(Some(s)) => s,
            Ok(None) => break,
            Err(Error::OutOfSpace) | Err(Error::FileTooLarge) => break,
            Err(e) => return Err(e),
        };

        let sector_ofs = cursor % SECTOR_SIZE;
        let chunk = remaining.min(SECTOR_SIZE - sector_ofs);

        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            let mut sector = Sector::zeroed();
            sector.0[..chunk].copy_from_slice(&buf[n..n + chunk]);
            cache.write(sector_id, &sector)?;
        } else {
            let mut bounce = Sector::zeroed();
            let needs_read = sector_ofs > 0 || chunk < SECTOR_SIZE - sector_ofs;
            if needs_read {
                cache.read(sector_id, &mut bounce)?;
            }
            bounce.0[sector_ofs..sector_ofs + chunk].copy_from_slice(&buf[n..n + chunk]);
            cache.write(sector_id, &bounce)?;
        }

        cursor += chunk;
        n += chunk;
        remaining -= chunk;
    }

    if n > 0 {
        handle.with(|i| {
            let new_length = (offset + n) as u32;
            if new_length > i.length() {
                i.set_length(new_length);
            }
        });
        handle.with(|i| i.persist(cache))?;
    }

    Ok(n)
}

/// Placeholder allocator used on the read path, which never grows a file and
/// therefore never calls `alloc`. `offset_to_sector` takes a `SectorAllocator`
/// reference unconditionally because the same method also serves `write_at`.
struct NullAllocator;

impl SectorAllocator for NullAllocator {
    fn alloc(&self, _n: u32) -> Option<crate::sector::SectorId> {
        None
    }

    fn release(&self, _sector: crate::sector::SectorId, _n: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::BumpAllocator;
    use crate::clock::FakeClock;
    use crate::device::MemDevice;
    use crate::index::InodeOpen;
    use crate::itable::InodeTable;

    fn fresh_cache() -> Cache {
        Cache::new(Box::new(MemDevice::new()), Box::new(FakeClock::new()))
    }

    /// spec.md §8 scenario 1.
    #[test]
    fn create_and_small_read() {
        let cache = fresh_cache();
        let allocator = BumpAllocator::new(100);
        InodeOpen::create(&cache, &allocator, 200, 10).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();

        let n = write_at(&handle, &cache, &allocator, b"hello", 0).unwrap();
        assert_eq!(n, 5);

        let mut buf = [0u8; 5];
        let read = read_at(&handle, &cache, &mut buf, 0).unwrap();
        assert_eq!(read, 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(handle.with(|i| i.length()), 10);
    }

    /// spec.md §8 scenario 2. The scenario reads 800 bytes starting at offset
    /// 400, which only fits within the file's length if the file is at least
    /// 1200 bytes long (the 1024-byte file named in the scenario text is
    /// internally inconsistent with an 800-byte read at offset 400); sized to
    /// 1200 here so the full 800-byte read is satisfiable.
    #[test]
    fn cross_sector_read_with_fill_pattern() {
        let cache = fresh_cache();
        let allocator = BumpAllocator::new(100);
        InodeOpen::create(&cache, &allocator, 200, 1200).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();

        let mut data = [0u8; 1200];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let written = write_at(&handle, &cache, &allocator, &data, 0).unwrap();
        assert_eq!(written, 1200);

        let mut buf = [0u8; 800];
        let n = read_at(&handle, &cache, &mut buf, 400).unwrap();
        assert_eq!(n, 800);
        for (k, b) in buf.iter().enumerate() {
            assert_eq!(*b, ((400 + k) % 251) as u8);
        }
    }

    /// spec.md §8 scenario 4.
    #[test]
    fn write_into_double_indirect_region_then_read_back() {
        let cache = fresh_cache();
        let allocator = BumpAllocator::new(100);
        InodeOpen::create(&cache, &allocator, 200, 0).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();

        let n = write_at(&handle, &cache, &allocator, b"Z", 70_000).unwrap();
        assert_eq!(n, 1);
        assert_eq!(handle.with(|i| i.length()), 70_001);

        let mut buf = [0u8; 1];
        let read = read_at(&handle, &cache, &mut buf, 70_000).unwrap();
        assert_eq!(read, 1);
        assert_eq!(buf[0], b'Z');

        let mut zero = [1u8; 64];
        let n = read_at(&handle, &cache, &mut zero, 69_000).unwrap();
        assert_eq!(n, 64);
        assert!(zero.iter().all(|&b| b == 0));
    }

    #[test]
    fn deny_write_blocks_write_at() {
        let cache = fresh_cache();
        let allocator = BumpAllocator::new(100);
        InodeOpen::create(&cache, &allocator, 200, 10).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();
        table.deny_write(&handle);

        let n = write_at(&handle, &cache, &allocator, b"hello", 0).unwrap();
        assert_eq!(n, 0);

        table.allow_write(&handle);
        let n = write_at(&handle, &cache, &allocator, b"hello", 0).unwrap();
        assert_eq!(n, 5);
    }

    /// spec.md §7: `OutOfSpace` during growth is a short return, not an `Err`.
    #[test]
    fn write_at_returns_short_on_out_of_space_instead_of_erroring() {
        let cache = fresh_cache();
        // Only 3 sectors available to the allocator; a 4-sector write can only
        // grow the file through the first 3 before the allocator is exhausted.
        let allocator = BumpAllocator::with_limit(100, 103);
        InodeOpen::create(&cache, &allocator, 200, 0).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();

        let data = [0xABu8; 4 * SECTOR_SIZE];
        let n = write_at(&handle, &cache, &allocator, &data, 0).unwrap();
        assert_eq!(n, 3 * SECTOR_SIZE);
        assert_eq!(handle.with(|i| i.length()), (3 * SECTOR_SIZE) as u32);

        let mut buf = [0u8; SECTOR_SIZE];
        let read = read_at(&handle, &cache, &mut buf, 0).unwrap();
        assert_eq!(read, SECTOR_SIZE);
        assert!(buf.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn growth_idempotence_same_write_twice_yields_same_bytes_and_length() {
        let cache = fresh_cache();
        let allocator = BumpAllocator::new(100);
        InodeOpen::create(&cache, &allocator, 200, 0).unwrap();

        let table = InodeTable::new();
        let handle = table.open(&cache, 200).unwrap();

        write_at(&handle, &cache, &allocator, b"abc", 10).unwrap();
        let length_after_first = handle.with(|i| i.length());
        write_at(&handle, &cache, &allocator, b"abc", 10).unwrap();
        let length_after_second = handle.with(|i| i.length());

        assert_eq!(length_after_first, length_after_second);
        assert_eq!(length_after_first, 13);

        let mut buf = [0u8; 3];
        read_at(&handle, &cache, &mut buf, 10).unwrap();
        assert_eq!(&buf, b"abc");
    }
}
