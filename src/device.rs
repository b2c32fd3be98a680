//! Block Device Adapter: the thin synchronous boundary the cache reads and writes
//! through. No caching and no partial sectors happen at this layer.

use crate::error::{Error, Result};
use crate::sector::{Sector, SectorId};

pub trait BlockDevice: Send + Sync {
    /// Fills `out` with the device contents of `sector`. Fails only on
    /// unrecoverable device error.
    fn read(&self, sector: SectorId, out: &mut Sector) -> Result<()>;

    /// Writes `data` to `sector`. Fails only on unrecoverable device error.
    fn write(&self, sector: SectorId, data: &Sector) -> Result<()>;
}

/// An in-memory block device, for tests and for exercising the crate without a
/// real driver underneath it. Grows on demand so callers don't need to know the
/// device size up front.
pub struct MemDevice {
    sectors: spin::Mutex<Vec<Sector>>,
    /// If set, every read/write past this call count fails with `Error::DeviceIo`,
    /// for exercising the `DeviceIo` error path.
    fail_after: spin::Mutex<Option<u64>>,
    calls: core::sync::atomic::AtomicU64,
}

impl MemDevice {
    pub fn new() -> Self {
        Self {
            sectors: spin::Mutex::new(Vec::new()),
            fail_after: spin::Mutex::new(None),
            calls: core::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Causes the `n`th and all later `read`/`write` calls to fail.
    pub fn fail_after(&self, n: u64) {
        *self.fail_after.lock() = Some(n);
    }

    fn bump_and_check(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
        if let Some(limit) = *self.fail_after.lock() {
            if n >= limit {
                return Err(Error::DeviceIo);
            }
        }
        Ok(())
    }

    fn ensure_len(sectors: &mut Vec<Sector>, sector: SectorId) {
        let idx = sector as usize;
        if sectors.len() <= idx {
            sectors.resize_with(idx + 1, Sector::zeroed);
        }
    }
}

impl Default for MemDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemDevice {
    fn read(&self, sector: SectorId, out: &mut Sector) -> Result<()> {
        self.bump_and_check()?;
        let mut sectors = self.sectors.lock();
        Self::ensure_len(&mut sectors, sector);
        out.0.copy_from_slice(&sectors[sector as usize].0);
        Ok(())
    }

    fn write(&self, sector: SectorId, data: &Sector) -> Result<()> {
        self.bump_and_check()?;
        let mut sectors = self.sectors.lock();
        Self::ensure_len(&mut sectors, sector);
        sectors[sector as usize].0.copy_from_slice(&data.0);
        Ok(())
    }
}
