//! Sector-level constants and the fixed-size buffer type shared by every layer.
//!
//! Mirrors the role of the teacher's `param.rs`: a single flat module of tunables
//! that every other module imports from, instead of scattering magic numbers.

use static_assertions::const_assert_eq;

/// Size, in bytes, of the smallest addressable unit of the block device.
pub const SECTOR_SIZE: usize = 512;

/// Maximum number of resident entries the buffer cache may hold at once.
pub const CACHE_CAPACITY: usize = 64;

/// Minimum time between periodic flushes, in seconds.
pub const FLUSH_INTERVAL_SECS: u64 = 30;

/// Number of direct block pointers in an `InodeDisk`.
pub const DIRECT_COUNT: usize = 10;
/// Number of data-sector pointers in an `IndirectBlock`.
pub const INDIRECT_COUNT: usize = 125;
/// Number of indirect-block pointers in a `DoubleIndirectBlock`.
pub const DBL_INDIRECT_CHILD_COUNT: usize = 125;

/// Total number of data sectors a single file can address.
pub const MAX_SECTORS: usize =
    DIRECT_COUNT + INDIRECT_COUNT + DBL_INDIRECT_CHILD_COUNT * INDIRECT_COUNT;
const_assert_eq!(MAX_SECTORS, 15_760);

/// Largest valid byte offset plus one: `write_at`/`read_at` past this are `FileTooLarge`.
pub const MAX_FILE_SIZE: usize = MAX_SECTORS * SECTOR_SIZE;
const_assert_eq!(MAX_FILE_SIZE, 8_069_120);

/// Magic value stamped into every `InodeDisk` so corrupt/foreign data is caught early.
pub const INODE_MAGIC: u32 = 0x494E_4F44;

/// Identifies a sector on one block device. The device identity itself is implicit:
/// one `Cache` instance corresponds to one device, as spec.md's CacheEntry note says.
pub type SectorId = u32;

/// One sector's worth of bytes, owned.
///
/// Plays the role the teacher's `BufData` plays in `bio.rs`: a fixed-size, 4-byte
/// aligned byte array that on-disk structs can be cast onto via `zerocopy`.
#[repr(align(4))]
#[derive(Clone)]
pub struct Sector(pub [u8; SECTOR_SIZE]);

impl Sector {
    pub const fn zeroed() -> Self {
        Self([0u8; SECTOR_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        &mut self.0
    }
}

impl Default for Sector {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl core::ops::Deref for Sector {
    type Target = [u8; SECTOR_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for Sector {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
