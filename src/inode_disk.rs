//! On-disk layouts for inodes and their indirect blocks.
//!
//! `repr(C)` plus `zerocopy`'s `AsBytes`/`FromBytes` give a byte-exact view over a
//! `Sector`, the same technique the teacher reaches for in `fs/ufs/inode.rs` for
//! `Dirent` (`#[repr(C)] #[derive(Default, AsBytes, FromBytes)]`), generalized here
//! to the fan-out structures this file system needs instead of xv6's single-level
//! `Dinode`.

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{Error, Result};
use crate::sector::{
    Sector, SectorId, DBL_INDIRECT_CHILD_COUNT, DIRECT_COUNT, INDIRECT_COUNT, INODE_MAGIC,
    SECTOR_SIZE,
};

/// Padding field count such that `InodeDisk` is exactly one sector. See the
/// design note in SPEC_FULL.md: the distilled spec's literal field tally came
/// four bytes short of 512; the sector-exact invariant wins.
const INODE_DISK_UNUSED: usize = 111;

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct InodeDisk {
    pub direct: [SectorId; DIRECT_COUNT],
    pub length: i32,
    pub self_sector: SectorId,
    pub indirect: SectorId,
    pub dbl_indirect: SectorId,
    pub indirect_used: u32,
    pub dbl_indirect_used: u32,
    pub magic: u32,
    unused: [u32; INODE_DISK_UNUSED],
}

const_assert_eq!(core::mem::size_of::<InodeDisk>(), SECTOR_SIZE);

impl InodeDisk {
    pub fn new(self_sector: SectorId, length: u32) -> Self {
        Self {
            direct: [0; DIRECT_COUNT],
            length: length as i32,
            self_sector,
            indirect: 0,
            dbl_indirect: 0,
            indirect_used: 0,
            dbl_indirect_used: 0,
            magic: INODE_MAGIC,
            unused: [0; INODE_DISK_UNUSED],
        }
    }

    pub fn from_sector(sector: &Sector) -> Result<Self> {
        let disk = Self::read_from(&sector.0[..]).expect("InodeDisk is sector-sized");
        if disk.magic != INODE_MAGIC {
            return Err(Error::Corrupt);
        }
        Ok(disk)
    }

    pub fn to_sector(&self) -> Sector {
        let mut sector = Sector::zeroed();
        sector.0.copy_from_slice(self.as_bytes());
        sector
    }

    pub fn length(&self) -> u32 {
        self.length as u32
    }
}

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct IndirectBlock {
    pub self_sector: SectorId,
    pub parent_sector: SectorId,
    pub length: i32,
    pub blocks: [SectorId; INDIRECT_COUNT],
}

const_assert_eq!(core::mem::size_of::<IndirectBlock>(), SECTOR_SIZE);

impl IndirectBlock {
    pub fn new(self_sector: SectorId, parent_sector: SectorId) -> Self {
        Self {
            self_sector,
            parent_sector,
            length: 0,
            blocks: [0; INDIRECT_COUNT],
        }
    }

    pub fn from_sector(sector: &Sector) -> Self {
        Self::read_from(&sector.0[..]).expect("IndirectBlock is sector-sized")
    }

    pub fn to_sector(&self) -> Sector {
        let mut sector = Sector::zeroed();
        sector.0.copy_from_slice(self.as_bytes());
        sector
    }
}

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct DoubleIndirectBlock {
    pub self_sector: SectorId,
    pub parent_sector: SectorId,
    pub length: i32,
    pub indirect: [SectorId; DBL_INDIRECT_CHILD_COUNT],
}

const_assert_eq!(core::mem::size_of::<DoubleIndirectBlock>(), SECTOR_SIZE);

impl DoubleIndirectBlock {
    pub fn new(self_sector: SectorId, parent_sector: SectorId) -> Self {
        Self {
            self_sector,
            parent_sector,
            length: 0,
            indirect: [0; DBL_INDIRECT_CHILD_COUNT],
        }
    }

    pub fn from_sector(sector: &Sector) -> Self {
        Self::read_from(&sector.0[..]).expect("DoubleIndirectBlock is sector-sized")
    }

    pub fn to_sector(&self) -> Sector {
        let mut sector = Sector::zeroed();
        sector.0.copy_from_slice(self.as_bytes());
        sector
    }
}
