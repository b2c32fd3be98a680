//! Error kinds surfaced by the cache and inode layers.
//!
//! No external error-derive crate appears anywhere in the teacher's dependency
//! graph (a no_std kernel has nowhere to send a formatted `Display` impl other
//! than its own console), so this stays a hand-written enum, as `stat.rs` and
//! `fcntl.rs` do for their small on-the-wire types.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The sector allocator returned `None`.
    OutOfSpace,
    /// The requested offset is at or beyond `MAX_FILE_SIZE`.
    FileTooLarge,
    /// The block device adapter failed to complete a read or write.
    DeviceIo,
    /// `write_at` was called while `deny_write_count > 0`.
    WriteDenied,
    /// An on-disk structure failed its magic/bounds check on load.
    Corrupt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::OutOfSpace => "sector allocator is out of space",
            Error::FileTooLarge => "offset exceeds the maximum file size",
            Error::DeviceIo => "block device I/O error",
            Error::WriteDenied => "write denied on this inode",
            Error::Corrupt => "on-disk structure failed validation",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
