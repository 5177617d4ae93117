// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-based filesystem operations trait
//!
//! Every operation the dispatch library can invoke has a default body that
//! fails with [`FsError::NotImplemented`]. Implementors override only the
//! operations they actually support.

use crate::error::{FsError, FsResult};
use crate::table::Operation;
use crate::types::{FileTimes, StatInfo};

/// Filesystem reachable through an [`OperationTable`](crate::table::OperationTable)
///
/// Paths are absolute within the filesystem being called (`/` is its root).
pub trait UserFilesystem: Send + Sync {
    /// Operations registered with the dispatch library for this filesystem.
    fn operations(&self) -> &'static [Operation];

    /// Connection setup. May be called once per mount session.
    fn init(&self) -> FsResult<()> {
        Ok(())
    }

    fn destroy(&self) {}

    fn getattr(&self, _path: &str) -> FsResult<StatInfo> {
        Err(FsError::NotImplemented)
    }

    fn readlink(&self, _path: &str) -> FsResult<String> {
        Err(FsError::NotImplemented)
    }

    fn mknod(&self, _path: &str, _mode: u32, _dev: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn mkdir(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn unlink(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn rmdir(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn symlink(&self, _path: &str, _target: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn rename(&self, _from: &str, _to: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn link(&self, _path: &str, _target: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn chmod(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn truncate(&self, _path: &str, _length: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn ftruncate(&self, _path: &str, _length: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Times to report back for a `utime` call.
    fn utime(&self, _path: &str) -> FsResult<FileTimes> {
        Err(FsError::NotImplemented)
    }

    fn open(&self, _path: &str, _flags: i32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Read up to `size` bytes at `offset`; the returned length is the clamped size.
    fn read(&self, _path: &str, _size: u64, _offset: u64) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    /// Write `data` at `offset`, returning the number of bytes written.
    fn write(&self, _path: &str, _data: &[u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::NotImplemented)
    }

    fn flush(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn release(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn fsync(&self, _path: &str, _datasync: bool) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Directory entries, `.` and `..` first.
    fn readdir(&self, _path: &str) -> FsResult<Vec<String>> {
        Err(FsError::NotImplemented)
    }

    fn opendir(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn releasedir(&self, _path: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn access(&self, _path: &str, _mask: i32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn create(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn getxattr(&self, _path: &str, _name: &str) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    fn removexattr(&self, _path: &str, _name: &str) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl UserFilesystem for Bare {
        fn operations(&self) -> &'static [Operation] {
            &[]
        }
    }

    #[test]
    fn unsupported_operations_default_to_not_implemented() {
        let fs = Bare;
        assert!(fs.init().is_ok());
        assert!(matches!(fs.getattr("/"), Err(FsError::NotImplemented)));
        assert!(matches!(fs.symlink("/a", "/b"), Err(FsError::NotImplemented)));
        assert!(matches!(fs.getxattr("/a", "user.x"), Err(FsError::NotImplemented)));
        assert!(matches!(fs.write("/a", b"x", 0), Err(FsError::NotImplemented)));
    }
}
