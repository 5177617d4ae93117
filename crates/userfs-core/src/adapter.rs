// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Single-root adapter: filesystem operations against one user's store
//!
//! Every call re-resolves its node by path, so the adapter keeps no open
//! handles and `open`/`flush` have nothing to do.

use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::NodeStore;
use crate::config::WriteOffsetMode;
use crate::error::{FsError, FsResult};
use crate::ops::UserFilesystem;
use crate::table::{Operation, ADAPTER_OPERATIONS};
use crate::types::{FileTimes, Owner, StatInfo};

pub struct UserAdapter {
    identifier: String,
    root: Arc<dyn NodeStore>,
    owner: Owner,
    write_mode: WriteOffsetMode,
}

impl UserAdapter {
    pub fn new(identifier: impl Into<String>, root: Arc<dyn NodeStore>) -> Self {
        Self {
            identifier: identifier.into(),
            root,
            owner: Owner::effective(),
            write_mode: WriteOffsetMode::default(),
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteOffsetMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Byte size of the node at `path`, or 0 when it does not resolve.
    pub fn node_size(&self, path: &str) -> u64 {
        match self.root.get(path) {
            Ok(node) => node.size,
            Err(err) => {
                debug!(target: "userfs::adapter", user = %self.identifier, path, error = %err, "size lookup failed");
                0
            }
        }
    }

    /// Modification time of the node at `path`, or 0 when it does not resolve.
    pub fn node_mtime(&self, path: &str) -> i64 {
        match self.root.get(path) {
            Ok(node) => node.mtime,
            Err(err) => {
                debug!(target: "userfs::adapter", user = %self.identifier, path, error = %err, "mtime lookup failed");
                0
            }
        }
    }

    /// Ask the backend to reload shared and cross-mount state for this user.
    pub fn refresh_mounts(&self) -> FsResult<()> {
        self.root.refresh_mounts(&self.identifier)
    }

    fn resize_via_stream(&self, path: &str, length: u64) -> FsResult<()> {
        let mut stream = self.root.open_read_write(path)?;
        stream.set_len(length)?;
        stream.close()?;
        self.root.touch(path)
    }

    fn resolve_file(&self, path: &str) -> FsResult<()> {
        let node = self.root.get(path)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(())
    }
}

impl UserFilesystem for UserAdapter {
    fn operations(&self) -> &'static [Operation] {
        ADAPTER_OPERATIONS
    }

    fn getattr(&self, path: &str) -> FsResult<StatInfo> {
        let node = self.root.get(path)?;
        Ok(StatInfo::for_node(&node, self.owner))
    }

    fn mknod(&self, path: &str, _mode: u32, _dev: u64) -> FsResult<()> {
        self.root.new_file(path).map(|_| ())
    }

    fn mkdir(&self, path: &str, _mode: u32) -> FsResult<()> {
        self.root.new_folder(path).map(|_| ())
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        self.root.get(path)?;
        self.root.delete(path)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        if !self.root.get(path)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.root.delete(path)
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        if self.root.move_node(from, to)? {
            Ok(())
        } else {
            warn!(target: "userfs::adapter", user = %self.identifier, from, to, "backend declined move");
            Err(FsError::NotPermitted)
        }
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        info!(target: "userfs::adapter", user = %self.identifier, path, mode = %format!("{mode:o}"), "chmod ignored");
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        info!(target: "userfs::adapter", user = %self.identifier, path, uid, gid, "chown ignored");
        Ok(())
    }

    fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        self.resolve_file(path)?;
        if length == 0 {
            self.root.put_content(path, &[])
        } else {
            self.resize_via_stream(path, length)
        }
    }

    fn ftruncate(&self, path: &str, length: u64) -> FsResult<()> {
        self.resolve_file(path)?;
        self.resize_via_stream(path, length)
    }

    fn utime(&self, path: &str) -> FsResult<FileTimes> {
        let node = self.root.get(path)?;
        Ok(FileTimes::mirrored(node.mtime))
    }

    fn open(&self, _path: &str, _flags: i32) -> FsResult<()> {
        Ok(())
    }

    fn read(&self, path: &str, size: u64, offset: u64) -> FsResult<Vec<u8>> {
        self.resolve_file(path)?;
        let content = self.root.read_content(path)?;
        let len = content.len() as u64;
        if offset >= len {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(size).min(len);
        Ok(content[offset as usize..end as usize].to_vec())
    }

    fn write(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let node = self.root.get(path)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if !node.updatable {
            return Err(FsError::NotPermitted);
        }

        let mut stream = self.root.open_read_write(path)?;
        let target = match (self.write_mode, offset) {
            (WriteOffsetMode::Legacy, 0) => SeekFrom::End(0),
            (_, offset) => SeekFrom::Start(offset),
        };
        stream.seek(target)?;
        stream.write_all(data)?;
        stream.close()?;
        self.root.touch(path)?;
        Ok(data.len())
    }

    fn flush(&self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        if let Err(err) = self.refresh_mounts() {
            warn!(target: "userfs::adapter", user = %self.identifier, error = %err, "mount refresh failed");
        }
        let node = self.root.get(path)?;
        if !node.is_dir() {
            return Err(FsError::NotFound);
        }
        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(self.root.list(path)?);
        Ok(entries)
    }
}
