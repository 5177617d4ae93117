// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Multi-root delegator
//!
//! Presents several user adapters as one tree. `/` and `/{id}` are
//! synthesized here and never reach a backend; deeper paths lose their
//! leading segment and are forwarded to the adapter registered under it.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::adapter::UserAdapter;
use crate::backend::RawTree;
use crate::error::{FsError, FsResult};
use crate::ops::UserFilesystem;
use crate::path;
use crate::table::{Operation, DELEGATOR_OPERATIONS};
use crate::types::{FileTimes, Owner, StatInfo};

pub struct Delegator {
    /// Registration order is listing order.
    adapters: Vec<(String, Arc<UserAdapter>)>,
    raw_tree: Arc<dyn RawTree>,
    content_prefix: String,
    owner: Owner,
}

impl Delegator {
    pub fn new(raw_tree: Arc<dyn RawTree>, content_prefix: impl Into<String>) -> Self {
        Self {
            adapters: Vec::new(),
            raw_tree,
            content_prefix: content_prefix.into(),
            owner: Owner::effective(),
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    /// Register `adapter` under its identifier, replacing any previous one.
    pub fn add_adapter(&mut self, adapter: UserAdapter) {
        let id = adapter.identifier().to_string();
        let adapter = Arc::new(adapter);
        match self.adapters.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                warn!(target: "userfs::delegator", user = %id, "replacing registered adapter");
                slot.1 = adapter;
            }
            None => {
                debug!(target: "userfs::delegator", user = %id, "adapter registered");
                self.adapters.push((id, adapter));
            }
        }
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(|(id, _)| id.as_str())
    }

    pub fn adapter(&self, identifier: &str) -> Option<&Arc<UserAdapter>> {
        self.adapters.iter().find(|(id, _)| id == identifier).map(|(_, a)| a)
    }

    fn registered(&self, identifier: Option<&str>) -> FsResult<&Arc<UserAdapter>> {
        identifier.and_then(|id| self.adapter(id)).ok_or_else(|| {
            trace!(target: "userfs::delegator", ?identifier, "no adapter for identifier");
            FsError::NotImplemented
        })
    }

    /// Adapter and backend-relative path for a second-level-or-deeper path.
    fn route(&self, path: &str) -> FsResult<(&UserAdapter, String)> {
        if path::is_root_or_first_level(path) {
            return Err(FsError::NotImplemented);
        }
        let adapter = self.registered(path::first_segment(path))?;
        Ok((adapter.as_ref(), path::strip_first_segment(path)))
    }

    fn combined_size(&self) -> u64 {
        self.adapters
            .iter()
            .map(|(id, adapter)| {
                if let Err(err) = adapter.refresh_mounts() {
                    warn!(target: "userfs::delegator", user = %id, error = %err, "mount refresh failed");
                }
                adapter.node_size("/")
            })
            .sum()
    }

    /// Oldest root mtime across users; 0 with no users registered.
    fn earliest_mtime(&self) -> i64 {
        self.adapters
            .iter()
            .map(|(_, adapter)| adapter.node_mtime("/"))
            .min()
            .unwrap_or(0)
    }

    /// Absolute path of `rest` inside `identifier`'s content in the combined tree.
    fn raw_content_path(&self, identifier: &str, rest: &str) -> String {
        path::join(&format!("/{identifier}/{}", self.content_prefix), rest)
    }
}

impl UserFilesystem for Delegator {
    fn operations(&self) -> &'static [Operation] {
        DELEGATOR_OPERATIONS
    }

    fn init(&self) -> FsResult<()> {
        for (_, adapter) in &self.adapters {
            adapter.init()?;
        }
        Ok(())
    }

    fn destroy(&self) {
        for (_, adapter) in &self.adapters {
            adapter.destroy();
        }
    }

    fn getattr(&self, path: &str) -> FsResult<StatInfo> {
        if path::is_root(path) {
            return Ok(StatInfo::virtual_dir(
                self.combined_size(),
                self.earliest_mtime(),
                self.owner,
            ));
        }
        if path::is_first_level(path) {
            let adapter = self.registered(path::first_segment(path))?;
            return Ok(StatInfo::virtual_dir(
                adapter.node_size("/"),
                adapter.node_mtime("/"),
                self.owner,
            ));
        }
        let (adapter, rest) = self.route(path)?;
        adapter.getattr(&rest)
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        if path::is_root(path) {
            let mut entries = vec![".".to_string(), "..".to_string()];
            entries.extend(self.identifiers().map(str::to_string));
            return Ok(entries);
        }
        if path::is_first_level(path) {
            return self.registered(path::first_segment(path))?.readdir("/");
        }
        let (adapter, rest) = self.route(path)?;
        adapter.readdir(&rest)
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let (source, from_rest) = self.route(from)?;
        let (target, to_rest) = self.route(to)?;
        if source.identifier() == target.identifier() {
            return source.rename(&from_rest, &to_rest);
        }

        let raw_from = self.raw_content_path(source.identifier(), &from_rest);
        let raw_to = self.raw_content_path(target.identifier(), &to_rest);
        debug!(target: "userfs::delegator", from = %raw_from, to = %raw_to, "cross-namespace move");
        if self.raw_tree.move_path(&raw_from, &raw_to)? {
            Ok(())
        } else {
            warn!(target: "userfs::delegator", from = %raw_from, to = %raw_to, "raw move declined");
            Err(FsError::NotPermitted)
        }
    }

    fn link(&self, path: &str, target: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        let (other, target_rest) = self.route(target)?;
        if adapter.identifier() != other.identifier() {
            return Err(FsError::NotImplemented);
        }
        adapter.link(&rest, &target_rest)
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        let (adapter, rest) = self.route(path)?;
        adapter.readlink(&rest)
    }

    fn mknod(&self, path: &str, mode: u32, dev: u64) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.mknod(&rest, mode, dev)
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.mkdir(&rest, mode)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.unlink(&rest)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.rmdir(&rest)
    }

    fn symlink(&self, path: &str, target: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.symlink(&rest, target)
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.chmod(&rest, mode)
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.chown(&rest, uid, gid)
    }

    fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.truncate(&rest, length)
    }

    fn ftruncate(&self, path: &str, length: u64) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.ftruncate(&rest, length)
    }

    fn utime(&self, path: &str) -> FsResult<FileTimes> {
        let (adapter, rest) = self.route(path)?;
        adapter.utime(&rest)
    }

    fn open(&self, path: &str, flags: i32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.open(&rest, flags)
    }

    fn read(&self, path: &str, size: u64, offset: u64) -> FsResult<Vec<u8>> {
        let (adapter, rest) = self.route(path)?;
        adapter.read(&rest, size, offset)
    }

    fn write(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let (adapter, rest) = self.route(path)?;
        adapter.write(&rest, data, offset)
    }

    fn flush(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.flush(&rest)
    }

    fn release(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.release(&rest)
    }

    fn fsync(&self, path: &str, datasync: bool) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.fsync(&rest, datasync)
    }

    fn opendir(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.opendir(&rest)
    }

    fn releasedir(&self, path: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.releasedir(&rest)
    }

    fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.access(&rest, mask)
    }

    fn create(&self, path: &str, mode: u32) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.create(&rest, mode)
    }

    fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        let (adapter, rest) = self.route(path)?;
        adapter.getxattr(&rest, name)
    }

    fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        let (adapter, rest) = self.route(path)?;
        adapter.removexattr(&rest, name)
    }
}
