// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode bookkeeping for the kernel bridge
//!
//! The kernel speaks inodes; the operation table speaks paths. Inodes are
//! handed out on first sight of a path and kept until the kernel forgets
//! them or the path goes away.

use std::collections::HashMap;

use userfs_core::path;

/// Inode number the kernel uses for the mount root
pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
pub struct InodeTable {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.record("/".to_string(), ROOT_INODE);
        table
    }

    fn record(&mut self, path: String, inode: u64) {
        self.inodes.insert(path.clone(), inode);
        self.paths.insert(inode, path);
    }

    pub fn path(&self, inode: u64) -> Option<&str> {
        self.paths.get(&inode).map(String::as_str)
    }

    /// Path of `name` under the directory at `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        self.path(parent).map(|base| path::join(base, name))
    }

    pub fn get_or_alloc(&mut self, path: &str) -> u64 {
        if let Some(&inode) = self.inodes.get(path) {
            return inode;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        self.record(path.to_string(), inode);
        inode
    }

    pub fn forget(&mut self, inode: u64) {
        if inode == ROOT_INODE {
            return;
        }
        if let Some(path) = self.paths.remove(&inode) {
            self.inodes.remove(&path);
        }
    }

    /// Drop `path` and everything below it.
    pub fn remove(&mut self, path: &str) {
        let prefix = format!("{path}/");
        let doomed: Vec<u64> = self
            .inodes
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(_, &inode)| inode)
            .collect();
        for inode in doomed {
            self.forget(inode);
        }
    }

    /// Re-key `from` and its descendants under `to`, keeping their inodes.
    pub fn rename(&mut self, from: &str, to: &str) {
        self.remove(to);
        let prefix = format!("{from}/");
        let moved: Vec<(String, u64)> = self
            .inodes
            .iter()
            .filter(|(p, _)| p.as_str() == from || p.starts_with(&prefix))
            .map(|(p, &inode)| (p.clone(), inode))
            .collect();
        for (old, inode) in moved {
            self.inodes.remove(&old);
            let new = format!("{to}{}", &old[from.len()..]);
            self.record(new, inode);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preallocated_and_never_forgotten() {
        let mut table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE), Some("/"));
        table.forget(ROOT_INODE);
        assert_eq!(table.path(ROOT_INODE), Some("/"));
    }

    #[test]
    fn allocation_is_stable_per_path() {
        let mut table = InodeTable::new();
        let a = table.get_or_alloc("/alice");
        assert_eq!(table.get_or_alloc("/alice"), a);
        assert_ne!(table.get_or_alloc("/bob"), a);
        assert_eq!(table.child_path(a, "docs").as_deref(), Some("/alice/docs"));
        assert_eq!(table.child_path(ROOT_INODE, "x").as_deref(), Some("/x"));
        assert_eq!(table.child_path(999, "x"), None);
    }

    #[test]
    fn rename_moves_descendants() {
        let mut table = InodeTable::new();
        let dir = table.get_or_alloc("/alice/d");
        let file = table.get_or_alloc("/alice/d/f");
        let sibling = table.get_or_alloc("/alice/dd");

        table.rename("/alice/d", "/bob/d");
        assert_eq!(table.path(dir), Some("/bob/d"));
        assert_eq!(table.path(file), Some("/bob/d/f"));
        assert_eq!(table.path(sibling), Some("/alice/dd"));
    }

    #[test]
    fn remove_drops_subtree_only() {
        let mut table = InodeTable::new();
        let dir = table.get_or_alloc("/a");
        let child = table.get_or_alloc("/a/b");
        let other = table.get_or_alloc("/ab");
        table.remove("/a");
        assert_eq!(table.path(dir), None);
        assert_eq!(table.path(child), None);
        assert_eq!(table.path(other), Some("/ab"));
        assert_eq!(table.len(), 2);
    }
}
