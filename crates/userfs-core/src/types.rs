// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions shared by adapters, delegators and the dispatch table

use serde::{Deserialize, Serialize};

/// Kind of a backend node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// `S_IFMT` bits for this kind.
    pub fn type_bits(&self) -> u32 {
        match self {
            NodeKind::File => libc::S_IFREG as u32,
            NodeKind::Directory => libc::S_IFDIR as u32,
        }
    }
}

/// Snapshot of a backend node, valid only for the operation that resolved it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Path relative to the store root the node was resolved from
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    /// Modification time in seconds since the epoch
    pub mtime: i64,
    pub readable: bool,
    pub updatable: bool,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        !self.kind.is_dir()
    }
}

/// Owning ids reported in every stat; the backend has no POSIX owner concept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// Effective uid/gid of the mounting process.
    pub fn effective() -> Self {
        Self {
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }
}

/// Access/modification time pair, seconds resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
}

impl FileTimes {
    /// The backend tracks a single timestamp; access time mirrors it.
    pub fn mirrored(mtime: i64) -> Self {
        Self { atime: mtime, mtime }
    }
}

/// Stat structure synthesized per call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatInfo {
    pub kind: NodeKind,
    /// Permission bits only (no `S_IFMT`)
    pub perm: u32,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
}

impl StatInfo {
    /// Fixed permission bits of the synthesized root and per-user directories.
    pub const VIRTUAL_DIR_PERM: u32 = 0o755;

    /// Stat for a real backend node.
    ///
    /// Updatable nodes get owner read/write, readable ones owner read, and
    /// anything else no bits at all.
    pub fn for_node(node: &Node, owner: Owner) -> Self {
        let perm = if node.updatable {
            0o600
        } else if node.readable {
            0o400
        } else {
            0o000
        };
        Self {
            kind: node.kind,
            perm,
            nlink: 1,
            size: node.size,
            uid: owner.uid,
            gid: owner.gid,
            times: FileTimes::mirrored(node.mtime),
        }
    }

    /// Stat for a directory that exists only in the mounted view.
    pub fn virtual_dir(size: u64, mtime: i64, owner: Owner) -> Self {
        Self {
            kind: NodeKind::Directory,
            perm: Self::VIRTUAL_DIR_PERM,
            nlink: 1,
            size,
            uid: owner.uid,
            gid: owner.gid,
            times: FileTimes::mirrored(mtime),
        }
    }

    /// Full `st_mode` value (type bits | permission bits).
    pub fn mode(&self) -> u32 {
        self.kind.type_bits() | self.perm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(readable: bool, updatable: bool, kind: NodeKind) -> Node {
        Node {
            path: "/n".into(),
            name: "n".into(),
            kind,
            size: 11,
            mtime: 1_700_000_000,
            readable,
            updatable,
        }
    }

    const OWNER: Owner = Owner { uid: 1000, gid: 100 };

    #[test]
    fn permission_bits_follow_capabilities() {
        let rw = StatInfo::for_node(&node(true, true, NodeKind::File), OWNER);
        assert_eq!(rw.mode(), libc::S_IFREG as u32 | 0o600);

        let ro = StatInfo::for_node(&node(true, false, NodeKind::File), OWNER);
        assert_eq!(ro.perm, 0o400);

        let none = StatInfo::for_node(&node(false, false, NodeKind::Directory), OWNER);
        assert_eq!(none.mode(), libc::S_IFDIR as u32);
    }

    #[test]
    fn node_stat_mirrors_mtime_and_owner() {
        let stat = StatInfo::for_node(&node(true, true, NodeKind::File), OWNER);
        assert_eq!(stat.times.atime, stat.times.mtime);
        assert_eq!(stat.nlink, 1);
        assert_eq!(stat.size, 11);
        assert_eq!((stat.uid, stat.gid), (1000, 100));
    }

    #[test]
    fn virtual_dirs_use_fixed_bits() {
        let stat = StatInfo::virtual_dir(350, 42, OWNER);
        assert_eq!(stat.mode(), libc::S_IFDIR as u32 | 0o755);
        assert_eq!(stat.times, FileTimes::mirrored(42));
    }
}
