// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backend node API consumed by the adapters
//!
//! The concrete document store lives outside this crate. These traits are
//! the seam: a [`NodeStore`] is one user's root, a [`RawTree`] is the
//! combined tree holding every user's root, and a [`RootResolver`] hands
//! both out to the factory.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::error::FsResult;
use crate::types::Node;

/// Read-write content stream returned by [`NodeStore::open_read_write`]
///
/// Writes become visible to other callers only once [`close`] succeeds.
///
/// [`close`]: ContentStream::close
pub trait ContentStream: Read + Write + Seek + Send {
    /// Resize the underlying content, zero-filling on growth.
    fn set_len(&mut self, len: u64) -> std::io::Result<()>;

    /// Persist buffered content and release the stream.
    fn close(self: Box<Self>) -> FsResult<()>;
}

/// One user's document store, addressed by root-relative paths
#[cfg_attr(test, mockall::automock)]
pub trait NodeStore: Send + Sync {
    /// Resolve `path` to a node snapshot.
    fn get(&self, path: &str) -> FsResult<Node>;

    fn new_file(&self, path: &str) -> FsResult<Node>;

    fn new_folder(&self, path: &str) -> FsResult<Node>;

    fn delete(&self, path: &str) -> FsResult<()>;

    /// Child names of the directory at `path`, in backend order.
    fn list(&self, path: &str) -> FsResult<Vec<String>>;

    fn read_content(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Replace the whole content of the file at `path`.
    fn put_content(&self, path: &str, data: &[u8]) -> FsResult<()>;

    fn open_read_write(&self, path: &str) -> FsResult<Box<dyn ContentStream>>;

    /// Bump the modification time of the node at `path`.
    fn touch(&self, path: &str) -> FsResult<()>;

    /// Move a node within this root. `Ok(false)` means the backend declined.
    fn move_node(&self, from: &str, to: &str) -> FsResult<bool>;

    /// Reload shared and cross-mount state for `identifier`.
    ///
    /// Shared content can change out of band; listings call this first.
    fn refresh_mounts(&self, identifier: &str) -> FsResult<()>;
}

/// Root-level view over every user's tree, used for cross-namespace moves
#[cfg_attr(test, mockall::automock)]
pub trait RawTree: Send + Sync {
    /// Move `from` to `to`, both absolute in the combined tree.
    fn move_path(&self, from: &str, to: &str) -> FsResult<bool>;
}

/// Hands out backend roots to the adapter factory
#[cfg_attr(test, mockall::automock)]
pub trait RootResolver: Send + Sync {
    /// Root folder of `identifier`; fails with `NotFound` for unknown users.
    fn user_root(&self, identifier: &str) -> FsResult<Arc<dyn NodeStore>>;

    fn raw_tree(&self) -> Arc<dyn RawTree>;
}
