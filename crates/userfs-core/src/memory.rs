// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory document store implementing the backend node API
//!
//! A single tree shaped `/{identifier}/{content_prefix}/...` backs every
//! user root, so cross-namespace moves through [`RawTree`] behave like the
//! real combined view. Lock contention and read-only nodes can be injected
//! for tests.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::{ContentStream, NodeStore, RawTree, RootResolver};
use crate::config::MountConfig;
use crate::error::{FsError, FsResult};
use crate::path;
use crate::types::{Node, NodeKind};

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[derive(Clone, Debug)]
struct Entry {
    kind: NodeKind,
    content: Vec<u8>,
    mtime: i64,
    /// Child names in creation order
    children: Vec<String>,
    readable: bool,
    updatable: bool,
}

impl Entry {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            content: Vec::new(),
            mtime: now(),
            children: Vec::new(),
            readable: true,
            updatable: true,
        }
    }
}

#[derive(Debug)]
struct Tree {
    entries: HashMap<String, Entry>,
    locked: HashSet<String>,
    refreshes: HashMap<String, usize>,
}

impl Tree {
    fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), Entry::new(NodeKind::Directory));
        Self {
            entries,
            locked: HashSet::new(),
            refreshes: HashMap::new(),
        }
    }

    fn entry(&self, path: &str) -> FsResult<&Entry> {
        self.entries.get(path).ok_or(FsError::NotFound)
    }

    fn entry_mut(&mut self, path: &str) -> FsResult<&mut Entry> {
        self.entries.get_mut(path).ok_or(FsError::NotFound)
    }

    fn check_unlocked(&self, path: &str) -> FsResult<()> {
        if self.locked.contains(path) {
            return Err(FsError::Locked);
        }
        Ok(())
    }

    /// Files report their length, folders the recursive sum of their files.
    fn size_of(&self, path: &str) -> u64 {
        match self.entries.get(path) {
            Some(entry) if entry.kind.is_dir() => entry
                .children
                .iter()
                .map(|child| self.size_of(&path::join(path, child)))
                .sum(),
            Some(entry) => entry.content.len() as u64,
            None => 0,
        }
    }

    fn node(&self, abs: &str, rel: &str) -> FsResult<Node> {
        let entry = self.entry(abs)?;
        Ok(Node {
            path: rel.to_string(),
            name: path::file_name(rel).unwrap_or_default().to_string(),
            kind: entry.kind,
            size: self.size_of(abs),
            mtime: entry.mtime,
            readable: entry.readable,
            updatable: entry.updatable,
        })
    }

    fn writable_file(&self, path: &str) -> FsResult<&Entry> {
        let entry = self.entry(path)?;
        if entry.kind.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.check_unlocked(path)?;
        if !entry.updatable {
            return Err(FsError::NotPermitted);
        }
        Ok(entry)
    }

    fn insert(&mut self, path: &str, kind: NodeKind) -> FsResult<()> {
        if self.entries.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }
        let name = path::file_name(path).ok_or(FsError::InvalidArgument)?.to_string();
        let parent = self.entry_mut(&path::parent(path))?;
        if !parent.kind.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !parent.updatable {
            return Err(FsError::NotPermitted);
        }
        parent.children.push(name);
        parent.mtime = now();
        self.entries.insert(path.to_string(), Entry::new(kind));
        Ok(())
    }

    fn subtree_keys(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.entries
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn detach(&mut self, path: &str) {
        if let (Some(name), Ok(parent)) =
            (path::file_name(path).map(str::to_string), self.entry_mut(&path::parent(path)))
        {
            parent.children.retain(|child| *child != name);
            parent.mtime = now();
        }
    }

    fn remove(&mut self, path: &str) -> FsResult<()> {
        if path::is_root(path) {
            return Err(FsError::NotPermitted);
        }
        let entry = self.entry(path)?;
        if !entry.updatable {
            return Err(FsError::NotPermitted);
        }
        self.check_unlocked(path)?;
        for key in self.subtree_keys(path) {
            self.entries.remove(&key);
        }
        self.detach(path);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> FsResult<bool> {
        self.entry(from)?;
        self.check_unlocked(from)?;
        self.check_unlocked(to)?;
        if from == to {
            return Ok(true);
        }
        if to.starts_with(&format!("{from}/")) {
            return Ok(false);
        }
        match self.entries.get(&path::parent(to)) {
            Some(parent) if parent.kind.is_dir() && parent.updatable => {}
            _ => return Ok(false),
        }
        if let Some(existing) = self.entries.get(to) {
            if existing.kind.is_dir() {
                return Ok(false);
            }
            self.remove(to)?;
        }
        let Some(new_name) = path::file_name(to).map(str::to_string) else {
            return Ok(false);
        };

        for key in self.subtree_keys(from) {
            if let Some(entry) = self.entries.remove(&key) {
                let moved = format!("{to}{}", &key[from.len()..]);
                self.entries.insert(moved, entry);
            }
        }
        self.detach(from);
        let parent = self.entry_mut(&path::parent(to))?;
        parent.children.push(new_name);
        parent.mtime = now();
        Ok(true)
    }
}

/// Shared in-memory tree handing out per-user roots
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    tree: Arc<Mutex<Tree>>,
    content_prefix: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_content_prefix(MountConfig::DEFAULT_CONTENT_PREFIX)
    }

    pub fn with_content_prefix(prefix: impl Into<String>) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
            content_prefix: prefix.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Absolute path of `rel` inside `identifier`'s content directory.
    pub fn content_path(&self, identifier: &str, rel: &str) -> String {
        path::join(&format!("/{identifier}/{}", self.content_prefix), rel)
    }

    /// Create the user directory and its content root if missing.
    pub fn add_user(&self, identifier: &str) -> FsResult<()> {
        let mut tree = self.lock();
        let user_dir = path::join("/", identifier);
        for dir in [user_dir.clone(), path::join(&user_dir, &self.content_prefix)] {
            match tree.insert(&dir, NodeKind::Directory) {
                Ok(()) | Err(FsError::AlreadyExists) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Create (or overwrite) a file in a user's content root.
    pub fn seed_file(&self, identifier: &str, rel: &str, data: &[u8]) -> FsResult<()> {
        let abs = self.content_path(identifier, rel);
        let mut tree = self.lock();
        match tree.insert(&abs, NodeKind::File) {
            Ok(()) | Err(FsError::AlreadyExists) => {}
            Err(err) => return Err(err),
        }
        tree.entry_mut(&abs)?.content = data.to_vec();
        Ok(())
    }

    pub fn seed_folder(&self, identifier: &str, rel: &str) -> FsResult<()> {
        let abs = self.content_path(identifier, rel);
        self.lock().insert(&abs, NodeKind::Directory)
    }

    pub fn set_mtime(&self, identifier: &str, rel: &str, mtime: i64) -> FsResult<()> {
        let abs = self.content_path(identifier, rel);
        self.lock().entry_mut(&abs)?.mtime = mtime;
        Ok(())
    }

    pub fn set_access(
        &self,
        identifier: &str,
        rel: &str,
        readable: bool,
        updatable: bool,
    ) -> FsResult<()> {
        let abs = self.content_path(identifier, rel);
        let mut tree = self.lock();
        let entry = tree.entry_mut(&abs)?;
        entry.readable = readable;
        entry.updatable = updatable;
        Ok(())
    }

    /// Mark a node as held by another writer.
    pub fn lock_node(&self, identifier: &str, rel: &str) {
        let abs = self.content_path(identifier, rel);
        self.lock().locked.insert(abs);
    }

    pub fn unlock_node(&self, identifier: &str, rel: &str) {
        let abs = self.content_path(identifier, rel);
        self.lock().locked.remove(&abs);
    }

    pub fn exists(&self, identifier: &str, rel: &str) -> bool {
        let abs = self.content_path(identifier, rel);
        self.lock().entries.contains_key(&abs)
    }

    pub fn content(&self, identifier: &str, rel: &str) -> Option<Vec<u8>> {
        let abs = self.content_path(identifier, rel);
        self.lock().entries.get(&abs).map(|entry| entry.content.clone())
    }

    /// Number of mount refreshes requested for `identifier`.
    pub fn refresh_count(&self, identifier: &str) -> usize {
        self.lock().refreshes.get(identifier).copied().unwrap_or(0)
    }

    fn root_for(&self, identifier: &str) -> MemoryRoot {
        MemoryRoot {
            backend: self.clone(),
            base: self.content_path(identifier, "/"),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RawTree for MemoryBackend {
    fn move_path(&self, from: &str, to: &str) -> FsResult<bool> {
        let from = path::join("/", from);
        let to = path::join("/", to);
        self.lock().rename(&from, &to)
    }
}

impl RootResolver for MemoryBackend {
    fn user_root(&self, identifier: &str) -> FsResult<Arc<dyn NodeStore>> {
        let root = self.root_for(identifier);
        let tree = self.lock();
        let entry = tree.entry(&root.base)?;
        if !entry.readable {
            return Err(FsError::NotPermitted);
        }
        drop(tree);
        Ok(Arc::new(root))
    }

    fn raw_tree(&self) -> Arc<dyn RawTree> {
        Arc::new(self.clone())
    }
}

/// One user's content root inside a [`MemoryBackend`]
#[derive(Clone, Debug)]
pub struct MemoryRoot {
    backend: MemoryBackend,
    base: String,
}

impl MemoryRoot {
    fn abs(&self, rel: &str) -> String {
        path::join(&self.base, rel)
    }
}

impl NodeStore for MemoryRoot {
    fn get(&self, path: &str) -> FsResult<Node> {
        self.backend.lock().node(&self.abs(path), path)
    }

    fn new_file(&self, path: &str) -> FsResult<Node> {
        let abs = self.abs(path);
        let mut tree = self.backend.lock();
        tree.insert(&abs, NodeKind::File)?;
        tree.node(&abs, path)
    }

    fn new_folder(&self, path: &str) -> FsResult<Node> {
        let abs = self.abs(path);
        let mut tree = self.backend.lock();
        tree.insert(&abs, NodeKind::Directory)?;
        tree.node(&abs, path)
    }

    fn delete(&self, path: &str) -> FsResult<()> {
        let abs = self.abs(path);
        if abs == self.base {
            return Err(FsError::NotPermitted);
        }
        self.backend.lock().remove(&abs)
    }

    fn list(&self, path: &str) -> FsResult<Vec<String>> {
        let tree = self.backend.lock();
        let entry = tree.entry(&self.abs(path))?;
        if !entry.kind.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(entry.children.clone())
    }

    fn read_content(&self, path: &str) -> FsResult<Vec<u8>> {
        let tree = self.backend.lock();
        let entry = tree.entry(&self.abs(path))?;
        if entry.kind.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if !entry.readable {
            return Err(FsError::NotPermitted);
        }
        Ok(entry.content.clone())
    }

    fn put_content(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let abs = self.abs(path);
        let mut tree = self.backend.lock();
        tree.writable_file(&abs)?;
        let entry = tree.entry_mut(&abs)?;
        entry.content = data.to_vec();
        entry.mtime = now();
        Ok(())
    }

    fn open_read_write(&self, path: &str) -> FsResult<Box<dyn ContentStream>> {
        let abs = self.abs(path);
        self.backend.lock().writable_file(&abs)?;
        Ok(Box::new(MemoryStream {
            backend: self.backend.clone(),
            path: abs,
            position: 0,
        }))
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        self.backend.lock().entry_mut(&self.abs(path))?.mtime = now();
        Ok(())
    }

    fn move_node(&self, from: &str, to: &str) -> FsResult<bool> {
        let (from, to) = (self.abs(from), self.abs(to));
        if from == self.base || to == self.base {
            return Ok(false);
        }
        self.backend.lock().rename(&from, &to)
    }

    fn refresh_mounts(&self, identifier: &str) -> FsResult<()> {
        *self.backend.lock().refreshes.entry(identifier.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

fn stream_error(err: FsError) -> io::Error {
    match err {
        FsError::Io(err) => err,
        other => io::Error::other(other),
    }
}

/// Read-write stream applied directly to the shared tree
///
/// Every call takes the tree mutex, so concurrent streams on one file see
/// each other's bytes and never overwrite unrelated ranges.
struct MemoryStream {
    backend: MemoryBackend,
    path: String,
    position: u64,
}

impl MemoryStream {
    fn len(&self) -> io::Result<u64> {
        let tree = self.backend.lock();
        let entry = tree.entry(&self.path).map_err(stream_error)?;
        Ok(entry.content.len() as u64)
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let tree = self.backend.lock();
        let content = &tree.entry(&self.path).map_err(stream_error)?.content;
        let start = usize::try_from(self.position).unwrap_or(usize::MAX).min(content.len());
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = usize::try_from(self.position)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let mut tree = self.backend.lock();
        tree.writable_file(&self.path).map_err(stream_error)?;
        let entry = tree.entry_mut(&self.path).map_err(stream_error)?;
        let end = start + buf.len();
        if entry.content.len() < end {
            entry.content.resize(end, 0);
        }
        entry.content[start..end].copy_from_slice(buf);
        entry.mtime = now();
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        Ok(self.position)
    }
}

impl ContentStream for MemoryStream {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let mut tree = self.backend.lock();
        tree.writable_file(&self.path).map_err(stream_error)?;
        let entry = tree.entry_mut(&self.path).map_err(stream_error)?;
        entry.content.resize(len, 0);
        entry.mtime = now();
        Ok(())
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        self.backend.lock().entry(&self.path)?;
        Ok(())
    }
}
