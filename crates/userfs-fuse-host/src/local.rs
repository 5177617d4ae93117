// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Local-directory backend
//!
//! Each user's root is `{data_dir}/{identifier}/{content_prefix}` on the
//! host filesystem. Paths with `..` segments are refused before they touch
//! the disk.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;
use userfs_core::path as fspath;
use userfs_core::{
    ContentStream, FsError, FsResult, Node, NodeKind, NodeStore, RawTree, RootResolver,
};

fn checked_relative(path: &str) -> FsResult<PathBuf> {
    let mut rel = PathBuf::new();
    for segment in fspath::segments(path) {
        if segment == ".." || segment == "." {
            return Err(FsError::InvalidArgument);
        }
        rel.push(segment);
    }
    Ok(rel)
}

fn mtime_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn metadata(path: &Path) -> FsResult<fs::Metadata> {
    fs::metadata(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => FsError::NotFound,
        _ => FsError::Io(err),
    })
}

fn tree_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += tree_size(&entry?.path())?;
    }
    Ok(total)
}

/// Resolver over a data directory holding one subdirectory per user
#[derive(Clone, Debug)]
pub struct LocalBackend {
    data_dir: PathBuf,
    content_prefix: String,
}

impl LocalBackend {
    pub fn new(data_dir: impl Into<PathBuf>, content_prefix: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            content_prefix: content_prefix.into(),
        }
    }

    pub fn user_dir(&self, identifier: &str) -> FsResult<PathBuf> {
        if identifier.is_empty() || identifier.contains('/') {
            return Err(FsError::InvalidArgument);
        }
        let rel = checked_relative(identifier)?;
        Ok(self.data_dir.join(rel).join(&self.content_prefix))
    }
}

impl RootResolver for LocalBackend {
    fn user_root(&self, identifier: &str) -> FsResult<Arc<dyn NodeStore>> {
        let base = self.user_dir(identifier)?;
        if !base.is_dir() {
            return Err(FsError::NotFound);
        }
        Ok(Arc::new(LocalRoot { base }))
    }

    fn raw_tree(&self) -> Arc<dyn RawTree> {
        Arc::new(self.clone())
    }
}

impl RawTree for LocalBackend {
    fn move_path(&self, from: &str, to: &str) -> FsResult<bool> {
        let from = self.data_dir.join(checked_relative(from)?);
        let to = self.data_dir.join(checked_relative(to)?);
        if !from.exists() {
            return Err(FsError::NotFound);
        }
        match to.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Ok(false),
        }
        fs::rename(&from, &to)?;
        Ok(true)
    }
}

/// One user's content directory
#[derive(Debug)]
pub struct LocalRoot {
    base: PathBuf,
}

impl LocalRoot {
    fn abs(&self, path: &str) -> FsResult<PathBuf> {
        Ok(self.base.join(checked_relative(path)?))
    }
}

impl NodeStore for LocalRoot {
    fn get(&self, path: &str) -> FsResult<Node> {
        let abs = self.abs(path)?;
        let metadata = metadata(&abs)?;
        let mode = metadata.permissions().mode();
        let kind = if metadata.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        let size = if metadata.is_dir() {
            tree_size(&abs)?
        } else {
            metadata.len()
        };
        Ok(Node {
            path: path.to_string(),
            name: fspath::file_name(path).unwrap_or_default().to_string(),
            kind,
            size,
            mtime: mtime_secs(&metadata),
            readable: mode & 0o400 != 0,
            updatable: mode & 0o200 != 0,
        })
    }

    fn new_file(&self, path: &str) -> FsResult<Node> {
        File::options().write(true).create_new(true).open(self.abs(path)?)?;
        self.get(path)
    }

    fn new_folder(&self, path: &str) -> FsResult<Node> {
        fs::create_dir(self.abs(path)?)?;
        self.get(path)
    }

    fn delete(&self, path: &str) -> FsResult<()> {
        let abs = self.abs(path)?;
        if abs == self.base {
            return Err(FsError::NotPermitted);
        }
        if fs::symlink_metadata(&abs)?.is_dir() {
            fs::remove_dir_all(&abs)?;
        } else {
            fs::remove_file(&abs)?;
        }
        Ok(())
    }

    fn list(&self, path: &str) -> FsResult<Vec<String>> {
        let abs = self.abs(path)?;
        if !abs.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let mut names = fs::read_dir(&abs)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn read_content(&self, path: &str) -> FsResult<Vec<u8>> {
        Ok(fs::read(self.abs(path)?)?)
    }

    fn put_content(&self, path: &str, data: &[u8]) -> FsResult<()> {
        Ok(fs::write(self.abs(path)?, data)?)
    }

    fn open_read_write(&self, path: &str) -> FsResult<Box<dyn ContentStream>> {
        let file = File::options().read(true).write(true).open(self.abs(path)?)?;
        Ok(Box::new(LocalStream { file }))
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        let file = File::options().write(true).open(self.abs(path)?)?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }

    fn move_node(&self, from: &str, to: &str) -> FsResult<bool> {
        let (from, to) = (self.abs(from)?, self.abs(to)?);
        if from == self.base || to == self.base || to.starts_with(&from) {
            return Ok(false);
        }
        if !from.exists() {
            return Err(FsError::NotFound);
        }
        fs::rename(&from, &to)?;
        Ok(true)
    }

    fn refresh_mounts(&self, identifier: &str) -> FsResult<()> {
        debug!(target: "userfs::fuse", user = identifier, "local backend has no shared mounts to refresh");
        Ok(())
    }
}

struct LocalStream {
    file: File,
}

impl Read for LocalStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LocalStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LocalStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ContentStream for LocalStream {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn close(mut self: Box<Self>) -> FsResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend_with(users: &[&str]) -> (TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        for user in users {
            fs::create_dir_all(dir.path().join(user).join("files")).unwrap();
        }
        let backend = LocalBackend::new(dir.path(), "files");
        (dir, backend)
    }

    #[test]
    fn unknown_user_has_no_root() {
        let (_dir, backend) = backend_with(&["alice"]);
        assert!(backend.user_root("alice").is_ok());
        assert!(matches!(backend.user_root("bob"), Err(FsError::NotFound)));
        assert!(matches!(backend.user_root(".."), Err(FsError::InvalidArgument)));
    }

    #[test]
    fn parent_segments_are_refused() {
        let (_dir, backend) = backend_with(&["alice"]);
        let root = backend.user_root("alice").unwrap();
        assert!(matches!(root.get("/../../etc"), Err(FsError::InvalidArgument)));
        assert!(matches!(backend.move_path("/alice/../x", "/y"), Err(FsError::InvalidArgument)));
    }

    #[test]
    fn file_lifecycle() {
        let (dir, backend) = backend_with(&["alice"]);
        let root = backend.user_root("alice").unwrap();

        let node = root.new_file("/a.txt").unwrap();
        assert!(node.is_file());
        assert_eq!(node.size, 0);
        assert!(root.new_file("/a.txt").is_err());

        root.put_content("/a.txt", b"hello").unwrap();
        let mut stream = root.open_read_write("/a.txt").unwrap();
        stream.seek(SeekFrom::End(0)).unwrap();
        stream.write_all(b" world").unwrap();
        stream.close().unwrap();
        root.touch("/a.txt").unwrap();

        assert_eq!(root.read_content("/a.txt").unwrap(), b"hello world");
        assert_eq!(
            fs::read(dir.path().join("alice/files/a.txt")).unwrap(),
            b"hello world"
        );
        root.delete("/a.txt").unwrap();
        assert!(matches!(root.get("/a.txt"), Err(FsError::NotFound)));
    }

    #[test]
    fn directory_size_and_listing() {
        let (_dir, backend) = backend_with(&["alice"]);
        let root = backend.user_root("alice").unwrap();
        root.new_folder("/docs").unwrap();
        root.new_file("/docs/b").unwrap();
        root.put_content("/docs/b", &[1; 30]).unwrap();
        root.new_file("/a").unwrap();
        root.put_content("/a", &[1; 12]).unwrap();

        assert_eq!(root.list("/").unwrap(), vec!["a", "docs"]);
        assert_eq!(root.get("/").unwrap().size, 42);
        assert!(matches!(root.list("/a"), Err(FsError::NotADirectory)));
    }

    #[test]
    fn raw_move_between_users() {
        let (dir, backend) = backend_with(&["alice", "bob"]);
        fs::write(dir.path().join("alice/files/f"), b"x").unwrap();
        assert!(backend.move_path("/alice/files/f", "/bob/files/f").unwrap());
        assert!(dir.path().join("bob/files/f").exists());
        assert!(!backend.move_path("/bob/files/f", "/carol/files/f").unwrap());
    }

    #[test]
    fn move_into_itself_is_declined() {
        let (_dir, backend) = backend_with(&["alice"]);
        let root = backend.user_root("alice").unwrap();
        root.new_folder("/d").unwrap();
        assert!(!root.move_node("/d", "/d/e").unwrap());
        assert!(root.move_node("/d", "/e").unwrap());
    }
}
