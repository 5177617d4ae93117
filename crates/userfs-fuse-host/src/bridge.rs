// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel bridge: fuser callbacks onto the path-based operation table
//!
//! fuser addresses nodes by inode; every callback resolves its inode to a
//! path through [`InodeTable`] and dispatches an [`OpCall`]. Negative
//! return codes become `reply.error(errno)`.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, ENAMETOOLONG, ENOENT, ERANGE};
use tracing::{debug, info, warn};
use userfs_core::{
    MountConfig, NodeKind, OpCall, Operation, OperationTable, Outcome, Payload, StatInfo,
};

use crate::cli::Prepared;
use crate::inodes::{InodeTable, ROOT_INODE};
use crate::workers::{worker_count, WorkerPool};

/// Maximum single path component length
const NAME_MAX: usize = 255;

const BLOCK_SIZE: u32 = 512;

fn into_result(outcome: Outcome) -> Result<Payload, c_int> {
    if outcome.code < 0 {
        Err(-outcome.code)
    } else {
        Ok(outcome.payload)
    }
}

fn to_system_time(secs: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

/// Kernel attributes for a synthesized stat.
pub fn stat_to_attr(stat: &StatInfo, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(BLOCK_SIZE as u64),
        atime: to_system_time(stat.times.atime),
        mtime: to_system_time(stat.times.mtime),
        ctime: to_system_time(stat.times.mtime),
        crtime: to_system_time(stat.times.mtime),
        kind: file_type(stat.kind),
        perm: stat.perm as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Translate a comma-separated option string into fuser mount options.
pub fn parse_mount_options(options: &str) -> Vec<MountOption> {
    options
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|option| match option {
            "auto_unmount" => MountOption::AutoUnmount,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "default_permissions" => MountOption::DefaultPermissions,
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            other => match other.split_once('=') {
                Some(("fsname", name)) => MountOption::FSName(name.to_string()),
                Some(("subtype", name)) => MountOption::Subtype(name.to_string()),
                _ => MountOption::CUSTOM(other.to_string()),
            },
        })
        .collect()
}

pub struct UserFsBridge {
    table: Arc<OperationTable>,
    inodes: InodeTable,
    attr_ttl: Duration,
    entry_ttl: Duration,
    workers: WorkerPool,
}

impl UserFsBridge {
    pub fn new(table: OperationTable, config: &MountConfig) -> Self {
        Self {
            table: Arc::new(table),
            inodes: InodeTable::new(),
            attr_ttl: Duration::from_millis(config.attr_ttl_ms as u64),
            entry_ttl: Duration::from_millis(config.entry_ttl_ms as u64),
            workers: WorkerPool::new(worker_count(config.single_threaded)),
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).map(str::to_string).ok_or(ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = name.to_str().ok_or(EINVAL)?;
        if name.len() > NAME_MAX {
            return Err(ENAMETOOLONG);
        }
        self.inodes.child_path(parent, name).ok_or(ENOENT)
    }

    fn stat(&self, path: &str) -> Result<StatInfo, c_int> {
        match into_result(self.table.dispatch(OpCall::Getattr { path }))? {
            Payload::Attr(stat) => Ok(stat),
            _ => Err(libc::EIO),
        }
    }

    fn run(&self, call: OpCall<'_>) -> Result<Payload, c_int> {
        into_result(self.table.dispatch(call))
    }

    fn reply_entry(&mut self, path: &str, reply: ReplyEntry) {
        match self.stat(path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_alloc(path);
                reply.entry(&self.entry_ttl, &stat_to_attr(&stat, ino), 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn apply_setattr(
        &self,
        path: &str,
        mode: Option<u32>,
        owner: Option<(u32, u32)>,
        size: Option<u64>,
        fh: Option<u64>,
        times_changed: bool,
    ) -> Result<(), c_int> {
        if let Some(mode) = mode {
            self.run(OpCall::Chmod { path, mode })?;
        }
        if let Some((uid, gid)) = owner {
            self.run(OpCall::Chown { path, uid, gid })?;
        }
        if let Some(length) = size {
            match fh {
                Some(_) => self.run(OpCall::Ftruncate { path, length })?,
                None => self.run(OpCall::Truncate { path, length })?,
            };
        }
        if times_changed {
            self.run(OpCall::Utime { path })?;
        }
        Ok(())
    }
}

impl fuser::Filesystem for UserFsBridge {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        let code = self.table.init();
        if code < 0 {
            warn!(target: "userfs::fuse", code, "filesystem init failed");
            return Err(-code);
        }
        info!(
            target: "userfs::fuse",
            workers = self.workers.thread_count(),
            "userfs bridge initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        self.table.destroy();
        info!(target: "userfs::fuse", "userfs bridge destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child_of(parent, name) {
            Ok(path) => self.reply_entry(&path, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.inodes.forget(ino);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.path_of(ino).and_then(|path| self.stat(&path));
        match result {
            Ok(stat) => reply.attr(&self.attr_ttl, &stat_to_attr(&stat, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let owner = match (uid, gid) {
            (None, None) => None,
            (uid, gid) => Some((uid.unwrap_or(u32::MAX), gid.unwrap_or(u32::MAX))),
        };
        let times_changed = atime.is_some() || mtime.is_some();
        let result = self
            .apply_setattr(&path, mode.map(|m| m & 0o7777), owner, size, fh, times_changed)
            .and_then(|()| self.stat(&path));
        match result {
            Ok(stat) => reply.attr(&self.attr_ttl, &stat_to_attr(&stat, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.run(OpCall::Mknod { path: &path, mode, dev: rdev as u64 }) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.run(OpCall::Mkdir { path: &path, mode }) {
            Ok(_) => self.reply_entry(&path, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.run(OpCall::Unlink { path: &path }) {
            Ok(_) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.run(OpCall::Rmdir { path: &path }) {
            Ok(_) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let paths = self
            .child_of(parent, name)
            .and_then(|from| self.child_of(newparent, newname).map(|to| (from, to)));
        let (from, to) = match paths {
            Ok(paths) => paths,
            Err(errno) => return reply.error(errno),
        };
        match self.run(OpCall::Rename { from: &from, to: &to }) {
            Ok(_) => {
                self.inodes.rename(&from, &to);
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.run(OpCall::Open { path: &path, flags }));
        match result {
            Ok(_) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if offset < 0 {
            return reply.error(EINVAL);
        }
        let table = Arc::clone(&self.table);
        self.workers.execute(Box::new(move || {
            let call = OpCall::Read { path: &path, size: size as u64, offset: offset as u64 };
            match into_result(table.dispatch(call)) {
                Ok(Payload::Data(data)) => reply.data(&data),
                Ok(_) => reply.data(&[]),
                Err(errno) => reply.error(errno),
            }
        }));
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if offset < 0 {
            return reply.error(EINVAL);
        }
        let table = Arc::clone(&self.table);
        let buffer = data.to_vec();
        self.workers.execute(Box::new(move || {
            let outcome = table.dispatch(OpCall::Write {
                path: &path,
                data: &buffer,
                offset: offset as u64,
            });
            if outcome.code < 0 {
                reply.error(-outcome.code);
            } else {
                reply.written(outcome.code as u32);
            }
        }));
    }

    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self.path_of(ino).and_then(|path| self.run(OpCall::Flush { path: &path }));
        match result {
            Ok(_) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if !self.table.is_registered(Operation::Release) {
            return reply.ok();
        }
        let result = self.path_of(ino).and_then(|path| self.run(OpCall::Release { path: &path }));
        match result {
            Ok(_) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let names = match self.run(OpCall::Readdir { path: &path }) {
            Ok(Payload::Entries(names)) => names,
            Ok(_) => Vec::new(),
            Err(errno) => return reply.error(errno),
        };

        for (i, name) in names.iter().enumerate().skip(offset.max(0) as usize) {
            let (entry_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => {
                    let parent = userfs_core::path::parent(&path);
                    (self.inodes.get_or_alloc(&parent), FileType::Directory)
                }
                child => {
                    let child_path = userfs_core::path::join(&path, child);
                    let kind = self
                        .stat(&child_path)
                        .map(|stat| file_type(stat.kind))
                        .unwrap_or(FileType::RegularFile);
                    (self.inodes.get_or_alloc(&child_path), kind)
                }
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let Some(attr) = name.to_str() else {
            return reply.error(EINVAL);
        };
        let result = self
            .path_of(ino)
            .and_then(|path| self.run(OpCall::Getxattr { path: &path, name: attr }));
        match result {
            Ok(Payload::Data(value)) if size == 0 => reply.size(value.len() as u32),
            Ok(Payload::Data(value)) if value.len() > size as usize => reply.error(ERANGE),
            Ok(Payload::Data(value)) => reply.data(&value),
            Ok(_) => reply.size(0),
            Err(errno) => reply.error(errno),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(attr) = name.to_str() else {
            return reply.error(EINVAL);
        };
        let result = self
            .path_of(ino)
            .and_then(|path| self.run(OpCall::Removexattr { path: &path, name: attr }));
        match result {
            Ok(_) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }
}

/// Mount in the background; dropping the session unmounts.
pub fn spawn(prepared: Prepared, mount_point: &Path) -> anyhow::Result<fuser::BackgroundSession> {
    let Prepared { config, table } = prepared;
    let mut options = vec![
        MountOption::FSName("userfs".to_string()),
        MountOption::Subtype("userfs".to_string()),
    ];
    options.extend(parse_mount_options(&config.mount_options));
    debug!(target: "userfs::fuse", ?options, "mount options");

    let bridge = UserFsBridge::new(table, &config);
    info!(target: "userfs::fuse", mount_point = %mount_point.display(), "mounting");
    Ok(fuser::spawn_mount2(bridge, mount_point, &options)?)
}

/// Mount and serve until the filesystem is unmounted.
pub fn mount(prepared: Prepared, mount_point: &Path) -> anyhow::Result<()> {
    let session = spawn(prepared, mount_point)?;
    info!(target: "userfs::fuse", "mounted; blocking until unmount");
    session.join();
    Ok(())
}
