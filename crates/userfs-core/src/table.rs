// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Operation table registered with the dispatch library
//!
//! The dispatch library hands over already-decoded arguments and expects an
//! integer back: `0` on success, a byte count for `read`/`write`, or a
//! negated errno. [`OperationTable::dispatch`] is the boundary where every
//! [`FsError`](crate::error::FsError) is converted; nothing escapes it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use libc::ENOSYS;
use tracing::{debug, trace};

use crate::error::FsResult;
use crate::ops::UserFilesystem;
use crate::types::{FileTimes, StatInfo};

/// Canonical operation names understood by the dispatch library
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Getattr,
    Readlink,
    Mknod,
    Mkdir,
    Unlink,
    Rmdir,
    Symlink,
    Rename,
    Link,
    Chmod,
    Chown,
    Truncate,
    Ftruncate,
    Utime,
    Open,
    Read,
    Write,
    Flush,
    Release,
    Fsync,
    Readdir,
    Opendir,
    Releasedir,
    Access,
    Create,
    Getxattr,
    Removexattr,
}

impl Operation {
    pub const ALL: [Operation; 27] = [
        Operation::Getattr,
        Operation::Readlink,
        Operation::Mknod,
        Operation::Mkdir,
        Operation::Unlink,
        Operation::Rmdir,
        Operation::Symlink,
        Operation::Rename,
        Operation::Link,
        Operation::Chmod,
        Operation::Chown,
        Operation::Truncate,
        Operation::Ftruncate,
        Operation::Utime,
        Operation::Open,
        Operation::Read,
        Operation::Write,
        Operation::Flush,
        Operation::Release,
        Operation::Fsync,
        Operation::Readdir,
        Operation::Opendir,
        Operation::Releasedir,
        Operation::Access,
        Operation::Create,
        Operation::Getxattr,
        Operation::Removexattr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Getattr => "getattr",
            Operation::Readlink => "readlink",
            Operation::Mknod => "mknod",
            Operation::Mkdir => "mkdir",
            Operation::Unlink => "unlink",
            Operation::Rmdir => "rmdir",
            Operation::Symlink => "symlink",
            Operation::Rename => "rename",
            Operation::Link => "link",
            Operation::Chmod => "chmod",
            Operation::Chown => "chown",
            Operation::Truncate => "truncate",
            Operation::Ftruncate => "ftruncate",
            Operation::Utime => "utime",
            Operation::Open => "open",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Flush => "flush",
            Operation::Release => "release",
            Operation::Fsync => "fsync",
            Operation::Readdir => "readdir",
            Operation::Opendir => "opendir",
            Operation::Releasedir => "releasedir",
            Operation::Access => "access",
            Operation::Create => "create",
            Operation::Getxattr => "getxattr",
            Operation::Removexattr => "removexattr",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operation name: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Operations a single-user adapter registers.
pub const ADAPTER_OPERATIONS: &[Operation] = &[
    Operation::Getattr,
    Operation::Open,
    Operation::Read,
    Operation::Readdir,
    Operation::Write,
    Operation::Truncate,
    Operation::Ftruncate,
    Operation::Flush,
    Operation::Getxattr,
    Operation::Removexattr,
    Operation::Mknod,
    Operation::Mkdir,
    Operation::Unlink,
    Operation::Rmdir,
    Operation::Utime,
    Operation::Chown,
    Operation::Chmod,
    Operation::Rename,
];

/// Operations the multi-user delegator registers (no extended attributes).
pub const DELEGATOR_OPERATIONS: &[Operation] = &[
    Operation::Getattr,
    Operation::Open,
    Operation::Read,
    Operation::Readdir,
    Operation::Write,
    Operation::Truncate,
    Operation::Ftruncate,
    Operation::Flush,
    Operation::Mknod,
    Operation::Mkdir,
    Operation::Unlink,
    Operation::Rmdir,
    Operation::Utime,
    Operation::Chown,
    Operation::Chmod,
    Operation::Rename,
];

/// A decoded call as delivered by the dispatch library
#[derive(Clone, Copy, Debug)]
pub enum OpCall<'a> {
    Getattr { path: &'a str },
    Readlink { path: &'a str },
    Mknod { path: &'a str, mode: u32, dev: u64 },
    Mkdir { path: &'a str, mode: u32 },
    Unlink { path: &'a str },
    Rmdir { path: &'a str },
    Symlink { path: &'a str, target: &'a str },
    Rename { from: &'a str, to: &'a str },
    Link { path: &'a str, target: &'a str },
    Chmod { path: &'a str, mode: u32 },
    Chown { path: &'a str, uid: u32, gid: u32 },
    Truncate { path: &'a str, length: u64 },
    Ftruncate { path: &'a str, length: u64 },
    Utime { path: &'a str },
    Open { path: &'a str, flags: i32 },
    Read { path: &'a str, size: u64, offset: u64 },
    Write { path: &'a str, data: &'a [u8], offset: u64 },
    Flush { path: &'a str },
    Release { path: &'a str },
    Fsync { path: &'a str, datasync: bool },
    Readdir { path: &'a str },
    Opendir { path: &'a str },
    Releasedir { path: &'a str },
    Access { path: &'a str, mask: i32 },
    Create { path: &'a str, mode: u32 },
    Getxattr { path: &'a str, name: &'a str },
    Removexattr { path: &'a str, name: &'a str },
}

impl OpCall<'_> {
    pub fn operation(&self) -> Operation {
        match self {
            OpCall::Getattr { .. } => Operation::Getattr,
            OpCall::Readlink { .. } => Operation::Readlink,
            OpCall::Mknod { .. } => Operation::Mknod,
            OpCall::Mkdir { .. } => Operation::Mkdir,
            OpCall::Unlink { .. } => Operation::Unlink,
            OpCall::Rmdir { .. } => Operation::Rmdir,
            OpCall::Symlink { .. } => Operation::Symlink,
            OpCall::Rename { .. } => Operation::Rename,
            OpCall::Link { .. } => Operation::Link,
            OpCall::Chmod { .. } => Operation::Chmod,
            OpCall::Chown { .. } => Operation::Chown,
            OpCall::Truncate { .. } => Operation::Truncate,
            OpCall::Ftruncate { .. } => Operation::Ftruncate,
            OpCall::Utime { .. } => Operation::Utime,
            OpCall::Open { .. } => Operation::Open,
            OpCall::Read { .. } => Operation::Read,
            OpCall::Write { .. } => Operation::Write,
            OpCall::Flush { .. } => Operation::Flush,
            OpCall::Release { .. } => Operation::Release,
            OpCall::Fsync { .. } => Operation::Fsync,
            OpCall::Readdir { .. } => Operation::Readdir,
            OpCall::Opendir { .. } => Operation::Opendir,
            OpCall::Releasedir { .. } => Operation::Releasedir,
            OpCall::Access { .. } => Operation::Access,
            OpCall::Create { .. } => Operation::Create,
            OpCall::Getxattr { .. } => Operation::Getxattr,
            OpCall::Removexattr { .. } => Operation::Removexattr,
        }
    }
}

/// Out-of-band result data accompanying a return code
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Empty,
    Attr(StatInfo),
    Data(Vec<u8>),
    Entries(Vec<String>),
    Times(FileTimes),
    Link(String),
}

/// What the dispatch library receives for one call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// `0`, a byte count, or a negated errno
    pub code: i32,
    pub payload: Payload,
}

impl Outcome {
    fn ok(payload: Payload) -> Self {
        Self { code: 0, payload }
    }

    fn error(code: i32) -> Self {
        Self {
            code,
            payload: Payload::Empty,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code >= 0
    }
}

/// Name-to-method table for one filesystem
pub struct OperationTable {
    fs: Arc<dyn UserFilesystem>,
    registered: &'static [Operation],
}

impl OperationTable {
    /// Register every operation the filesystem declares.
    pub fn build(fs: Arc<dyn UserFilesystem>) -> Self {
        let registered = fs.operations();
        debug!(
            target: "userfs::dispatch",
            operations = registered.len(),
            "operation table built"
        );
        Self { fs, registered }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.registered.iter().map(Operation::name).collect()
    }

    pub fn is_registered(&self, op: Operation) -> bool {
        self.registered.contains(&op)
    }

    /// Look up a registered operation by its canonical name.
    pub fn lookup(&self, name: &str) -> Option<Operation> {
        name.parse().ok().filter(|op| self.is_registered(*op))
    }

    pub fn filesystem(&self) -> &Arc<dyn UserFilesystem> {
        &self.fs
    }

    /// Connection setup hook, as a return code.
    pub fn init(&self) -> i32 {
        match self.fs.init() {
            Ok(()) => 0,
            Err(err) => err.return_code(),
        }
    }

    pub fn destroy(&self) {
        self.fs.destroy();
    }

    pub fn dispatch(&self, call: OpCall<'_>) -> Outcome {
        let op = call.operation();
        if !self.is_registered(op) {
            trace!(target: "userfs::dispatch", %op, "operation not registered");
            return Outcome::error(-ENOSYS);
        }
        let result = self.invoke(call);
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(target: "userfs::dispatch", %op, error = %err, "operation failed");
                Outcome::error(err.return_code())
            }
        }
    }

    fn invoke(&self, call: OpCall<'_>) -> FsResult<Outcome> {
        let fs = self.fs.as_ref();
        let empty = |r: FsResult<()>| r.map(|()| Outcome::ok(Payload::Empty));
        match call {
            OpCall::Getattr { path } => fs.getattr(path).map(|st| Outcome::ok(Payload::Attr(st))),
            OpCall::Readlink { path } => fs.readlink(path).map(|t| Outcome::ok(Payload::Link(t))),
            OpCall::Mknod { path, mode, dev } => empty(fs.mknod(path, mode, dev)),
            OpCall::Mkdir { path, mode } => empty(fs.mkdir(path, mode)),
            OpCall::Unlink { path } => empty(fs.unlink(path)),
            OpCall::Rmdir { path } => empty(fs.rmdir(path)),
            OpCall::Symlink { path, target } => empty(fs.symlink(path, target)),
            OpCall::Rename { from, to } => empty(fs.rename(from, to)),
            OpCall::Link { path, target } => empty(fs.link(path, target)),
            OpCall::Chmod { path, mode } => empty(fs.chmod(path, mode)),
            OpCall::Chown { path, uid, gid } => empty(fs.chown(path, uid, gid)),
            OpCall::Truncate { path, length } => empty(fs.truncate(path, length)),
            OpCall::Ftruncate { path, length } => empty(fs.ftruncate(path, length)),
            OpCall::Utime { path } => fs.utime(path).map(|t| Outcome::ok(Payload::Times(t))),
            OpCall::Open { path, flags } => empty(fs.open(path, flags)),
            OpCall::Read { path, size, offset } => fs.read(path, size, offset).map(|data| Outcome {
                code: i32::try_from(data.len()).unwrap_or(i32::MAX),
                payload: Payload::Data(data),
            }),
            OpCall::Write { path, data, offset } => fs.write(path, data, offset).map(|n| Outcome {
                code: i32::try_from(n).unwrap_or(i32::MAX),
                payload: Payload::Empty,
            }),
            OpCall::Flush { path } => empty(fs.flush(path)),
            OpCall::Release { path } => empty(fs.release(path)),
            OpCall::Fsync { path, datasync } => empty(fs.fsync(path, datasync)),
            OpCall::Readdir { path } => {
                fs.readdir(path).map(|names| Outcome::ok(Payload::Entries(names)))
            }
            OpCall::Opendir { path } => empty(fs.opendir(path)),
            OpCall::Releasedir { path } => empty(fs.releasedir(path)),
            OpCall::Access { path, mask } => empty(fs.access(path, mask)),
            OpCall::Create { path, mode } => empty(fs.create(path, mode)),
            OpCall::Getxattr { path, name } => {
                fs.getxattr(path, name).map(|v| Outcome::ok(Payload::Data(v)))
            }
            OpCall::Removexattr { path, name } => empty(fs.removexattr(path, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;

    struct Fixed;

    impl UserFilesystem for Fixed {
        fn operations(&self) -> &'static [Operation] {
            &[Operation::Read, Operation::Unlink, Operation::Write]
        }

        fn read(&self, _path: &str, _size: u64, _offset: u64) -> FsResult<Vec<u8>> {
            Ok(b"abc".to_vec())
        }

        fn unlink(&self, path: &str) -> FsResult<()> {
            match path {
                "/missing" => Err(FsError::NotFound),
                "/locked" => Err(FsError::Locked),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
        }
        assert!("statfs".parse::<Operation>().is_err());
    }

    #[test]
    fn registration_sets_differ_only_by_xattrs() {
        let extra: Vec<_> = ADAPTER_OPERATIONS
            .iter()
            .filter(|op| !DELEGATOR_OPERATIONS.contains(op))
            .collect();
        assert_eq!(extra, vec![&Operation::Getxattr, &Operation::Removexattr]);
        assert!(DELEGATOR_OPERATIONS.iter().all(|op| ADAPTER_OPERATIONS.contains(op)));
    }

    #[test]
    fn dispatch_maps_results_to_codes() {
        let table = OperationTable::build(Arc::new(Fixed));
        let read = table.dispatch(OpCall::Read { path: "/f", size: 10, offset: 0 });
        assert_eq!(read.code, 3);
        assert_eq!(read.payload, Payload::Data(b"abc".to_vec()));

        assert_eq!(table.dispatch(OpCall::Unlink { path: "/f" }).code, 0);
        assert_eq!(table.dispatch(OpCall::Unlink { path: "/missing" }).code, -libc::ENOENT);
        assert_eq!(table.dispatch(OpCall::Unlink { path: "/locked" }).code, -1);
    }

    #[test]
    fn registered_default_bodies_report_enosys() {
        let table = OperationTable::build(Arc::new(Fixed));
        let outcome = table.dispatch(OpCall::Write { path: "/f", data: b"x", offset: 0 });
        assert_eq!(outcome.code, -ENOSYS);
    }

    #[test]
    fn unregistered_operations_are_rejected() {
        let table = OperationTable::build(Arc::new(Fixed));
        assert_eq!(table.lookup("read"), Some(Operation::Read));
        assert_eq!(table.lookup("getattr"), None);
        let outcome = table.dispatch(OpCall::Getattr { path: "/" });
        assert_eq!(outcome, Outcome::error(-ENOSYS));
        assert_eq!(table.names(), vec!["read", "unlink", "write"]);
    }
}
