// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the userfs translation layer

use std::io;

use libc::{EEXIST, EINVAL, EIO, EISDIR, ENOENT, ENOSYS, ENOTDIR, EPERM};

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("not permitted")]
    NotPermitted,
    #[error("locked")]
    Locked,
    #[error("not implemented")]
    NotImplemented,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("io error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FsError {
    /// Streams report backend errors through `io::Error`; unwrap those again.
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<FsError>()) {
            return FsError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<FsError>()) {
            Some(Ok(inner)) => *inner,
            _ => FsError::Io(io::Error::from(io::ErrorKind::Other)),
        }
    }
}

impl FsError {
    /// Positive errno reported to the kernel for this error.
    ///
    /// Permission and lock failures collapse into `EPERM`, the generic
    /// failure code the dispatch library has always received for them.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => ENOENT,
            FsError::NotPermitted | FsError::Locked => EPERM,
            FsError::NotImplemented => ENOSYS,
            FsError::NotADirectory => ENOTDIR,
            FsError::IsADirectory => EISDIR,
            FsError::AlreadyExists => EEXIST,
            FsError::InvalidArgument => EINVAL,
            FsError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => ENOENT,
                io::ErrorKind::PermissionDenied => EPERM,
                _ => err.raw_os_error().unwrap_or(EIO),
            },
        }
    }

    /// Negative return code handed back to the dispatch library.
    pub fn return_code(&self) -> i32 {
        -self.errno()
    }
}

pub type FsResult<T> = Result<T, FsError>;
