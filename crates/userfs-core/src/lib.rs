// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! UserFS core: translation between path-based filesystem operations and
//! per-user document stores
//!
//! A [`UserAdapter`] serves one user's root. A [`Delegator`] merges several
//! adapters under a virtual root with one directory per user. The
//! [`AdapterFactory`] picks between the two, and an [`OperationTable`]
//! exposes the result to the dispatch library as integer return codes.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod delegator;
pub mod error;
pub mod factory;
pub mod memory;
pub mod ops;
pub mod path;
pub mod table;
pub mod types;

// Re-export key types
pub use adapter::UserAdapter;
pub use backend::{ContentStream, NodeStore, RawTree, RootResolver};
pub use config::{MountConfig, WriteOffsetMode};
pub use delegator::Delegator;
pub use error::{FsError, FsResult};
pub use factory::AdapterFactory;
pub use memory::MemoryBackend;
pub use ops::UserFilesystem;
pub use table::{OpCall, Operation, OperationTable, Outcome, Payload};
pub use types::{FileTimes, Node, NodeKind, Owner, StatInfo};
