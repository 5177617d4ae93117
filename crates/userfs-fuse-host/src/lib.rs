// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! UserFS FUSE host
//!
//! Command-line parsing, logging, the local-directory backend and the
//! kernel bridge that serves an operation table through fuser.

pub mod cli;
pub mod inodes;
pub mod local;
pub mod logging;
pub mod workers;

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub mod bridge;
