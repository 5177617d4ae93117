// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! UserFS FUSE host: mounts per-user document stores
//!
//! Exits 0 once the mount session ends, 1 when the mount cannot be set up.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use userfs_fuse_host::cli::{self, Args, Prepared};

fn serve(prepared: Prepared, args: &Args) -> anyhow::Result<()> {
    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        userfs_fuse_host::bridge::mount(prepared, &args.mount_point)
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        tracing::warn!("FUSE support not compiled in; nothing will be mounted");
        info!(
            mount_point = %args.mount_point.display(),
            operations = ?prepared.table.names(),
            "filesystem prepared"
        );
        info!("To enable FUSE support, compile with: cargo build --features fuse");
        Ok(())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = args.logging.init() {
        eprintln!("userfs-fuse-host: cannot initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    info!(mount_point = %args.mount_point.display(), "starting userfs FUSE host");
    let prepared = match cli::prepare(&args, Path::new(cli::FUSE_DEVICE)) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("userfs-fuse-host: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match serve(prepared, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "mount failed");
            eprintln!("userfs-fuse-host: mount failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
