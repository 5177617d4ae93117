// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command-line surface and mount preparation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use userfs_core::{AdapterFactory, MemoryBackend, MountConfig, OperationTable, RootResolver};

use crate::local::LocalBackend;
use crate::logging::LoggingArgs;

/// Device node the kernel FUSE driver exposes
pub const FUSE_DEVICE: &str = "/dev/fuse";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Empty per-user roots held in memory
    #[default]
    Memory,
    /// `{data_dir}/{user}/{content_prefix}` on the host filesystem
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "userfs-fuse-host", about = "Mount per-user document stores as one filesystem")]
pub struct Args {
    /// Mount point for the filesystem
    pub mount_point: PathBuf,

    /// User to expose; repeat for a multi-user mount
    #[arg(short = 'u', long = "user", value_name = "USER")]
    pub users: Vec<String>,

    /// Mount options forwarded to the FUSE library
    #[arg(short = 'o', long = "options", value_name = "OPTIONS")]
    pub options: Option<String>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::Memory)]
    pub backend: BackendKind,

    /// Root directory for the local backend
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Serve every request on the session thread
    #[arg(long)]
    pub single_threaded: bool,

    /// Per-user content directory inside the combined tree
    #[arg(long, value_name = "NAME")]
    pub content_prefix: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Everything the kernel bridge needs to start serving
pub struct Prepared {
    pub config: MountConfig,
    pub table: OperationTable,
}

/// Configuration file (or defaults) with command-line overrides applied.
pub fn resolve_config(args: &Args) -> Result<MountConfig> {
    let mut config = match &args.config {
        Some(path) => MountConfig::load(path)?,
        None => MountConfig::default(),
    };
    if let Some(options) = &args.options {
        config.mount_options = options.clone();
    }
    if let Some(prefix) = &args.content_prefix {
        config.content_prefix = prefix.clone();
    }
    if args.single_threaded {
        config.single_threaded = true;
    }
    Ok(config)
}

fn build_resolver(args: &Args, config: &MountConfig) -> Result<Arc<dyn RootResolver>> {
    match args.backend {
        BackendKind::Memory => {
            let backend = MemoryBackend::with_content_prefix(config.content_prefix.clone());
            for user in &args.users {
                backend
                    .add_user(user)
                    .with_context(|| format!("creating in-memory root for {user}"))?;
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Local => {
            let Some(data_dir) = &args.data_dir else {
                bail!("--data-dir is required with --backend local");
            };
            Ok(Arc::new(LocalBackend::new(data_dir, config.content_prefix.clone())))
        }
    }
}

/// Validate arguments and build the operation table, without mounting.
///
/// `fuse_device` is checked for existence; the binary passes [`FUSE_DEVICE`].
pub fn prepare(args: &Args, fuse_device: &Path) -> Result<Prepared> {
    if args.users.is_empty() {
        bail!("no users specified; pass at least one -u/--user");
    }
    if !fuse_device.exists() {
        bail!("{} not found; is the fuse kernel module loaded?", fuse_device.display());
    }

    let config = resolve_config(args)?;
    let resolver = build_resolver(args, &config)?;
    let factory = AdapterFactory::new(resolver, config.clone());
    let fs = factory
        .create_for_users(&args.users)
        .with_context(|| format!("constructing filesystem for {}", args.users.join(", ")))?;
    let table = OperationTable::build(fs);
    info!(
        target: "userfs::fuse",
        users = args.users.len(),
        operations = ?table.names(),
        "filesystem ready"
    );
    Ok(Prepared { config, table })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("userfs-fuse-host").chain(argv.iter().copied()))
            .unwrap()
    }

    fn present_device() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    #[test]
    fn repeatable_user_flag() {
        let args = parse(&["/mnt/x", "-u", "alice", "--user", "bob"]);
        assert_eq!(args.users, vec!["alice", "bob"]);
        assert_eq!(args.mount_point, PathBuf::from("/mnt/x"));
        assert_eq!(args.backend, BackendKind::Memory);
    }

    #[test]
    fn options_default_and_override() {
        let args = parse(&["/mnt/x", "-u", "alice"]);
        assert_eq!(resolve_config(&args).unwrap().mount_options, "auto_cache,async,noatime");

        let args = parse(&["/mnt/x", "-u", "alice", "-o", "ro,allow_other", "--single-threaded"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.mount_options, "ro,allow_other");
        assert!(config.single_threaded);
    }

    #[test]
    fn cli_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{ "content_prefix": "data", "mount_options": "ro" }"#).unwrap();
        file.flush().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = parse(&["/mnt/x", "-u", "a", "--config", &path, "--content-prefix", "docs"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.content_prefix, "docs");
        assert_eq!(config.mount_options, "ro");
    }

    #[test]
    fn missing_users_fail_before_device_check() {
        let args = parse(&["/mnt/x"]);
        let err = prepare(&args, Path::new("/definitely/not/here")).err().unwrap();
        assert!(err.to_string().contains("no users"));
    }

    #[test]
    fn missing_device_is_reported() {
        let args = parse(&["/mnt/x", "-u", "alice"]);
        let err = prepare(&args, Path::new("/definitely/not/here")).err().unwrap();
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[test]
    fn memory_backend_builds_delegator_table() {
        let device = present_device();
        let args = parse(&["/mnt/x", "-u", "alice", "-u", "bob"]);
        let prepared = prepare(&args, device.path()).unwrap();
        assert!(prepared.table.lookup("rename").is_some());
        assert!(prepared.table.lookup("getxattr").is_none());
    }

    #[test]
    fn local_backend_requires_existing_roots() {
        let device = present_device();
        let data = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(data.path().join("alice/files")).unwrap();
        let dir = data.path().to_str().unwrap().to_string();

        let args = parse(&["/mnt/x", "-u", "alice", "--backend", "local", "--data-dir", &dir]);
        let prepared = prepare(&args, device.path()).unwrap();
        assert!(prepared.table.lookup("getxattr").is_some());

        let args = parse(&["/mnt/x", "-u", "bob", "--backend", "local", "--data-dir", &dir]);
        let err = prepare(&args, device.path()).err().unwrap();
        assert!(format!("{err:#}").contains("constructing filesystem"));

        let args = parse(&["/mnt/x", "-u", "alice", "--backend", "local"]);
        assert!(prepare(&args, device.path()).is_err());
    }
}
