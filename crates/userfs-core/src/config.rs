// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How `write` interprets an offset of zero
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOffsetMode {
    /// Offset 0 seeks to end of file (appends); other offsets are absolute.
    #[default]
    Legacy,
    /// Every offset is absolute.
    Positional,
}

/// Settings shared by the adapters and the mount host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Directory under each user in the combined tree that holds their content
    pub content_prefix: String,
    /// Options string forwarded verbatim to the mount library
    pub mount_options: String,
    pub write_mode: WriteOffsetMode,
    pub single_threaded: bool,
    pub attr_ttl_ms: u32,
    pub entry_ttl_ms: u32,
}

impl MountConfig {
    pub const DEFAULT_MOUNT_OPTIONS: &'static str = "auto_cache,async,noatime";
    pub const DEFAULT_CONTENT_PREFIX: &'static str = "files";

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).context("parsing mount configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading mount configuration {}", path.display()))?;
        Self::from_json_str(&content)
    }

    /// Individual options of [`mount_options`](Self::mount_options), empty entries dropped.
    pub fn mount_option_list(&self) -> Vec<&str> {
        self.mount_options.split(',').map(str::trim).filter(|o| !o.is_empty()).collect()
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            content_prefix: Self::DEFAULT_CONTENT_PREFIX.to_string(),
            mount_options: Self::DEFAULT_MOUNT_OPTIONS.to_string(),
            write_mode: WriteOffsetMode::Legacy,
            single_threaded: false,
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}
