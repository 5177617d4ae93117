// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Composition root for the translation layer

use std::sync::Arc;

use tracing::{error, info};

use crate::adapter::UserAdapter;
use crate::backend::RootResolver;
use crate::config::MountConfig;
use crate::delegator::Delegator;
use crate::error::{FsError, FsResult};
use crate::ops::UserFilesystem;
use crate::types::Owner;

/// Builds a filesystem for a set of user identifiers
pub struct AdapterFactory {
    resolver: Arc<dyn RootResolver>,
    config: MountConfig,
    owner: Owner,
}

impl AdapterFactory {
    pub fn new(resolver: Arc<dyn RootResolver>, config: MountConfig) -> Self {
        Self {
            resolver,
            config,
            owner: Owner::effective(),
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Adapter bound to `identifier`'s backend root.
    pub fn create_adapter(&self, identifier: &str) -> FsResult<UserAdapter> {
        let root = self.resolver.user_root(identifier).inspect_err(|err| {
            error!(target: "userfs::factory", user = identifier, error = %err, "cannot resolve user root");
        })?;
        Ok(UserAdapter::new(identifier, root)
            .with_owner(self.owner)
            .with_write_mode(self.config.write_mode))
    }

    /// A bare adapter for one identifier, a delegator for several.
    pub fn create_for_users<S: AsRef<str>>(
        &self,
        identifiers: &[S],
    ) -> FsResult<Arc<dyn UserFilesystem>> {
        match identifiers {
            [] => Err(FsError::InvalidArgument),
            [single] => {
                info!(target: "userfs::factory", user = single.as_ref(), "single-user filesystem");
                Ok(Arc::new(self.create_adapter(single.as_ref())?))
            }
            many => {
                let mut delegator = Delegator::new(
                    self.resolver.raw_tree(),
                    self.config.content_prefix.clone(),
                )
                .with_owner(self.owner);
                for id in many {
                    delegator.add_adapter(self.create_adapter(id.as_ref())?);
                }
                info!(target: "userfs::factory", users = many.len(), "multi-user filesystem");
                Ok(Arc::new(delegator))
            }
        }
    }
}
