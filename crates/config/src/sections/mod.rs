// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod directory;
mod snapshots;

pub use self::{directory::DirectoryConfig, snapshots::SnapshotsConfig};
use crate::util::ConfigurationSection;

/// Application configuration root
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration related to the identity directory
    pub directory: DirectoryConfig,

    /// Default locations of the snapshot dumps
    #[serde(default, skip_serializing_if = "SnapshotsConfig::is_default")]
    pub snapshots: SnapshotsConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        self.directory.validate(figment)?;
        self.snapshots.validate(figment)?;
        Ok(())
    }
}
