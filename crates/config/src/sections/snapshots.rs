// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

/// Default locations of the snapshot dumps
///
/// Both can be overridden per-invocation on the command line; the provider
/// dump also defaults to `<tenant>-users.json` when unset here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotsConfig {
    /// Where the identity-provider user dump lives
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub users_dump: Option<Utf8PathBuf>,

    /// Where the downstream (CIS) record dump lives
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub downstream_dump: Option<Utf8PathBuf>,
}

impl SnapshotsConfig {
    pub(crate) fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl ConfigurationSection for SnapshotsConfig {
    const PATH: Option<&'static str> = Some("snapshots");
}
