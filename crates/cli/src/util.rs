// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::BTreeSet;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use iamr_config::{DirectoryConfig, SnapshotsConfig};
use iamr_data_model::UserSnapshot;
use iamr_directory_auth0::{Auth0Credentials, Auth0Directory};

pub async fn directory_from_config(
    config: &DirectoryConfig,
) -> Result<Auth0Directory, anyhow::Error> {
    let credentials = Auth0Credentials {
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
    };

    Auth0Directory::connect(
        config.tenant.clone(),
        &credentials,
        reqwest::Client::new(),
    )
    .await
    .context("could not connect to the identity directory")
}

/// Where the provider user dump lives: an explicit command-line path wins,
/// then the config, then `<tenant>-users.json` next to the working
/// directory.
pub fn users_dump_path(
    override_path: Option<Utf8PathBuf>,
    snapshots: &SnapshotsConfig,
    directory: &DirectoryConfig,
) -> Utf8PathBuf {
    override_path
        .or_else(|| snapshots.users_dump.clone())
        .unwrap_or_else(|| Utf8PathBuf::from(format!("{}-users.json", directory.tenant)))
}

pub async fn load_user_snapshot(path: &Utf8Path) -> Result<UserSnapshot, anyhow::Error> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Can't open {path:?}"))?;

    serde_json::from_slice(&bytes)
        .with_context(|| format!("{path:?} does not contain a valid user snapshot"))
}

/// Load the downstream dump. Only key presence matters, the values are
/// whatever shape the downstream system dumps.
pub async fn load_downstream_keys(path: &Utf8Path) -> Result<BTreeSet<String>, anyhow::Error> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Can't open {path:?}"))?;

    let records: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{path:?} does not contain a valid downstream snapshot"))?;

    Ok(records.into_iter().map(|(user_id, _)| user_id).collect())
}
