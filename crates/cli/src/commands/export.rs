// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use figment::Figment;
use iamr_config::{ConfigurationSection, ConfigurationSectionExt, DirectoryConfig, SnapshotsConfig};
use iamr_data_model::UserSnapshot;
use iamr_directory::Directory;
use tracing::{info, info_span};

use crate::util::{directory_from_config, users_dump_path};

/// Users fetched per page; the management API caps pages at 100 entries.
const PAGE_SIZE: u32 = 100;

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// The path to write the snapshot to
    ///
    /// Defaults to `<tenant>-users.json`
    #[clap(short, long)]
    output: Option<Utf8PathBuf>,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let _span = info_span!("cli.export").entered();

        let directory_config =
            DirectoryConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
        let snapshots_config =
            SnapshotsConfig::extract_or_default(figment).map_err(anyhow::Error::from_boxed)?;
        let output = users_dump_path(self.output, &snapshots_config, &directory_config);

        let directory = directory_from_config(&directory_config).await?;

        let all_users = fetch_all_users(&directory, PAGE_SIZE).await?;

        // BTreeMap keys keep the dump sorted
        let dump = serde_json::to_vec_pretty(&all_users)?;
        tokio::fs::write(&output, dump)
            .await
            .with_context(|| format!("Failed to write the snapshot to {output:?}"))?;

        info!(
            "Successfully downloaded userlist for {} to {output}",
            directory.tenant()
        );

        Ok(ExitCode::SUCCESS)
    }
}

/// Page through the directory listing until the first empty page.
async fn fetch_all_users<D: Directory>(
    directory: &D,
    page_size: u32,
) -> anyhow::Result<UserSnapshot> {
    let mut all_users = UserSnapshot::new();
    for page in 0.. {
        let users = directory.list_users(page, page_size).await?;

        if users.is_empty() {
            break;
        }

        for user in users {
            all_users.insert(user.user_id.clone(), user);
        }

        info!("Successfully retrieved page {page} ({} users)", all_users.len());
    }

    Ok(all_users)
}
