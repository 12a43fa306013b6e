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
use iamr_linker::{GroupIndex, LinkEngine};
use tracing::{info, info_span};

use crate::util::{directory_from_config, load_user_snapshot, users_dump_path};

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// The user snapshot to work from, as written by `export`
    ///
    /// Defaults to `<tenant>-users.json`
    #[clap(short, long)]
    snapshot: Option<Utf8PathBuf>,

    /// Do not actually issue mutating directory calls
    #[clap(long)]
    dry_run: bool,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let _span = info_span!("cli.link").entered();

        let directory_config =
            DirectoryConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
        let snapshots_config =
            SnapshotsConfig::extract_or_default(figment).map_err(anyhow::Error::from_boxed)?;
        let snapshot_path = users_dump_path(self.snapshot, &snapshots_config, &directory_config);

        let snapshot = load_user_snapshot(&snapshot_path).await?;
        info!("Found {} accounts inside the directory snapshot", snapshot.len());

        let index = GroupIndex::build(&snapshot);

        let directory = directory_from_config(&directory_config).await?;

        let report = LinkEngine::new(&directory)
            .dry_run(self.dry_run)
            .run(&index)
            .await
            .context("linking pass aborted")?;

        info!(
            groups = report.groups,
            linked = report.linked,
            already_linked = report.already_linked,
            metadata_pushes = report.metadata_pushes,
            metadata_conflicts = report.metadata_conflicts,
            ambiguous_groups = report.ambiguous_groups,
            unresolvable_groups = report.unresolvable_groups,
            skipped_in_downstream = report.skipped_in_downstream,
            residual_metadata_warnings = report.residual_metadata_warnings,
            "Linking pass finished"
        );

        Ok(ExitCode::SUCCESS)
    }
}
