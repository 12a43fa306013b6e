// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use figment::Figment;
use iamr_config::{ConfigurationSectionExt, SnapshotsConfig};
use iamr_linker::cross_check;
use tracing::{info, info_span, warn};

use crate::util::{load_downstream_keys, load_user_snapshot};

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// The identity-provider user dump, as written by `export`
    #[clap(long, env = "AUTH0_USERS_DUMP")]
    users_dump: Option<Utf8PathBuf>,

    /// The downstream record dump
    #[clap(long, env = "CIS_USERS_DUMP")]
    downstream_dump: Option<Utf8PathBuf>,

    /// The path to write the report to
    #[clap(short, long, default_value = "check-linked-children-in-cis.json")]
    output: Utf8PathBuf,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let _span = info_span!("cli.cross_check").entered();

        let snapshots_config =
            SnapshotsConfig::extract_or_default(figment).map_err(anyhow::Error::from_boxed)?;

        let users_dump = self
            .users_dump
            .or(snapshots_config.users_dump)
            .context("no identity-provider dump configured")?;
        let downstream_dump = self
            .downstream_dump
            .or(snapshots_config.downstream_dump)
            .context("no downstream dump configured")?;

        let provider = load_user_snapshot(&users_dump).await?;
        let downstream = load_downstream_keys(&downstream_dump).await?;

        let check = cross_check(&provider, &downstream);

        info!(
            "{} linked accounts still present downstream",
            check.overlapping.len()
        );

        let report = serde_json::to_vec_pretty(&check.report())?;
        tokio::fs::write(&self.output, report)
            .await
            .with_context(|| format!("Failed to write the report to {:?}", self.output))?;

        // The ones a human should look at, on stdout for piping
        for user_id in &check.follow_up {
            warn!("{user_id} carries its own profile data, needs manual follow-up");
            println!("{user_id}");
        }

        Ok(ExitCode::SUCCESS)
    }
}
