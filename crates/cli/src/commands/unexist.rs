// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8Path;
use clap::Parser;
use figment::Figment;
use iamr_config::{ConfigurationSection, DirectoryConfig};
use iamr_directory::{Directory, UserPatch};
use tracing::{info, info_span};

use crate::util::directory_from_config;

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// A user id, or a path to a file with one (percent-encoded) user id per
    /// line
    target: String,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let _span = info_span!("cli.unexist").entered();

        let directory_config =
            DirectoryConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
        let directory = directory_from_config(&directory_config).await?;

        let user_ids = resolve_targets(&self.target).await?;

        for user_id in user_ids {
            mark_not_in_downstream(&directory, &user_id).await?;
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Flip the downstream-presence flag to `false` on the record owning the
/// given identity.
async fn mark_not_in_downstream<D: Directory>(directory: &D, user_id: &str) -> anyhow::Result<()> {
    // The id might name a linked child; find the record that owns it
    let parents = directory
        .find_parents(user_id)
        .await
        .with_context(|| format!("Failed to search for {user_id}"))?;

    let [parent] = &parents[..] else {
        anyhow::bail!(
            "User search for {user_id} found {} users instead of one",
            parents.len()
        );
    };

    // The search serves from an eventually-consistent index and the patch
    // replaces user_metadata wholesale, so re-fetch the record before
    // touching it
    let parent = directory
        .get_user(&parent.user_id)
        .await
        .with_context(|| format!("Failed to fetch user {}", parent.user_id))?;

    let mut user_metadata = parent.user_metadata.clone();
    user_metadata.insert("existsInCIS".to_owned(), serde_json::Value::Bool(false));

    directory
        .update_user(&parent.user_id, UserPatch::new().user_metadata(user_metadata))
        .await
        .with_context(|| format!("Unable to update user {}", parent.user_id))?;

    if user_id == parent.user_id {
        info!("Successfully set existsInCIS to false for {user_id}");
    } else {
        info!(
            "Successfully set existsInCIS to false for {} on identity {user_id}",
            parent.user_id
        );
    }

    Ok(())
}

/// The target is either a file of percent-encoded user ids or a single user
/// id given directly on the command line.
async fn resolve_targets(target: &str) -> anyhow::Result<Vec<String>> {
    let path = Utf8Path::new(target);
    let raw_ids = if path.exists() {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Can't open {path:?}"))?
            .lines()
            .map(ToOwned::to_owned)
            .collect()
    } else {
        vec![target.to_owned()]
    };

    let mut user_ids = Vec::new();
    for raw in raw_ids {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let decoded = urlencoding::decode(raw)
            .with_context(|| format!("{raw:?} is not a valid percent-encoded user id"))?;
        user_ids.push(decoded.into_owned());
    }

    Ok(user_ids)
}
