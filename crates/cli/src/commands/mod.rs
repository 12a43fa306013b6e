// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};

mod config;
mod crosscheck;
mod export;
mod link;
mod unexist;

#[derive(Parser, Debug)]
#[command(version, about = "Reconcile identity-provider accounts with the downstream record set")]
pub struct Options {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "IAMR_CONFIG",
        action = clap::ArgAction::Append
    )]
    config: Vec<Utf8PathBuf>,

    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Configuration-related commands
    Config(self::config::Options),

    /// Export all users of the directory to a snapshot file
    Export(self::export::Options),

    /// Link accounts sharing an email address under one primary account
    Link(self::link::Options),

    /// Report linked child identities that are still present downstream
    CrossCheck(self::crosscheck::Options),

    /// Mark accounts as no longer present in the downstream system
    Unexist(self::unexist::Options),
}

impl Options {
    /// Build the figment over the configured config files and the
    /// environment.
    pub fn figment(&self) -> Figment {
        let configs = if self.config.is_empty() {
            vec![Utf8PathBuf::from("config.yaml")]
        } else {
            self.config.clone()
        };

        let mut figment = Figment::new();
        for config in configs {
            figment = figment.merge(Yaml::file(config));
        }

        figment.merge(Env::prefixed("IAMR_").split("__"))
    }

    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as S;
        match self.subcommand {
            S::Config(c) => c.run(figment).await,
            S::Export(c) => c.run(figment).await,
            S::Link(c) => c.run(figment).await,
            S::CrossCheck(c) => c.run(figment).await,
            S::Unexist(c) => c.run(figment).await,
        }
    }
}
