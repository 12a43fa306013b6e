// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

//! Configuration for the IAM reconciliation tools, loaded through
//! [`figment`] so that the file and environment concerns stay out of the
//! engine crates.

mod sections;
mod util;

pub use self::{
    sections::{DirectoryConfig, RootConfig, SnapshotsConfig},
    util::{ConfigurationSection, ConfigurationSectionExt},
};
