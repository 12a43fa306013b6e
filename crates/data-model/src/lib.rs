// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

pub(crate) mod connection;
pub(crate) mod user;

pub use self::{
    connection::{CONNECTION_SUPREMACY_ORDER, ConnectionType},
    user::{Identity, Metadata, User, UserSnapshot},
};
