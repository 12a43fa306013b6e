// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

//! The account-linking decision engine.
//!
//! Given a snapshot of the identity provider, this crate groups accounts by
//! email address, resolves a deterministic primary account per group,
//! reconciles application metadata between primary and secondaries, and
//! issues idempotent link operations against the directory. A companion
//! cross-checker reports linked child identities that leaked into the
//! downstream record set.

pub(crate) mod crosscheck;
pub(crate) mod engine;
pub(crate) mod index;
pub(crate) mod metadata;
pub(crate) mod primary;

pub use self::{
    crosscheck::{CrossCheck, CrossCheckReport, cross_check},
    engine::{EngineError, LinkEngine, LinkReport},
    index::{Group, GroupIndex, Member},
    metadata::{MetadataAction, Reconciliation, reconcile, values_equal_unordered},
    primary::{ResolveError, resolve_primary},
};
