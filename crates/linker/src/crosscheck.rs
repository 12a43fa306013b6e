// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::{BTreeMap, BTreeSet};

use iamr_data_model::UserSnapshot;
use serde::Serialize;

/// LDAP records reach the downstream system through a separate sync path, so
/// their presence on both sides is expected, not a leak.
const LDAP_SYNC_PREFIX: &str = "ad|Mozilla-LDAP";

/// The JSON document written by the cross-check command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossCheckReport {
    /// Linked child identities that are also top-level downstream records,
    /// sorted. Should be empty in a healthy system.
    pub users: Vec<String>,
}

/// Result of crossing the provider snapshot against the downstream record
/// set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCheck {
    /// Every linked child identity present downstream, sorted.
    pub overlapping: Vec<String>,

    /// The overlapping identities worth a manual look: not LDAP-synced, and
    /// carrying profile data of their own.
    pub follow_up: Vec<String>,
}

impl CrossCheck {
    #[must_use]
    pub fn report(&self) -> CrossCheckReport {
        CrossCheckReport {
            users: self.overlapping.clone(),
        }
    }
}

/// Compute which linked child identities leaked into the downstream record
/// set.
///
/// A child identity got merged under a primary, so the downstream system
/// should have suppressed its own record for it when the link happened.
#[must_use]
pub fn cross_check(provider: &UserSnapshot, downstream: &BTreeSet<String>) -> CrossCheck {
    // canonical child id -> whether any occurrence carries profile data
    let mut linked: BTreeMap<String, bool> = BTreeMap::new();

    for user in provider.values() {
        for identity in user.linked_children() {
            let has_profile = identity.has_profile_data();
            linked
                .entry(identity.canonical_user_id())
                .and_modify(|flag| *flag |= has_profile)
                .or_insert(has_profile);
        }
    }

    let mut overlapping = Vec::new();
    let mut follow_up = Vec::new();

    // BTreeMap iteration keeps both lists sorted
    for (user_id, has_profile) in linked {
        if !downstream.contains(&user_id) {
            continue;
        }

        if !user_id.starts_with(LDAP_SYNC_PREFIX) && has_profile {
            follow_up.push(user_id.clone());
        }

        overlapping.push(user_id);
    }

    CrossCheck {
        overlapping,
        follow_up,
    }
}
