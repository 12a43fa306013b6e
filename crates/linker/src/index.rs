// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::BTreeMap;

use iamr_data_model::{ConnectionType, Metadata, UserSnapshot};
use tracing::{error, info, warn};

/// The reduced view of an account the linking engine works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Top-level `user_id` of the account.
    pub user_id: String,

    /// Connection name of the account's top identity.
    pub connection: String,

    /// The known connection type, if the connection name maps to one.
    pub connection_type: Option<ConnectionType>,

    /// Provider of the account's top identity.
    pub provider: String,

    /// Number of identities, children included. More than one means the
    /// account already has linked children.
    pub identities_count: usize,

    pub app_metadata: Metadata,

    pub user_metadata: Metadata,
}

/// Accounts sharing one email address, keyed by `user_id`.
///
/// The `BTreeMap` gives a lexicographic iteration order, which is what makes
/// primary resolution reproducible when two members sit in the same
/// precedence tier.
pub type Group = BTreeMap<String, Member>;

/// The email-to-accounts index the linking engine iterates over.
///
/// Only groups with at least two members are kept; there is no linking work
/// to do in a singleton group.
#[derive(Debug, Default)]
pub struct GroupIndex {
    groups: BTreeMap<String, Group>,
}

impl GroupIndex {
    /// Reduce a provider snapshot into the linking work set.
    ///
    /// Accounts without an email address can't be grouped and are skipped
    /// with an error log. Email mismatches between an account and its linked
    /// children are detected and logged, nothing more: moving unlinked
    /// accounts across email groups was considered upstream and rejected.
    #[must_use]
    pub fn build(snapshot: &UserSnapshot) -> Self {
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();

        for (user_id, user) in snapshot {
            let Some(email) = &user.email else {
                error!("{user_id} doesn't have a bound email address");
                continue;
            };

            let Some(top) = user.top_identity() else {
                error!("{user_id} doesn't have any identity");
                continue;
            };

            groups.entry(email.clone()).or_default().insert(
                user_id.clone(),
                Member {
                    user_id: user_id.clone(),
                    connection: top.connection.clone(),
                    connection_type: ConnectionType::from_name(&top.connection),
                    provider: top.provider.clone(),
                    identities_count: user.identities.len(),
                    app_metadata: user.app_metadata.clone(),
                    user_metadata: user.user_metadata.clone(),
                },
            );
        }

        for (user_id, user) in snapshot {
            let Some(email) = &user.email else { continue };

            for identity in user.linked_children() {
                let Some(identity_email) = identity.email() else {
                    continue;
                };

                if identity_email != email {
                    warn!(
                        "{user_id} has an email mismatch across linked accounts: \
                         {email} & {identity_email}"
                    );
                }
            }
        }

        groups.retain(|_, members| members.len() > 1);

        info!("Found {} accounts that require linking.", groups.len());

        Self { groups }
    }

    /// Number of multi-account email groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Group)> {
        self.groups.iter()
    }
}
