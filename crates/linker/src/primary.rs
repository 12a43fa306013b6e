// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use thiserror::Error;

use crate::index::Group;

/// Why a group of accounts has no resolvable primary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// More than one member already has linked children. Linking anything
    /// here would have to merge two existing identity trees, which we can't
    /// do; the group is skipped.
    #[error("accounts {} each contain linked accounts", user_ids.join(" & "))]
    AmbiguousPrimary { user_ids: Vec<String> },

    /// No member has a known connection type. This shouldn't happen on real
    /// provider data and points at a corrupt snapshot.
    #[error("no account has a known connection type")]
    NoKnownPrimary,
}

/// Deterministically pick the primary account of a multi-account group.
///
/// An account that already has linked children must be the primary: its
/// children were linked under it in a previous run, and moving them is not
/// possible. Failing that, the member on the most authoritative connection
/// wins; within one connection tier the lexicographically smallest `user_id`
/// wins, which keeps the choice stable across runs.
///
/// # Errors
///
/// Returns [`ResolveError::AmbiguousPrimary`] if several members already
/// have linked children, [`ResolveError::NoKnownPrimary`] if no member is on
/// a known connection.
pub fn resolve_primary(group: &Group) -> Result<&str, ResolveError> {
    let already_linked: Vec<&str> = group
        .values()
        .filter(|member| member.identities_count > 1)
        .map(|member| member.user_id.as_str())
        .collect();

    match already_linked[..] {
        [] => {}
        [primary] => return Ok(primary),
        _ => {
            return Err(ResolveError::AmbiguousPrimary {
                user_ids: already_linked.iter().map(|&id| id.to_owned()).collect(),
            });
        }
    }

    group
        .values()
        .filter_map(|member| {
            member
                .connection_type
                .map(|connection| (connection.supremacy(), member.user_id.as_str()))
        })
        .min()
        .map(|(_, user_id)| user_id)
        .ok_or(ResolveError::NoKnownPrimary)
}
