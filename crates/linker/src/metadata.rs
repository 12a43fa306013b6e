// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use iamr_data_model::Metadata;
use serde_json::Value;

use crate::index::Member;

/// The flag recording whether the downstream system already materialized a
/// record for an account. Absent means yes.
const EXISTS_IN_CIS: &str = "existsInCIS";

/// What to do about a secondary's application metadata before linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataAction {
    /// Primary and secondary both carry metadata and it differs. Merging
    /// would lose one side, so the secondary is skipped and a human has to
    /// reconcile.
    Conflict,

    /// Primary and secondary carry structurally equal metadata; nothing to
    /// move.
    Identical,

    /// Only the secondary carries metadata; push it into the primary before
    /// linking.
    PushToPrimary(Metadata),

    /// The secondary carries no metadata.
    Nothing,
}

/// The per-secondary reconciliation verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Whether the downstream system already has a record for the secondary.
    /// Linking is only safe when it doesn't: downstream derived its state
    /// from the current unlinked topology.
    pub exists_in_cis: bool,

    /// User metadata left on the secondary after consuming the downstream
    /// flag. Nothing migrates this, so any residual key means data loss if
    /// the account later gets merged; callers warn about it.
    pub residual_user_metadata: Metadata,

    pub action: MetadataAction,
}

/// Compare a secondary account's metadata against the resolved primary's.
#[must_use]
pub fn reconcile(primary: &Member, secondary: &Member) -> Reconciliation {
    let mut user_metadata = secondary.user_metadata.clone();
    let exists_in_cis = user_metadata
        .remove(EXISTS_IN_CIS)
        .and_then(|value| value.as_bool())
        .unwrap_or(true);

    let mut app_metadata = secondary.app_metadata.clone();

    // An empty groups list is noise, not an actual permission set
    if app_metadata
        .get("groups")
        .and_then(Value::as_array)
        .is_some_and(Vec::is_empty)
    {
        app_metadata.remove("groups");
    }

    let action = if primary.app_metadata.is_empty() {
        if app_metadata.is_empty() {
            MetadataAction::Nothing
        } else {
            MetadataAction::PushToPrimary(app_metadata)
        }
    } else if app_metadata.is_empty() {
        MetadataAction::Nothing
    } else if maps_equal_unordered(&primary.app_metadata, &app_metadata) {
        MetadataAction::Identical
    } else {
        MetadataAction::Conflict
    };

    Reconciliation {
        exists_in_cis,
        residual_user_metadata: user_metadata,
        action,
    }
}

/// Structural equality between two JSON values, ignoring element order
/// inside arrays (at any depth). Everything else is strict: a missing key,
/// an extra element or a differing scalar is a difference.
#[must_use]
pub fn values_equal_unordered(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }

            // Multiset comparison: every element of `a` has to claim a
            // distinct, structurally-equal element of `b`
            let mut claimed = vec![false; b.len()];
            a.iter().all(|item| {
                b.iter().enumerate().any(|(i, candidate)| {
                    if !claimed[i] && values_equal_unordered(item, candidate) {
                        claimed[i] = true;
                        true
                    } else {
                        false
                    }
                })
            })
        }

        (Value::Object(a), Value::Object(b)) => maps_equal_unordered(a, b),

        (a, b) => a == b,
    }
}

fn maps_equal_unordered(a: &Metadata, b: &Metadata) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, value)| {
            b.get(key)
                .is_some_and(|other| values_equal_unordered(value, other))
        })
}

#[cfg(test)]
mod tests {
    use iamr_data_model::{ConnectionType, Metadata};
    use serde_json::json;

    use super::*;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().unwrap().clone()
    }

    fn member(user_id: &str, app_metadata: Metadata, user_metadata: Metadata) -> Member {
        Member {
            user_id: user_id.to_owned(),
            connection: "github".to_owned(),
            connection_type: ConnectionType::from_name("github"),
            provider: "github".to_owned(),
            identities_count: 1,
            app_metadata,
            user_metadata,
        }
    }

    #[test]
    fn list_order_does_not_matter() {
        assert!(values_equal_unordered(
            &json!({"groups": ["a", "b"]}),
            &json!({"groups": ["b", "a"]}),
        ));
    }

    #[test]
    fn everything_else_does_matter() {
        assert!(!values_equal_unordered(
            &json!({"groups": ["a"]}),
            &json!({"groups": ["a", "b"]}),
        ));
        assert!(!values_equal_unordered(
            &json!({"groups": ["a", "a"]}),
            &json!({"groups": ["a", "b"]}),
        ));
        assert!(!values_equal_unordered(
            &json!({"groups": ["a"], "flag": true}),
            &json!({"groups": ["a"]}),
        ));
        assert!(!values_equal_unordered(&json!("a"), &json!("b")));
    }

    #[test]
    fn nested_lists_compare_unordered_too() {
        assert!(values_equal_unordered(
            &json!({"acl": [{"groups": ["x", "y"]}]}),
            &json!({"acl": [{"groups": ["y", "x"]}]}),
        ));
    }

    #[test]
    fn the_downstream_flag_is_consumed_and_defaults_to_true() {
        let primary = member("email|1", Metadata::new(), Metadata::new());

        let secondary = member("github|2", Metadata::new(), Metadata::new());
        let verdict = reconcile(&primary, &secondary);
        assert!(verdict.exists_in_cis);
        assert!(verdict.residual_user_metadata.is_empty());

        let secondary = member(
            "github|2",
            Metadata::new(),
            metadata(json!({"existsInCIS": false})),
        );
        let verdict = reconcile(&primary, &secondary);
        assert!(!verdict.exists_in_cis);
        assert!(verdict.residual_user_metadata.is_empty());
    }

    #[test]
    fn leftover_user_metadata_is_reported() {
        let primary = member("email|1", Metadata::new(), Metadata::new());
        let secondary = member(
            "github|2",
            Metadata::new(),
            metadata(json!({"existsInCIS": true, "foo": "bar"})),
        );

        let verdict = reconcile(&primary, &secondary);
        assert!(verdict.exists_in_cis);
        assert_eq!(verdict.residual_user_metadata, metadata(json!({"foo": "bar"})));
    }

    #[test]
    fn empty_groups_are_dropped_before_comparing() {
        let primary = member("email|1", Metadata::new(), Metadata::new());
        let secondary = member(
            "github|2",
            metadata(json!({"groups": []})),
            Metadata::new(),
        );

        let verdict = reconcile(&primary, &secondary);
        assert_eq!(verdict.action, MetadataAction::Nothing);
    }

    #[test]
    fn differing_metadata_is_a_conflict() {
        let primary = member(
            "email|1",
            metadata(json!({"groups": ["vpn"]})),
            Metadata::new(),
        );
        let secondary = member(
            "github|2",
            metadata(json!({"groups": ["vpn", "hr"]})),
            Metadata::new(),
        );

        let verdict = reconcile(&primary, &secondary);
        assert_eq!(verdict.action, MetadataAction::Conflict);
    }

    #[test]
    fn reordered_metadata_is_identical() {
        let primary = member(
            "email|1",
            metadata(json!({"groups": ["vpn", "hr"]})),
            Metadata::new(),
        );
        let secondary = member(
            "github|2",
            metadata(json!({"groups": ["hr", "vpn"]})),
            Metadata::new(),
        );

        let verdict = reconcile(&primary, &secondary);
        assert_eq!(verdict.action, MetadataAction::Identical);
    }

    #[test]
    fn secondary_only_metadata_is_pushed() {
        let primary = member("email|1", Metadata::new(), Metadata::new());
        let secondary = member(
            "github|2",
            metadata(json!({"groups": ["vpn"]})),
            Metadata::new(),
        );

        let verdict = reconcile(&primary, &secondary);
        assert_eq!(
            verdict.action,
            MetadataAction::PushToPrimary(metadata(json!({"groups": ["vpn"]})))
        );
    }
}
