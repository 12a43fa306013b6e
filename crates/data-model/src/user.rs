// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to a provider account.
pub type Metadata = serde_json::Map<String, Value>;

/// A full snapshot of the identity provider, keyed by `user_id`.
///
/// This is the shape produced by the `export` command and consumed by the
/// `link` and `cross-check` commands. A `BTreeMap` keeps the dump sorted by
/// key and makes iteration order stable across runs.
pub type UserSnapshot = BTreeMap<String, User>;

/// One account as known to the identity provider.
///
/// Snapshots are read-only: nothing in this crate ever mutates a [`User`],
/// all mutation happens remotely through the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,

    /// Accounts without an email address can't be grouped for linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Index 0 is the top identity; indices 1+ are already-linked children.
    #[serde(default)]
    pub identities: Vec<Identity>,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub app_metadata: Metadata,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub user_metadata: Metadata,

    /// Fields of the provider record we carry through dumps untouched.
    #[serde(flatten)]
    pub extra: Metadata,
}

impl User {
    /// The identity the account signs in with.
    #[must_use]
    pub fn top_identity(&self) -> Option<&Identity> {
        self.identities.first()
    }

    /// Identities already merged under this account.
    #[must_use]
    pub fn linked_children(&self) -> &[Identity] {
        self.identities.get(1..).unwrap_or_default()
    }
}

/// One entry of a user's identity list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub connection: String,

    pub provider: String,

    /// The identity-local user id. Depending on the connection this may or
    /// may not carry the provider prefix; see [`Identity::canonical_user_id`].
    pub user_id: String,

    #[serde(
        default,
        rename = "profileData",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_data: Option<Metadata>,
}

impl Identity {
    /// The email recorded on the identity's profile, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.profile_data.as_ref()?.get("email")?.as_str()
    }

    /// Whether the identity carries any profile data at all.
    #[must_use]
    pub fn has_profile_data(&self) -> bool {
        self.profile_data.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Derive the globally-unique `user_id` for this identity.
    ///
    /// The provider is inconsistent about whether the per-identity `user_id`
    /// carries the connection prefix, so this normalises the four observed
    /// shapes into the form used as a top-level snapshot key.
    #[must_use]
    pub fn canonical_user_id(&self) -> String {
        let user_id = &self.user_id;

        if user_id.contains("ad|") || user_id.contains("oauth2|firefoxaccounts|") {
            user_id.clone()
        } else if user_id.contains("Mozilla-LDAP|") || user_id.contains("firefoxaccounts|") {
            format!("{}|{user_id}", self.provider)
        } else if user_id.contains('|') {
            user_id.clone()
        } else {
            format!("{}|{user_id}", self.connection)
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn ident(connection: &str, provider: &str, user_id: &str) -> Identity {
        Identity {
            connection: connection.to_owned(),
            provider: provider.to_owned(),
            user_id: user_id.to_owned(),
            profile_data: None,
        }
    }

    #[test]
    fn canonical_user_id_keeps_fully_qualified_ids() {
        let identity = ident("Mozilla-LDAP", "ad", "ad|Mozilla-LDAP|jdoe");
        assert_eq!(identity.canonical_user_id(), "ad|Mozilla-LDAP|jdoe");

        let identity = ident(
            "firefoxaccounts",
            "oauth2",
            "oauth2|firefoxaccounts|abcdef",
        );
        assert_eq!(identity.canonical_user_id(), "oauth2|firefoxaccounts|abcdef");
    }

    #[test]
    fn canonical_user_id_prepends_the_provider_for_partial_ids() {
        let identity = ident("Mozilla-LDAP", "ad", "Mozilla-LDAP|jdoe");
        assert_eq!(identity.canonical_user_id(), "ad|Mozilla-LDAP|jdoe");

        let identity = ident("firefoxaccounts", "oauth2", "firefoxaccounts|abcdef");
        assert_eq!(identity.canonical_user_id(), "oauth2|firefoxaccounts|abcdef");
    }

    #[test]
    fn canonical_user_id_keeps_other_prefixed_ids() {
        let identity = ident("github", "github", "github|12345");
        assert_eq!(identity.canonical_user_id(), "github|12345");
    }

    #[test]
    fn canonical_user_id_prepends_the_connection_for_bare_ids() {
        let identity = ident("github", "github", "12345");
        assert_eq!(identity.canonical_user_id(), "github|12345");
    }

    #[test]
    fn snapshot_deserializes() {
        let snapshot: UserSnapshot = serde_json::from_str(indoc! {r#"
            {
              "email|507f1f77bcf86cd799439011": {
                "user_id": "email|507f1f77bcf86cd799439011",
                "email": "jdoe@example.com",
                "identities": [
                  {
                    "connection": "email",
                    "provider": "email",
                    "user_id": "507f1f77bcf86cd799439011"
                  }
                ],
                "user_metadata": {"existsInCIS": false},
                "name": "Jane Doe"
              }
            }
        "#})
        .unwrap();

        let user = &snapshot["email|507f1f77bcf86cd799439011"];
        assert_eq!(user.email.as_deref(), Some("jdoe@example.com"));
        assert_eq!(user.identities.len(), 1);
        assert!(user.linked_children().is_empty());
        assert_eq!(
            user.top_identity().unwrap().canonical_user_id(),
            "email|507f1f77bcf86cd799439011"
        );
        // unknown provider fields survive a round-trip
        assert_eq!(user.extra["name"], "Jane Doe");
    }
}
