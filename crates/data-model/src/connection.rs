// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

/// The authentication backend an identity comes from.
///
/// The variants are ordered by supremacy: when multiple unlinked accounts
/// share an email address, the account on the highest-ranked backend becomes
/// the primary the others get linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionType {
    /// `Mozilla-LDAP`, the production directory service
    Ldap,

    /// `Mozilla-LDAP-Dev`, the development directory service
    LdapDev,

    /// `firefoxaccounts`, the federated account provider
    FirefoxAccounts,

    /// `github`
    Github,

    /// `google-oauth2`
    GoogleOauth2,

    /// `email`, passwordless email-only accounts
    Email,

    /// Accounts explicitly tagged `unknown` by the provider
    Unknown,
}

/// Connection types from the most to the least authoritative.
pub const CONNECTION_SUPREMACY_ORDER: [ConnectionType; 7] = [
    ConnectionType::Ldap,
    ConnectionType::LdapDev,
    ConnectionType::FirefoxAccounts,
    ConnectionType::Github,
    ConnectionType::GoogleOauth2,
    ConnectionType::Email,
    ConnectionType::Unknown,
];

impl ConnectionType {
    /// Map a provider connection name to a known connection type.
    ///
    /// Returns [`None`] for connection names we don't know about; an account
    /// on such a connection can never be picked as a primary.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Mozilla-LDAP" => Some(Self::Ldap),
            "Mozilla-LDAP-Dev" => Some(Self::LdapDev),
            "firefoxaccounts" => Some(Self::FirefoxAccounts),
            "github" => Some(Self::Github),
            "google-oauth2" => Some(Self::GoogleOauth2),
            "email" => Some(Self::Email),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Position in the supremacy order, lower is more authoritative.
    #[must_use]
    pub fn supremacy(self) -> usize {
        CONNECTION_SUPREMACY_ORDER
            .iter()
            .position(|&c| c == self)
            .unwrap_or(CONNECTION_SUPREMACY_ORDER.len())
    }
}
