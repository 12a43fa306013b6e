// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

mod mock;

use iamr_data_model::{Metadata, User};
use serde::Serialize;

pub use self::mock::MockDirectory;

/// The `{provider, user_id}` pair the directory needs to identify the
/// secondary identity in a link call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRef {
    pub provider: String,
    pub user_id: String,
}

/// What a successful link call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The identity was linked into the primary account.
    Linked,

    /// The directory already had this link, e.g. from a partial prior run.
    /// Linking is idempotent, so this is a no-op success.
    AlreadyLinked,
}

/// A partial-field merge for [`Directory::update_user`]: only the fields that
/// are set get replaced on the remote record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<Metadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Metadata>,
}

impl UserPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn app_metadata(mut self, app_metadata: Metadata) -> Self {
        self.app_metadata = Some(app_metadata);
        self
    }

    #[must_use]
    pub fn user_metadata(mut self, user_metadata: Metadata) -> Self {
        self.user_metadata = Some(user_metadata);
        self
    }
}

/// The identity directory the reconciliation tools talk to.
///
/// Implementations are expected to classify link failures themselves: an
/// idempotency conflict surfaces as [`LinkOutcome::AlreadyLinked`], anything
/// else is an error the caller treats as fatal for the whole run.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// The tenant this directory serves, e.g. `auth.example.com`.
    fn tenant(&self) -> &str;

    /// Fetch one page of user records. An empty page signals the end of the
    /// listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable.
    async fn list_users(&self, page: u32, page_size: u32) -> Result<Vec<User>, anyhow::Error>;

    /// Fetch a single user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable or the user does not
    /// exist.
    async fn get_user(&self, user_id: &str) -> Result<User, anyhow::Error>;

    /// Apply a partial-field merge to a user record and return the updated
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable or rejects the patch.
    async fn update_user(&self, user_id: &str, patch: UserPatch) -> Result<User, anyhow::Error>;

    /// Link a secondary identity into the given primary account.
    ///
    /// # Errors
    ///
    /// Returns an error on any directory failure that is not the
    /// already-linked idempotency conflict.
    async fn link_identity(
        &self,
        primary_user_id: &str,
        secondary: &IdentityRef,
    ) -> Result<LinkOutcome, anyhow::Error>;

    /// Search for the top-level records owning the given identity, either as
    /// their own `user_id` or as one of their linked children.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable.
    async fn find_parents(&self, user_id: &str) -> Result<Vec<User>, anyhow::Error>;
}
