// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Mutex;

use anyhow::Context;
use iamr_data_model::{User, UserSnapshot};

use crate::{Directory, IdentityRef, LinkOutcome, UserPatch};

#[derive(Debug, Default)]
struct MockState {
    users: UserSnapshot,
    links: Vec<(String, IdentityRef)>,
    updates: Vec<(String, UserPatch)>,
    fail_links: bool,
}

/// An in-memory [`Directory`] for tests, which records every mutating call
/// it receives.
#[derive(Debug, Default)]
pub struct MockDirectory {
    state: Mutex<MockState>,
}

impl MockDirectory {
    #[must_use]
    pub fn new(users: UserSnapshot) -> Self {
        Self {
            state: Mutex::new(MockState {
                users,
                ..MockState::default()
            }),
        }
    }

    /// Pre-record a link, as if a previous run had issued it. Subsequent
    /// [`Directory::link_identity`] calls for the same pair answer with the
    /// idempotency conflict.
    pub fn mark_linked(&self, primary_user_id: &str, secondary: IdentityRef) {
        self.state
            .lock()
            .unwrap()
            .links
            .push((primary_user_id.to_owned(), secondary));
    }

    /// Make every subsequent link call fail, to exercise the fatal path.
    pub fn fail_links(&self) {
        self.state.lock().unwrap().fail_links = true;
    }

    /// The link calls issued so far, including pre-recorded ones.
    #[must_use]
    pub fn links(&self) -> Vec<(String, IdentityRef)> {
        self.state.lock().unwrap().links.clone()
    }

    /// The update calls issued so far.
    #[must_use]
    pub fn updates(&self) -> Vec<(String, UserPatch)> {
        self.state.lock().unwrap().updates.clone()
    }
}

#[async_trait::async_trait]
impl Directory for MockDirectory {
    fn tenant(&self) -> &str {
        "mock.example.com"
    }

    async fn list_users(&self, page: u32, page_size: u32) -> Result<Vec<User>, anyhow::Error> {
        let state = self.state.lock().unwrap();
        let start = page as usize * page_size as usize;
        Ok(state
            .users
            .values()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn get_user(&self, user_id: &str) -> Result<User, anyhow::Error> {
        let state = self.state.lock().unwrap();
        state
            .users
            .get(user_id)
            .cloned()
            .with_context(|| format!("user {user_id} not found"))
    }

    async fn update_user(&self, user_id: &str, patch: UserPatch) -> Result<User, anyhow::Error> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((user_id.to_owned(), patch.clone()));

        let user = state
            .users
            .get_mut(user_id)
            .with_context(|| format!("user {user_id} not found"))?;

        if let Some(app_metadata) = patch.app_metadata {
            user.app_metadata = app_metadata;
        }
        if let Some(user_metadata) = patch.user_metadata {
            user.user_metadata = user_metadata;
        }

        Ok(user.clone())
    }

    async fn link_identity(
        &self,
        primary_user_id: &str,
        secondary: &IdentityRef,
    ) -> Result<LinkOutcome, anyhow::Error> {
        let mut state = self.state.lock().unwrap();

        if state.fail_links {
            anyhow::bail!("directory refused to link {secondary:?} into {primary_user_id}");
        }

        let already = state
            .links
            .iter()
            .any(|(primary, linked)| primary == primary_user_id && linked == secondary);
        if already {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        state
            .links
            .push((primary_user_id.to_owned(), secondary.clone()));
        Ok(LinkOutcome::Linked)
    }

    async fn find_parents(&self, user_id: &str) -> Result<Vec<User>, anyhow::Error> {
        let local_id = user_id.split_once('|').map_or(user_id, |(_, rest)| rest);

        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .values()
            .filter(|user| {
                user.user_id == user_id
                    || user
                        .identities
                        .iter()
                        .any(|identity| identity.user_id == local_id)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use iamr_data_model::Identity;

    use super::*;

    fn user(user_id: &str, connection: &str, local_id: &str) -> User {
        User {
            user_id: user_id.to_owned(),
            email: None,
            identities: vec![Identity {
                connection: connection.to_owned(),
                provider: connection.to_owned(),
                user_id: local_id.to_owned(),
                profile_data: None,
            }],
            app_metadata: iamr_data_model::Metadata::new(),
            user_metadata: iamr_data_model::Metadata::new(),
            extra: iamr_data_model::Metadata::new(),
        }
    }

    fn snapshot() -> UserSnapshot {
        let mut users = UserSnapshot::new();
        for (user_id, connection, local_id) in [
            ("email|1", "email", "1"),
            ("github|2", "github", "2"),
            ("github|3", "github", "3"),
        ] {
            users.insert(user_id.to_owned(), user(user_id, connection, local_id));
        }
        users
    }

    #[tokio::test]
    async fn pagination_ends_with_an_empty_page() {
        let directory = MockDirectory::new(snapshot());

        assert_eq!(directory.list_users(0, 2).await.unwrap().len(), 2);
        assert_eq!(directory.list_users(1, 2).await.unwrap().len(), 1);
        assert!(directory.list_users(2, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relinking_is_a_conflict() {
        let directory = MockDirectory::new(snapshot());
        let secondary = IdentityRef {
            provider: "github".to_owned(),
            user_id: "2".to_owned(),
        };

        let first = directory
            .link_identity("email|1", &secondary)
            .await
            .unwrap();
        assert_eq!(first, LinkOutcome::Linked);

        let second = directory
            .link_identity("email|1", &secondary)
            .await
            .unwrap();
        assert_eq!(second, LinkOutcome::AlreadyLinked);
    }

    #[tokio::test]
    async fn find_parents_matches_by_identity_local_id() {
        let directory = MockDirectory::new(snapshot());

        let parents = directory.find_parents("github|2").await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].user_id, "github|2");
    }
}
