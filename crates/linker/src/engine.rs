// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use iamr_directory::{Directory, IdentityRef, LinkOutcome, UserPatch};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    index::GroupIndex,
    metadata::{MetadataAction, reconcile},
    primary::{ResolveError, resolve_primary},
};

/// A failure that aborts the whole run.
///
/// Per-group problems (ambiguous primaries, metadata conflicts) are handled
/// in-loop and only counted; a directory failure on a mutating call means
/// the system may be partially linked, and the operator has to look before
/// anything else runs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to push app metadata from {secondary_user_id} into {primary_user_id}")]
    MetadataPush {
        primary_user_id: String,
        secondary_user_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to link {secondary_user_id} into {primary_user_id}")]
    Link {
        primary_user_id: String,
        secondary_user_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Tally of what a linking run did, for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Email groups processed.
    pub groups: usize,

    /// Groups skipped because several members already had linked children.
    pub ambiguous_groups: usize,

    /// Groups skipped because no member had a known connection type.
    pub unresolvable_groups: usize,

    /// Secondaries skipped over an app metadata conflict.
    pub metadata_conflicts: usize,

    /// App metadata pushes into a primary.
    pub metadata_pushes: usize,

    /// Secondaries with residual user metadata after consuming the
    /// downstream flag.
    pub residual_metadata_warnings: usize,

    /// Secondaries left alone because the downstream system already has a
    /// record for them.
    pub skipped_in_downstream: usize,

    /// Link operations issued (or, in a dry run, that would be issued).
    pub linked: usize,

    /// Link operations the directory reported as already done.
    pub already_linked: usize,
}

/// Drives the linking pass: resolves a primary per group, reconciles
/// metadata and issues the link calls.
pub struct LinkEngine<'a, D> {
    directory: &'a D,
    dry_run: bool,
}

impl<'a, D: Directory> LinkEngine<'a, D> {
    #[must_use]
    pub fn new(directory: &'a D) -> Self {
        Self {
            directory,
            dry_run: false,
        }
    }

    /// Analyse and report, but issue no mutating directory call.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the linking pass over the given group index.
    ///
    /// Safe to re-run after a crash: already-linked pairs come back as
    /// idempotency conflicts and are counted, not retried.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] on the first unclassified directory
    /// failure; no further groups are processed.
    pub async fn run(&self, index: &GroupIndex) -> Result<LinkReport, EngineError> {
        let mut report = LinkReport::default();

        for (email, group) in index.iter() {
            report.groups += 1;

            let primary_user_id = match resolve_primary(group) {
                Ok(primary_user_id) => primary_user_id,
                Err(err @ ResolveError::AmbiguousPrimary { .. }) => {
                    error!("Can't link accounts for {email} since {err}");
                    report.ambiguous_groups += 1;
                    continue;
                }
                Err(err @ ResolveError::NoKnownPrimary) => {
                    // A group where not even the `unknown` tier matched;
                    // corrupt input rather than something an operator caused
                    error!("Can't link accounts for {email} since {err}");
                    report.unresolvable_groups += 1;
                    continue;
                }
            };

            let primary = &group[primary_user_id];
            let secondary_user_ids: Vec<&str> = group
                .keys()
                .map(String::as_str)
                .filter(|&user_id| user_id != primary_user_id)
                .collect();

            info!(
                "{primary_user_id} ({email}) <-- {}",
                secondary_user_ids.join(", ")
            );

            for secondary_user_id in secondary_user_ids {
                let secondary = &group[secondary_user_id];
                let reconciliation = reconcile(primary, secondary);

                if !reconciliation.residual_user_metadata.is_empty() {
                    warn!(
                        "User {secondary_user_id} has user metadata: {:?}",
                        reconciliation.residual_user_metadata
                    );
                    report.residual_metadata_warnings += 1;
                }

                match reconciliation.action {
                    MetadataAction::Conflict => {
                        error!(
                            "Both primary account and linked account have conflicting \
                             app_metadata - aborting"
                        );

                        if reconciliation.exists_in_cis {
                            info!(
                                "Secondary account {secondary_user_id} exists downstream, \
                                 cannot delete - manually fix."
                            );
                        } else {
                            info!(
                                "Secondary account {secondary_user_id} does not exist \
                                 downstream, can delete."
                            );
                        }

                        report.metadata_conflicts += 1;
                        continue;
                    }

                    MetadataAction::Identical => {
                        debug!("Both primary and linked account have identical app_metadata");
                    }

                    MetadataAction::PushToPrimary(app_metadata) => {
                        warn!(
                            "User {secondary_user_id} has app metadata: {app_metadata:?}, \
                             merging into {primary_user_id}"
                        );

                        if self.dry_run {
                            info!(
                                "Would migrate {secondary_user_id}'s app metadata \
                                 into {primary_user_id}"
                            );
                        } else {
                            self.directory
                                .update_user(
                                    primary_user_id,
                                    UserPatch::new().app_metadata(app_metadata),
                                )
                                .await
                                .map_err(|source| EngineError::MetadataPush {
                                    primary_user_id: primary_user_id.to_owned(),
                                    secondary_user_id: secondary_user_id.to_owned(),
                                    source,
                                })?;

                            info!(
                                "Successfully migrated {secondary_user_id}'s app metadata \
                                 into {primary_user_id}"
                            );
                        }

                        report.metadata_pushes += 1;
                    }

                    MetadataAction::Nothing => {}
                }

                // Downstream already derived its state from the unlinked
                // topology; relinking would change the identity shape
                // underneath it
                if reconciliation.exists_in_cis {
                    debug!("Secondary account {secondary_user_id} exists downstream, not linking");
                    report.skipped_in_downstream += 1;
                    continue;
                }

                let secondary_ref = IdentityRef {
                    provider: secondary.provider.clone(),
                    user_id: secondary.user_id.clone(),
                };

                if self.dry_run {
                    info!("Would link {secondary_user_id} into {primary_user_id} for {email}");
                    report.linked += 1;
                    continue;
                }

                match self
                    .directory
                    .link_identity(primary_user_id, &secondary_ref)
                    .await
                    .map_err(|source| EngineError::Link {
                        primary_user_id: primary_user_id.to_owned(),
                        secondary_user_id: secondary_user_id.to_owned(),
                        source,
                    })? {
                    LinkOutcome::Linked => {
                        info!("Linked {secondary_user_id} into {primary_user_id} for {email}");
                        report.linked += 1;
                    }

                    LinkOutcome::AlreadyLinked => {
                        info!(
                            "{secondary_user_id} has already been linked into \
                             {primary_user_id} from previous run."
                        );
                        report.already_linked += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use iamr_data_model::{Identity, Metadata, User, UserSnapshot};
    use iamr_directory::MockDirectory;
    use serde_json::json;

    use super::*;

    fn user(user_id: &str, email: &str, connection: &str) -> User {
        let (provider, local_id) = user_id.split_once('|').unwrap();
        User {
            user_id: user_id.to_owned(),
            email: Some(email.to_owned()),
            identities: vec![Identity {
                connection: connection.to_owned(),
                provider: provider.to_owned(),
                user_id: local_id.to_owned(),
                profile_data: None,
            }],
            app_metadata: Metadata::new(),
            user_metadata: Metadata::new(),
            extra: Metadata::new(),
        }
    }

    fn unlinked(user_id: &str, email: &str, connection: &str) -> User {
        let mut user = user(user_id, email, connection);
        user.user_metadata = json!({"existsInCIS": false}).as_object().unwrap().clone();
        user
    }

    fn snapshot(users: Vec<User>) -> UserSnapshot {
        users
            .into_iter()
            .map(|user| (user.user_id.clone(), user))
            .collect()
    }

    #[tokio::test]
    async fn links_the_secondary_into_the_precedence_primary() {
        let snapshot = snapshot(vec![
            user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP"),
            unlinked("github|12345", "a@x.com", "github"),
        ]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.linked, 1);
        assert_eq!(
            directory.links(),
            vec![(
                "Mozilla-LDAP|bob".to_owned(),
                IdentityRef {
                    provider: "github".to_owned(),
                    user_id: "github|12345".to_owned(),
                }
            )]
        );
        assert!(directory.updates().is_empty());
    }

    #[tokio::test]
    async fn secondaries_present_downstream_are_not_linked() {
        // no existsInCIS flag at all: the default is "present downstream"
        let snapshot = snapshot(vec![
            user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP"),
            user("github|12345", "a@x.com", "github"),
        ]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.linked, 0);
        assert_eq!(report.skipped_in_downstream, 1);
        assert!(directory.links().is_empty());
    }

    #[tokio::test]
    async fn metadata_conflicts_skip_the_secondary_entirely() {
        let mut primary = user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP");
        primary.app_metadata = json!({"groups": ["vpn"]}).as_object().unwrap().clone();
        let mut secondary = unlinked("github|12345", "a@x.com", "github");
        secondary.app_metadata = json!({"groups": ["hr"]}).as_object().unwrap().clone();

        let snapshot = snapshot(vec![primary, secondary]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.metadata_conflicts, 1);
        assert_eq!(report.linked, 0);
        assert!(directory.links().is_empty());
        assert!(directory.updates().is_empty());
    }

    #[tokio::test]
    async fn secondary_metadata_is_pushed_before_linking() {
        let primary = user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP");
        let mut secondary = unlinked("github|12345", "a@x.com", "github");
        secondary.app_metadata = json!({"groups": ["vpn"]}).as_object().unwrap().clone();

        let snapshot = snapshot(vec![primary, secondary]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.metadata_pushes, 1);
        assert_eq!(report.linked, 1);

        let updates = directory.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "Mozilla-LDAP|bob");
        assert_eq!(
            updates[0].1.app_metadata.as_ref().unwrap()["groups"],
            json!(["vpn"])
        );
    }

    #[tokio::test]
    async fn reruns_treat_the_conflict_as_success() {
        let snapshot = snapshot(vec![
            user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP"),
            unlinked("github|12345", "a@x.com", "github"),
        ]);
        let directory = MockDirectory::new(snapshot.clone());
        directory.mark_linked(
            "Mozilla-LDAP|bob",
            IdentityRef {
                provider: "github".to_owned(),
                user_id: "github|12345".to_owned(),
            },
        );
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.linked, 0);
        assert_eq!(report.already_linked, 1);
        // the pre-recorded link is the only one
        assert_eq!(directory.links().len(), 1);
    }

    #[tokio::test]
    async fn unclassified_link_failures_abort_the_run() {
        let snapshot = snapshot(vec![
            user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP"),
            unlinked("github|12345", "a@x.com", "github"),
            user("Mozilla-LDAP|eve", "b@x.com", "Mozilla-LDAP"),
            unlinked("github|777", "b@x.com", "github"),
        ]);
        let directory = MockDirectory::new(snapshot.clone());
        directory.fail_links();
        let index = GroupIndex::build(&snapshot);

        let err = LinkEngine::new(&directory).run(&index).await.unwrap_err();

        assert_matches!(err, EngineError::Link { .. });
        assert!(directory.links().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_groups_issue_no_calls() {
        let mut bob = user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP");
        bob.identities.push(Identity {
            connection: "email".to_owned(),
            provider: "email".to_owned(),
            user_id: "aaa".to_owned(),
            profile_data: None,
        });
        let mut gh = unlinked("github|12345", "a@x.com", "github");
        gh.identities.push(Identity {
            connection: "google-oauth2".to_owned(),
            provider: "google-oauth2".to_owned(),
            user_id: "bbb".to_owned(),
            profile_data: None,
        });

        let snapshot = snapshot(vec![bob, gh]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory).run(&index).await.unwrap();

        assert_eq!(report.ambiguous_groups, 1);
        assert!(directory.links().is_empty());
        assert!(directory.updates().is_empty());
    }

    #[tokio::test]
    async fn dry_run_issues_no_mutating_calls() {
        let primary = user("Mozilla-LDAP|bob", "a@x.com", "Mozilla-LDAP");
        let mut secondary = unlinked("github|12345", "a@x.com", "github");
        secondary.app_metadata = json!({"groups": ["vpn"]}).as_object().unwrap().clone();

        let snapshot = snapshot(vec![primary, secondary]);
        let directory = MockDirectory::new(snapshot.clone());
        let index = GroupIndex::build(&snapshot);

        let report = LinkEngine::new(&directory)
            .dry_run(true)
            .run(&index)
            .await
            .unwrap();

        assert_eq!(report.metadata_pushes, 1);
        assert_eq!(report.linked, 1);
        assert!(directory.links().is_empty());
        assert!(directory.updates().is_empty());
    }
}
