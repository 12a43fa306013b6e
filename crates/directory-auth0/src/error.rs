// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::fmt::Display;

use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// The error document the Auth0 management API puts in failed response
/// bodies.
#[derive(Debug, Deserialize)]
struct Auth0ErrorBody {
    #[serde(rename = "statusCode")]
    status_code: u16,

    error: String,

    message: String,
}

/// Represents an error received from the directory.
/// Where possible, we capture the Auth0 error from the JSON response body.
#[derive(Debug, Error)]
pub(crate) struct Error {
    auth0_error: Option<Auth0ErrorBody>,

    #[source]
    source: reqwest::Error,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(auth0_error) = &self.auth0_error {
            write!(
                f,
                "{} {}: {}",
                auth0_error.status_code, auth0_error.error, auth0_error.message
            )
        } else {
            write!(f, "(no specific error)")
        }
    }
}

impl Error {
    /// The HTTP status of the failed response, if the failure came from a
    /// response at all.
    pub fn status(&self) -> Option<StatusCode> {
        self.source.status()
    }
}

/// An extension trait for [`reqwest::Response`] to help working with errors
/// from the Auth0 management API.
#[async_trait]
pub(crate) trait Auth0ResponseExt: Sized {
    async fn error_for_auth0_error(self) -> Result<Self, Error>;
}

#[async_trait]
impl Auth0ResponseExt for reqwest::Response {
    async fn error_for_auth0_error(self) -> Result<Self, Error> {
        match self.error_for_status_ref() {
            Ok(_response) => Ok(self),
            Err(source) => {
                let auth0_error = self.json().await.ok();
                Err(Error {
                    auth0_error,
                    source,
                })
            }
        }
    }
}
