// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use anyhow::{Context, bail};
use error::Auth0ResponseExt;
use http::{Method, StatusCode};
use iamr_data_model::User;
use iamr_directory::{Directory, IdentityRef, LinkOutcome, UserPatch};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

mod error;

/// Grant type for the management API token exchange.
static CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

/// Client credentials used to obtain a management API token.
#[derive(Clone)]
pub struct Auth0Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// A [`Directory`] backed by the Auth0 management API.
#[derive(Clone)]
pub struct Auth0Directory {
    tenant: String,
    endpoint: Url,
    access_token: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Response body of `/api/v2/users?include_totals=true`
#[derive(Deserialize)]
struct UserListResponse {
    users: Vec<User>,
}

impl Auth0Directory {
    #[must_use]
    pub fn new(
        tenant: String,
        endpoint: Url,
        access_token: String,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            tenant,
            endpoint,
            access_token,
            http_client,
        }
    }

    /// Exchange client credentials for a management API token and build a
    /// directory client out of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant name doesn't form a valid URL or the
    /// token exchange fails.
    #[tracing::instrument(
        name = "directory.connect",
        skip_all,
        fields(directory.tenant = tenant),
        err(Debug),
    )]
    pub async fn connect(
        tenant: String,
        credentials: &Auth0Credentials,
        http_client: reqwest::Client,
    ) -> Result<Self, anyhow::Error> {
        let endpoint = Url::parse(&format!("https://{tenant}/"))
            .with_context(|| format!("invalid tenant name {tenant:?}"))?;

        let response = http_client
            .post(endpoint.join("oauth/token").map(String::from).unwrap_or_default())
            .json(&TokenRequest {
                grant_type: CLIENT_CREDENTIALS_GRANT,
                client_id: &credentials.client_id,
                client_secret: &credentials.client_secret,
                audience: format!("https://{tenant}/api/v2/"),
            })
            .send()
            .await
            .context("Failed to request a management API token")?;

        let response = response
            .error_for_auth0_error()
            .await
            .context("Token exchange was rejected by the directory")?;

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to deserialize the token exchange response")?;

        Ok(Self::new(tenant, endpoint, body.access_token, http_client))
    }

    fn builder(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(
                method,
                self.endpoint
                    .join(url)
                    .map(String::from)
                    .unwrap_or_default(),
            )
            .bearer_auth(&self.access_token)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.builder(Method::GET, url)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.builder(Method::POST, url)
    }

    fn patch(&self, url: &str) -> reqwest::RequestBuilder {
        self.builder(Method::PATCH, url)
    }
}

#[async_trait::async_trait]
impl Directory for Auth0Directory {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    #[tracing::instrument(
        name = "directory.list_users",
        skip_all,
        fields(
            directory.tenant = self.tenant,
            directory.page = page,
        ),
        err(Debug),
    )]
    async fn list_users(&self, page: u32, page_size: u32) -> Result<Vec<User>, anyhow::Error> {
        let response = self
            .get(&format!(
                "api/v2/users?page={page}&per_page={page_size}&include_totals=true"
            ))
            .send()
            .await
            .context("Failed to list users from the directory")?;

        let response = response
            .error_for_auth0_error()
            .await
            .context("Unexpected HTTP response while listing users from the directory")?;

        let body: UserListResponse = response
            .json()
            .await
            .context("Failed to deserialize response while listing users from the directory")?;

        Ok(body.users)
    }

    #[tracing::instrument(
        name = "directory.get_user",
        skip_all,
        fields(
            directory.tenant = self.tenant,
            user.id = user_id,
        ),
        err(Debug),
    )]
    async fn get_user(&self, user_id: &str) -> Result<User, anyhow::Error> {
        let user_id = urlencoding::encode(user_id);

        let response = self
            .get(&format!("api/v2/users/{user_id}"))
            .send()
            .await
            .context("Failed to query user from the directory")?;

        let response = response
            .error_for_auth0_error()
            .await
            .context("Unexpected HTTP response while querying user from the directory")?;

        let body: User = response
            .json()
            .await
            .context("Failed to deserialize response while querying user from the directory")?;

        Ok(body)
    }

    #[tracing::instrument(
        name = "directory.update_user",
        skip_all,
        fields(
            directory.tenant = self.tenant,
            user.id = user_id,
        ),
        err(Debug),
    )]
    async fn update_user(&self, user_id: &str, patch: UserPatch) -> Result<User, anyhow::Error> {
        let user_id = urlencoding::encode(user_id);

        let response = self
            .patch(&format!("api/v2/users/{user_id}"))
            .json(&patch)
            .send()
            .await
            .context("Failed to update user in the directory")?;

        let response = response
            .error_for_auth0_error()
            .await
            .context("Unexpected HTTP response while updating user in the directory")?;

        let body: User = response
            .json()
            .await
            .context("Failed to deserialize response while updating user in the directory")?;

        Ok(body)
    }

    #[tracing::instrument(
        name = "directory.link_identity",
        skip_all,
        fields(
            directory.tenant = self.tenant,
            user.id = primary_user_id,
        ),
        err(Debug),
    )]
    async fn link_identity(
        &self,
        primary_user_id: &str,
        secondary: &IdentityRef,
    ) -> Result<LinkOutcome, anyhow::Error> {
        let encoded_user_id = urlencoding::encode(primary_user_id);

        let response = self
            .post(&format!("api/v2/users/{encoded_user_id}/identities"))
            .json(secondary)
            .send()
            .await
            .context("Failed to link identity in the directory")?;

        match response.error_for_auth0_error().await {
            Ok(response) => match response.status() {
                StatusCode::CREATED | StatusCode::OK => Ok(LinkOutcome::Linked),
                code => bail!("Unexpected HTTP code while linking identity: {code}"),
            },

            // A 400 or 409 means the pair is already linked, which can happen
            // on reruns after a partial prior run.
            Err(err)
                if err.status() == Some(StatusCode::BAD_REQUEST)
                    || err.status() == Some(StatusCode::CONFLICT) =>
            {
                debug!(
                    error = &err as &dyn std::error::Error,
                    "Identity was already linked"
                );
                Ok(LinkOutcome::AlreadyLinked)
            }

            Err(err) => Err(err).context("Failed to link identity in the directory"),
        }
    }

    #[tracing::instrument(
        name = "directory.find_parents",
        skip_all,
        fields(
            directory.tenant = self.tenant,
            user.id = user_id,
        ),
        err(Debug),
    )]
    async fn find_parents(&self, user_id: &str) -> Result<Vec<User>, anyhow::Error> {
        // The per-identity user id doesn't carry the connection prefix
        let local_id = user_id.split_once('|').map_or(user_id, |(_, rest)| rest);
        let query = format!("user_id:\"{user_id}\" OR identities.user_id:\"{local_id}\"");
        let query = urlencoding::encode(&query);

        let response = self
            .get(&format!(
                "api/v2/users?q={query}&search_engine=v3&include_totals=true"
            ))
            .send()
            .await
            .context("Failed to search for the parent record in the directory")?;

        let response = response
            .error_for_auth0_error()
            .await
            .context("Unexpected HTTP response while searching the directory")?;

        let body: UserListResponse = response
            .json()
            .await
            .context("Failed to deserialize response while searching the directory")?;

        Ok(body.users)
    }
}
