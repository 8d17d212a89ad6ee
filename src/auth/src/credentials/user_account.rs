// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [User Account] credentials, from an OAuth 2.0 refresh token.
//!
//! These are what `gcloud auth application-default login` writes to the
//! well-known file. They can fetch access tokens but cannot sign.
//!
//! [User Account]: https://cloud.google.com/docs/authentication/application-default-credentials#personal

use crate::Result;
use crate::clock::{self, Clock};
use crate::errors::CredentialsError;
use crate::http::{self, OAUTH2_TOKEN_ENDPOINT, REFRESH_TOKEN_GRANT_TYPE};
use crate::token::AccessToken;
use std::sync::Arc;

/// The contents of an `authorized_user` credentials file.
#[derive(Clone, serde::Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Credentials that run the OAuth 2.0 `refresh_token` grant.
#[derive(Clone, Debug)]
pub struct RefreshToken {
    user: AuthorizedUser,
    token_uri: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl RefreshToken {
    pub fn new(user: AuthorizedUser) -> Result<Self> {
        if user.refresh_token.is_empty() {
            return Err(CredentialsError::config(
                "authorized user credentials are missing `refresh_token`",
            ));
        }
        let token_uri = user
            .token_uri
            .clone()
            .unwrap_or_else(|| OAUTH2_TOKEN_ENDPOINT.to_string());
        Ok(Self {
            user,
            token_uri,
            client: reqwest::Client::new(),
            clock: clock::system(),
        })
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[tracing::instrument(skip_all, fields(client_id = %self.user.client_id))]
    pub async fn fetch_token(&self) -> Result<AccessToken> {
        let form = [
            ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
            ("client_id", self.user.client_id.as_str()),
            ("client_secret", self.user.client_secret.as_str()),
            ("refresh_token", self.user.refresh_token.as_str()),
        ];
        let response = http::exchange(
            &self.client,
            &self.token_uri,
            &form,
            "failed to refresh user access token",
        )
        .await?;
        Ok(response.into_access_token(self.clock.now()))
    }
}
