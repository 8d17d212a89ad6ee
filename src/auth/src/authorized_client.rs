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

//! Sends requests with the bearer token from a [CredentialStore].

use crate::Result;
use crate::errors;
use crate::store::CredentialStore;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Response};

/// Authorizes outbound requests.
///
/// Each request carries `Authorization: Bearer <token>`. If the service
/// answers `401 Unauthorized` the token is refreshed, bypassing the cache, and
/// the request is sent once more. A second `401` is returned to the caller.
#[derive(Clone, Debug)]
pub struct AuthorizedClient {
    store: CredentialStore,
    client: Client,
}

impl AuthorizedClient {
    pub fn new(store: CredentialStore, client: Client) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Builds the request with `make_request` and sends it.
    ///
    /// `make_request` may be called twice, so it must produce the same request
    /// each time.
    pub async fn execute<F>(&self, make_request: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(&make_request, false).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        tracing::debug!(url = %response.url(), "request unauthorized, retrying with a new token");
        self.send(&make_request, true).await
    }

    async fn send<F>(&self, make_request: &F, force_refresh: bool) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.store.access_token(force_refresh).await?;
        make_request(&self.client)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, "failed to send authorized request"))
    }
}
