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

//! [Metadata Service] credentials.
//!
//! Google Cloud environments such as [Google Compute Engine (GCE)][gce-link],
//! [Google Kubernetes Engine (GKE)][gke-link], or [Cloud Run] provide a
//! metadata service. It serves access tokens for the service account attached
//! to the workload. No key material is available locally, so signing goes
//! through the IAM `signBlob` API.
//!
//! The email and project of the default service account are read once, when
//! the credentials are built. Access tokens are fetched on every
//! [fetch_token][MetadataServer::fetch_token] call.
//!
//! [Cloud Run]: https://cloud.google.com/run
//! [gce-link]: https://cloud.google.com/products/compute
//! [gke-link]: https://cloud.google.com/kubernetes-engine
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use super::Identity;
use crate::Result;
use crate::clock::{self, Clock};
use crate::mds::client::Client;
use crate::refresher::{RefreshSource, SingleFlightRefresher};
use crate::signer::iam::IamSigner;
use crate::token::{AccessToken, TOKEN_SAFETY_MARGIN};
use std::sync::Arc;
use time::Duration;

/// Credentials for the default service account of the instance.
#[derive(Clone, Debug)]
pub struct MetadataServer {
    client: Client,
    identity: Identity,
    signer: IamSigner,
    clock: Arc<dyn Clock>,
}

impl MetadataServer {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Fetches a new token from the metadata server.
    #[tracing::instrument(skip_all, fields(endpoint = %self.client.endpoint()))]
    pub async fn fetch_token(&self) -> Result<AccessToken> {
        fetch_token(&self.client, self.clock.as_ref()).await
    }

    /// Signs `content` through the IAM `signBlob` API.
    pub async fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(content).await
    }
}

async fn fetch_token(client: &Client, clock: &dyn Clock) -> Result<AccessToken> {
    let response = client.access_token().await?;
    Ok(response.into_access_token(clock.now()))
}

// Authorizes the `signBlob` calls. It keeps its own cache so signing does not
// depend on the caller wrapping the backend in a store.
#[derive(Debug)]
struct SignerTokenSource {
    client: Client,
    clock: Arc<dyn Clock>,
}

#[async_trait::async_trait]
impl RefreshSource<AccessToken> for SignerTokenSource {
    async fn refresh(&self) -> Result<(AccessToken, Duration)> {
        let token = fetch_token(&self.client, self.clock.as_ref()).await?;
        let ttl = token.ttl(self.clock.now());
        Ok((token, ttl))
    }
}

/// Creates [MetadataServer] credentials.
#[derive(Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    iam_endpoint: Option<String>,
    client: Option<reqwest::Client>,
    clock: Option<Arc<dyn Clock>>,
}

impl Builder {
    /// Sets the metadata server endpoint.
    ///
    /// Without this, `GCE_METADATA_HOST` is used if set, and
    /// `http://metadata.google.internal` otherwise.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the IAM credentials endpoint, defaults to
    /// `https://iamcredentials.googleapis.com`.
    pub fn with_iam_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.iam_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Reads the service account email and project, then returns the
    /// credentials.
    pub async fn build(self) -> Result<MetadataServer> {
        let http = self.client.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(clock::system);
        let client = Client::new(self.endpoint, http.clone());

        let client_email = client.email().await?;
        let project_id = client.project_id().await?;
        tracing::debug!(%client_email, %project_id, endpoint = %client.endpoint(), "metadata server credentials");

        let source = SignerTokenSource {
            client: client.clone(),
            clock: clock.clone(),
        };
        let token = SingleFlightRefresher::new(source, TOKEN_SAFETY_MARGIN, clock.clone());
        let signer = IamSigner::new(client_email.clone(), self.iam_endpoint, http, token);
        Ok(MetadataServer {
            client,
            identity: Identity {
                client_email,
                project_id,
            },
            signer,
            clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mds::{MDS_DEFAULT_URI, MDS_PROJECT_ID_URI};
    use base64::{Engine, prelude::BASE64_STANDARD};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;
    use time::OffsetDateTime;

    const EMAIL: &str = "sa@test-project.iam.gserviceaccount.com";

    fn expect_identity(server: &Server) {
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/email")))
                .respond_with(status_code(200).body(EMAIL)),
        );
        server.expect(
            Expectation::matching(request::path(MDS_PROJECT_ID_URI))
                .respond_with(status_code(200).body("test-project")),
        );
    }

    async fn build(server: &Server, now: OffsetDateTime) -> Result<MetadataServer> {
        MetadataServer::builder()
            .with_endpoint(format!("http://{}", server.addr()))
            .with_iam_endpoint(format!("http://{}", server.addr()))
            .with_clock(Arc::new(FakeClock::new(now)))
            .build()
            .await
    }

    #[tokio::test]
    async fn build_reads_identity() -> anyhow::Result<()> {
        let server = Server::run();
        expect_identity(&server);
        let creds = build(&server, OffsetDateTime::UNIX_EPOCH).await?;
        assert_eq!(creds.identity().client_email, EMAIL);
        assert_eq!(creds.identity().project_id, "test-project");
        Ok(())
    }

    #[tokio::test]
    async fn build_fails_without_server() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/email")))
                .respond_with(status_code(404)),
        );
        let err = build(&server, OffsetDateTime::UNIX_EPOCH).await.unwrap_err();
        assert!(err.is_remote_auth(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn fetch_token_every_call() -> anyhow::Result<()> {
        let server = Server::run();
        expect_identity(&server);
        server.expect(
            Expectation::matching(all_of![
                request::path(format!("{MDS_DEFAULT_URI}/token")),
                request::headers(contains(("metadata-flavor", "Google"))),
            ])
            .times(2)
            .respond_with(json_encoded(json!({
                "access_token": "mds-token",
                "expires_in": 3600,
                "token_type": "Bearer",
            }))),
        );

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)?;
        let creds = build(&server, now).await?;
        let token = creds.fetch_token().await?;
        assert_eq!(token.token, "mds-token");
        assert_eq!(token.expires_at, now + Duration::hours(1));
        let _ = creds.fetch_token().await?;
        Ok(())
    }

    #[tokio::test]
    async fn sign_with_cached_token() -> anyhow::Result<()> {
        let server = Server::run();
        expect_identity(&server);
        // Two signatures, one token.
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/token")))
                .times(1)
                .respond_with(json_encoded(json!({
                    "access_token": "mds-token",
                    "expires_in": 3600,
                }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path(
                    "POST",
                    "/v1/projects/-/serviceAccounts/sa@test-project.iam.gserviceaccount.com:signBlob"
                ),
                request::headers(contains(("authorization", "Bearer mds-token"))),
            ])
            .times(2)
            .respond_with(json_encoded(json!({
                "keyId": "key-1",
                "signedBlob": BASE64_STANDARD.encode("signature"),
            }))),
        );

        let creds = build(&server, OffsetDateTime::UNIX_EPOCH).await?;
        assert_eq!(creds.sign(b"a").await?, b"signature");
        assert_eq!(creds.sign(b"b").await?, b"signature");
        Ok(())
    }
}
