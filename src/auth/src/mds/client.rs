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

use crate::errors::{self, CredentialsError};
use crate::token::TokenResponse;
use reqwest::{Client as ReqwestClient, RequestBuilder};

/// A client for the instance metadata server.
#[derive(Clone, Debug)]
pub(crate) struct Client {
    endpoint: String,
    inner: ReqwestClient,
}

impl Client {
    /// Creates a new client for the metadata server.
    pub(crate) fn new(endpoint_override: Option<String>, inner: ReqwestClient) -> Self {
        let endpoint = Self::resolve_endpoint(endpoint_override);
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Self { endpoint, inner }
    }

    fn resolve_endpoint(endpoint_override: Option<String>) -> String {
        if let Some(e) = endpoint_override {
            // An explicit endpoint wins, tests depend on this.
            e
        } else if let Ok(host) = std::env::var(super::GCE_METADATA_HOST_ENV_VAR) {
            format!("http://{host}")
        } else {
            super::METADATA_ROOT.to_string()
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Creates a GET request to the metadata server with the correct headers.
    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        self.inner
            .get(url)
            .header(super::METADATA_FLAVOR, super::METADATA_FLAVOR_VALUE)
            .timeout(super::METADATA_REQUEST_TIMEOUT)
    }

    /// Fetches an access token for the default service account.
    pub(crate) async fn access_token(&self) -> crate::Result<TokenResponse> {
        let path = format!("{}/token", super::MDS_DEFAULT_URI);
        let error_message = "failed to fetch access token";
        let response = self.send(&path, error_message).await?;
        let status = response.status();
        response.json::<TokenResponse>().await.map_err(|e| {
            // Decoding errors are not transient. Typically they indicate a badly
            // configured endpoint, or DNS redirecting the request to a random
            // server.
            CredentialsError::remote_auth(status, None, format!("{error_message}: {e}"))
        })
    }

    /// Fetches the email of the default service account.
    pub(crate) async fn email(&self) -> crate::Result<String> {
        let path = format!("{}/email", super::MDS_DEFAULT_URI);
        self.text(&path, "failed to fetch email").await
    }

    /// Fetches the id of the project hosting the instance.
    pub(crate) async fn project_id(&self) -> crate::Result<String> {
        self.text(super::MDS_PROJECT_ID_URI, "failed to fetch project id")
            .await
    }

    async fn text(&self, path: &str, error_message: &str) -> crate::Result<String> {
        let response = self.send(path, error_message).await?;
        let text = response
            .text()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        Ok(text.trim().to_string())
    }

    async fn send(&self, path: &str, error_message: &str) -> crate::Result<reqwest::Response> {
        let response = self
            .get(path)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds::{GCE_METADATA_HOST_ENV_VAR, MDS_DEFAULT_URI, MDS_PROJECT_ID_URI, METADATA_ROOT};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serde_json::json;
    use serial_test::{parallel, serial};

    fn client(server: &Server) -> Client {
        Client::new(
            Some(format!("http://{}/", server.addr())),
            ReqwestClient::new(),
        )
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_success() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path(format!("{MDS_DEFAULT_URI}/token")),
                request::headers(contains(("metadata-flavor", "Google"))),
            ])
            .respond_with(json_encoded(json!({
                "access_token": "test-token",
                "expires_in": 3600,
                "token_type": "Bearer",
            }))),
        );

        let got = client(&server).access_token().await?;
        assert_eq!(got.access_token, "test-token");
        assert_eq!(got.expires_in, Some(3600));
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn access_token_not_found() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/token")))
                .respond_with(status_code(404)),
        );

        let err = client(&server).access_token().await.unwrap_err();
        assert!(err.is_remote_auth(), "{err:?}");
        assert_eq!(err.http_status(), Some(http::StatusCode::NOT_FOUND));
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn email_and_project() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::path(format!("{MDS_DEFAULT_URI}/email")),
                request::headers(contains(("metadata-flavor", "Google"))),
            ])
            .respond_with(status_code(200).body("sa@test-project.iam.gserviceaccount.com")),
        );
        server.expect(
            Expectation::matching(request::path(MDS_PROJECT_ID_URI))
                .respond_with(status_code(200).body("test-project\n")),
        );

        let client = client(&server);
        assert_eq!(
            client.email().await?,
            "sa@test-project.iam.gserviceaccount.com"
        );
        assert_eq!(client.project_id().await?, "test-project");
        Ok(())
    }

    #[test]
    #[serial]
    fn endpoint_resolution() {
        let _e = ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR);
        let client = Client::new(None, ReqwestClient::new());
        assert_eq!(client.endpoint(), METADATA_ROOT);

        let _e = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, "metadata.test:8080");
        let client = Client::new(None, ReqwestClient::new());
        assert_eq!(client.endpoint(), "http://metadata.test:8080");

        let client = Client::new(Some("http://override/".into()), ReqwestClient::new());
        assert_eq!(client.endpoint(), "http://override");
    }

    #[tokio::test(start_paused = true)]
    #[parallel]
    async fn request_timeout() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/email")))
                .times(..)
                .respond_with(delay_and_then(
                    std::time::Duration::from_secs(60),
                    status_code(200).body("sa@test-project.iam.gserviceaccount.com"),
                )),
        );

        let err = client(&server).email().await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        Ok(())
    }
}
