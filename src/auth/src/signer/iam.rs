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

use crate::Result;
use crate::errors::{self, CredentialsError};
use crate::http::REQUEST_TIMEOUT;
use crate::refresher::SingleFlightRefresher;
use crate::token::AccessToken;
use base64::{Engine, prelude::BASE64_STANDARD};
use http::StatusCode;
use reqwest::Client;

pub(crate) const IAM_CREDENTIALS_ENDPOINT: &str = "https://iamcredentials.googleapis.com";

// Signs using the IAM signBlob API, authorized with a token for the same
// service account.
#[derive(Clone, Debug)]
pub(crate) struct IamSigner {
    client_email: String,
    endpoint: String,
    client: Client,
    token: SingleFlightRefresher<AccessToken>,
}

#[derive(Debug, serde::Serialize)]
struct SignBlobRequest {
    payload: String,
}

#[derive(Debug, serde::Deserialize)]
struct SignBlobResponse {
    #[serde(rename = "signedBlob")]
    signed_blob: String,
}

impl IamSigner {
    pub(crate) fn new(
        client_email: String,
        endpoint: Option<String>,
        client: Client,
        token: SingleFlightRefresher<AccessToken>,
    ) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| IAM_CREDENTIALS_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client_email,
            endpoint,
            client,
            token,
        }
    }

    #[tracing::instrument(skip_all, fields(client_email = %self.client_email, len = content.len()))]
    pub(crate) async fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        let error_message = "failed to sign blob";
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:signBlob",
            self.endpoint, self.client_email
        );
        let body = SignBlobRequest {
            payload: BASE64_STANDARD.encode(content),
        };

        let mut response = self.send(&url, &body, false, error_message).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("signBlob unauthorized, retrying with a new token");
            response = self.send(&url, &body, true, error_message).await?;
        }
        if !response.status().is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }

        let status = response.status();
        let res = response
            .json::<SignBlobResponse>()
            .await
            .map_err(|e| CredentialsError::remote_auth(status, None, format!("{error_message}: {e}")))?;
        BASE64_STANDARD.decode(res.signed_blob).map_err(|e| {
            CredentialsError::remote_auth(status, None, format!("{error_message}: {e}"))
        })
    }

    async fn send(
        &self,
        url: &str,
        body: &SignBlobRequest,
        force_refresh: bool,
        error_message: &str,
    ) -> Result<reqwest::Response> {
        let token = self.token.get_value(force_refresh).await?;
        self.client
            .post(url)
            .bearer_auth(&token.token)
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))
    }
}
