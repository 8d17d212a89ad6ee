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
use crate::token::TokenResponse;
use std::time::Duration;

pub(crate) const OAUTH2_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub(crate) const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

/// Upper bound for each call to a token, key, or signing endpoint.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs a form-encoded grant to an OAuth 2.0 token endpoint.
pub(crate) async fn exchange(
    client: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
    error_message: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_uri)
        .form(form)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| errors::from_http_error(e, error_message))?;

    if !response.status().is_success() {
        return Err(errors::from_http_response(response, error_message).await);
    }

    response.json::<TokenResponse>().await.map_err(|e| {
        // A success status with a body we cannot parse is not transient.
        let status = http::StatusCode::OK;
        CredentialsError::remote_auth(status, None, format!("{error_message}: {e}"))
    })
}
