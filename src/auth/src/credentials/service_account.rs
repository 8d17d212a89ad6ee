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

//! [Service Account] credentials.
//!
//! A service account key contains an RSA private key. Treat it as any other
//! secret: do not store it where unauthorized persons or programs may read it.
//!
//! These credentials exchange a signed JWT assertion for an access token at
//! the OAuth 2.0 token endpoint. They also sign arbitrary bytes locally, which
//! is what signed URLs and custom tokens need.
//!
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-creds

use super::Identity;
use super::jws::{DEFAULT_TOKEN_TIMEOUT, JwsClaims, JwsHeader, compact};
use crate::Result;
use crate::clock::{self, Clock};
use crate::errors::CredentialsError;
use crate::http::{self, JWT_BEARER_GRANT_TYPE, OAUTH2_TOKEN_ENDPOINT};
use crate::signer::service_account::LocalSigner;
use crate::token::AccessToken;
use std::sync::Arc;

/// The scopes requested for every service account token.
pub(crate) const DEFAULT_SCOPES: [&str; 5] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/firebase.messaging",
    "https://www.googleapis.com/auth/identitytoolkit",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// A [service account key] in the JSON format produced by the IAM console.
///
/// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(serde::Deserialize, Default, Clone)]
pub struct ServiceAccountKey {
    /// The client email address of the service account.
    pub client_email: String,
    /// ID of the service account's private key, sent as the JWT `kid`.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// The PEM-encoded RSA private key, PKCS#8 or PKCS#1.
    pub private_key: String,
    /// The project id the service account belongs to.
    #[serde(default)]
    pub project_id: String,
    /// The OAuth 2.0 token endpoint, defaults to `https://oauth2.googleapis.com/token`.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Credentials backed by a service account key.
#[derive(Clone, Debug)]
pub struct ServiceAccount {
    identity: Identity,
    private_key_id: Option<String>,
    token_uri: String,
    signer: LocalSigner,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl ServiceAccount {
    /// Parses the key material. Fails with a configuration error if the
    /// private key cannot be loaded.
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        if key.client_email.is_empty() {
            return Err(CredentialsError::config(
                "service account key is missing `client_email`",
            ));
        }
        let signer = LocalSigner::from_pem(&key.private_key)?;
        Ok(Self {
            identity: Identity {
                client_email: key.client_email,
                project_id: key.project_id,
            },
            private_key_id: key.private_key_id.filter(|k| !k.is_empty()),
            token_uri: key
                .token_uri
                .unwrap_or_else(|| OAUTH2_TOKEN_ENDPOINT.to_string()),
            signer,
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

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Exchanges a freshly signed assertion for an access token.
    #[tracing::instrument(skip_all, fields(client_email = %self.identity.client_email))]
    pub async fn fetch_token(&self) -> Result<AccessToken> {
        let assertion = self.assertion()?;
        let form = [
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("assertion", assertion.as_str()),
        ];
        let response = http::exchange(
            &self.client,
            &self.token_uri,
            &form,
            "failed to exchange service account assertion",
        )
        .await?;
        Ok(response.into_access_token(self.clock.now()))
    }

    /// Signs `content` with the service account private key.
    pub fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(content)
    }

    /// Builds the signed JWT sent in the `jwt-bearer` grant.
    pub(crate) fn assertion(&self) -> Result<String> {
        let now = self.clock.now();
        let scope = DEFAULT_SCOPES.join(" ");
        let claims = JwsClaims {
            iss: &self.identity.client_email,
            scope: &scope,
            aud: &self.token_uri,
            exp: now + DEFAULT_TOKEN_TIMEOUT,
            iat: now,
        };
        let header = JwsHeader::rs256(self.private_key_id.as_deref());
        let signing_input = format!("{}.{}", header.encode()?, claims.encode()?);
        let signature = self.signer.sign(signing_input.as_bytes())?;
        Ok(compact(&signing_input, &signature))
    }
}
