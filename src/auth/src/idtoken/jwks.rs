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

//! The public keys used to verify ID tokens.
//!
//! The key server returns a JSON object mapping each key id to a PEM encoded
//! X.509 certificate. How long the keys remain valid is given by the
//! `max-age` directive of the `Cache-Control` response header. There is no
//! default: a response without it is an error.

use crate::Result;
use crate::clock::{self, Clock};
use crate::errors::{self, CredentialsError};
use crate::http::REQUEST_TIMEOUT;
use crate::refresher::{RefreshSource, SingleFlightRefresher};
use http::HeaderMap;
use http::header::CACHE_CONTROL;
use jsonwebtoken::DecodingKey;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;
use std::collections::HashMap;
use std::sync::Arc;
use time::Duration;

/// Where Firebase publishes the ID token signing certificates.
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// An immutable snapshot of the published keys, indexed by key id.
///
/// Each fetch produces a new snapshot that replaces the previous one as a
/// whole.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Arc<HashMap<String, DecodingKey>>,
}

impl KeySet {
    pub fn get(&self, key_id: &str) -> Option<&DecodingKey> {
        self.keys.get(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key ids in the set, in no particular order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Parses the key server response body.
    pub(crate) fn from_pems(pems: HashMap<String, String>) -> Result<Self> {
        if pems.is_empty() {
            return Err(CredentialsError::config("the key set is empty"));
        }
        let keys = pems
            .into_iter()
            .map(|(kid, pem)| {
                let key = decoding_key(&pem).map_err(|e| {
                    CredentialsError::config(format!("cannot parse public key `{kid}`: {e}"))
                })?;
                Ok((kid, key))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self {
            keys: Arc::new(keys),
        })
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids = self.key_ids().collect::<Vec<_>>();
        ids.sort_unstable();
        f.debug_struct("KeySet").field("key_ids", &ids).finish()
    }
}

// Accepts an X.509 certificate or an RSA public key.
fn decoding_key(pem: &str) -> std::result::Result<DecodingKey, crate::errors::BoxError> {
    if !pem.contains("CERTIFICATE") {
        return Ok(DecodingKey::from_rsa_pem(pem.as_bytes())?);
    }
    let der = CertificateDer::from_pem_slice(pem.as_bytes())?;
    let (_, certificate) = x509_parser::parse_x509_certificate(&der)?;
    let spki = certificate.public_key();
    let algorithm = spki.algorithm.algorithm.to_id_string();
    if algorithm != RSA_ENCRYPTION_OID {
        return Err(format!("expected an RSA key, found algorithm {algorithm}").into());
    }
    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}

/// Returns the `max-age` of a `Cache-Control` header.
pub(crate) fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|seconds| seconds.trim().parse::<u32>().ok())
        .map(|seconds| Duration::seconds(i64::from(seconds)))
}

#[derive(Debug)]
struct KeyFetcher {
    url: String,
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl RefreshSource<KeySet> for KeyFetcher {
    #[tracing::instrument(skip_all, fields(url = %self.url))]
    async fn refresh(&self) -> Result<(KeySet, Duration)> {
        let error_message = "failed to fetch ID token public keys";
        let response = self
            .client
            .get(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, error_message))?;
        let status = response.status();
        if !status.is_success() {
            return Err(errors::from_http_response(response, error_message).await);
        }

        let ttl = max_age(response.headers()).ok_or_else(|| {
            CredentialsError::remote_auth(
                status,
                None,
                format!("{error_message}: missing `max-age` in the `Cache-Control` header"),
            )
        })?;
        let pems = response
            .json::<HashMap<String, String>>()
            .await
            .map_err(|e| CredentialsError::remote_auth(status, None, format!("{error_message}: {e}")))?;
        let keys = KeySet::from_pems(pems)?;
        tracing::debug!(keys = keys.len(), ttl = %ttl, "fetched ID token public keys");
        Ok((keys, ttl))
    }
}

/// The current [KeySet], refreshed when the previous one expires.
///
/// Concurrent lookups share a single fetch. Cloning the source is cheap and
/// the clones share the cached keys.
#[derive(Clone, Debug)]
pub struct JwksSource {
    keys: SingleFlightRefresher<KeySet>,
}

impl Default for JwksSource {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl JwksSource {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns the cached keys, fetching them if none are cached or the cached
    /// ones have expired.
    pub async fn key_set(&self) -> Result<KeySet> {
        self.keys.get_value(false).await
    }
}

/// Creates a [JwksSource].
#[derive(Debug, Default)]
pub struct Builder {
    url: Option<String>,
    client: Option<reqwest::Client>,
    clock: Option<Arc<dyn Clock>>,
}

impl Builder {
    /// Fetch the keys from `url` instead of [DEFAULT_JWKS_URL].
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
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

    pub fn build(self) -> JwksSource {
        let fetcher = KeyFetcher {
            url: self.url.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()),
            client: self.client.unwrap_or_default(),
        };
        let clock = self.clock.unwrap_or_else(clock::system);
        JwksSource {
            // The server decides the lifetime, so no safety margin.
            keys: SingleFlightRefresher::new(fetcher, Duration::ZERO, clock),
        }
    }
}
