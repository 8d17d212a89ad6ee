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

//! Create [V4 signed URLs] for Cloud Storage objects.
//!
//! ```no_run
//! # use gcloud_kit_storage::signed_url::{SignedUrlBuilder, http::Method};
//! # use auth::credentials::Builder;
//! async fn sample() -> anyhow::Result<()> {
//!     let backend = Builder::default().build().await?;
//!     let url = SignedUrlBuilder::new("my-bucket", "reports/2025.csv")
//!         .with_method(Method::GET)
//!         .with_expiration(time::Duration::minutes(15))
//!         .sign_with(&backend)
//!         .await?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```
//!
//! [V4 signed URLs]: https://cloud.google.com/storage/docs/access-control/signing-urls-manually

use crate::error::SigningError;
use auth::clock::{Clock, SystemClock};
use auth::credentials::CredentialBackend;
use auth::errors::CredentialsError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Re-export types from the `http` crate used in this module.
pub mod http {
    /// HTTP method for the signed URL.
    pub use http::Method;
}

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const ALGORITHM: &str = "GOOG4-RSA-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const CONTENT_SHA256: &str = "x-goog-content-sha256";
const MAX_EXPIRATION: Duration = Duration::days(7);

/// Everything but `A-Z a-z 0-9 - . _ ~`.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
/// Object names keep their `/` separators.
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");

/// Formatting style for signed URLs.
///
/// There are several equivalent formats for signed URLs, see the [resource path] docs for more information.
///
/// [resource path]: https://docs.cloud.google.com/storage/docs/authentication/canonical-requests#about-resource-path
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UrlStyle {
    /// Path style URL: `https://storage.googleapis.com/bucket/object`.
    ///
    /// This is the default style.
    #[default]
    PathStyle,

    /// Bucket bound hostname URL: `https://bucket-name/object`.
    ///
    /// This style is used when you have a CNAME alias for your bucket. Set the
    /// alias with [with_endpoint][SignedUrlBuilder::with_endpoint].
    BucketBoundHostname,

    /// Virtual hosted style URL: `https://bucket.storage.googleapis.com/object`.
    VirtualHostedStyle,
}

/// A builder for creating signed URLs.
#[derive(Clone, Debug)]
pub struct SignedUrlBuilder {
    bucket: String,
    object: String,
    method: http::Method,
    expiration: Duration,
    accessible_at: Option<OffsetDateTime>,
    url_style: UrlStyle,
    endpoint: String,
    headers: BTreeMap<String, Vec<String>>,
    query_parameters: Vec<(String, String)>,
    clock: Arc<dyn Clock>,
}

// The parts of the request that are signed.
struct Canonical {
    origin: String,
    resource_path: String,
    query: String,
    request: String,
    timestamp: String,
    credential_scope: String,
}

impl Canonical {
    fn string_to_sign(&self) -> String {
        let hash = hex::encode(Sha256::digest(self.request.as_bytes()));
        [
            ALGORITHM,
            self.timestamp.as_str(),
            self.credential_scope.as_str(),
            hash.as_str(),
        ]
        .join("\n")
    }
}

impl SignedUrlBuilder {
    pub fn new<B, O>(bucket: B, object: O) -> Self
    where
        B: Into<String>,
        O: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            method: http::Method::GET,
            expiration: MAX_EXPIRATION,
            accessible_at: None,
            url_style: UrlStyle::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers: BTreeMap::new(),
            query_parameters: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the HTTP method for the signed URL. Default is `GET`.
    pub fn with_method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    /// Sets how long the URL remains valid. Default is 7 days, the maximum.
    ///
    /// Values outside `[0s, 7 days]` fail when the URL is signed.
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Sets when the URL becomes usable. Default is the current time.
    pub fn with_accessible_at(mut self, accessible_at: OffsetDateTime) -> Self {
        self.accessible_at = Some(accessible_at);
        self
    }

    pub fn with_url_style(mut self, url_style: UrlStyle) -> Self {
        self.url_style = url_style;
        self
    }

    /// Sets the endpoint for the signed URL. Default is `https://storage.googleapis.com`.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Adds an extension header to the signed URL.
    ///
    /// These headers must be present, with the same values, in the request
    /// that uses the signed URL. Adding the same header twice signs both
    /// values.
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .entry(name.into().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Adds a query parameter to the signed URL.
    pub fn with_query_param<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query_parameters.push((name.into(), value.into()));
        self
    }

    /// The base64 MD5 digest the request content must match.
    pub fn with_content_md5<S: Into<String>>(self, md5: S) -> Self {
        self.replace_header("content-md5", md5.into())
    }

    /// The `content-type` the request must use.
    pub fn with_content_type<S: Into<String>>(self, content_type: S) -> Self {
        self.replace_header("content-type", content_type.into())
    }

    /// Sets the clock used when no [accessible_at][Self::with_accessible_at]
    /// is given.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn replace_header(mut self, name: &str, value: String) -> Self {
        self.headers.insert(name.to_string(), vec![value]);
        self
    }

    /// Returns the canonical request that would be signed for `client_email`.
    pub fn canonical_request(&self, client_email: &str) -> Result<String, SigningError> {
        self.validate()?;
        Ok(self.canonicalize(client_email)?.request)
    }

    /// Returns the string to sign for `client_email`.
    pub fn string_to_sign(&self, client_email: &str) -> Result<String, SigningError> {
        self.validate()?;
        Ok(self.canonicalize(client_email)?.string_to_sign())
    }

    /// Generates the signed URL, signing with `backend`.
    ///
    /// The parameters are validated first. The backend must be able to sign,
    /// see [CredentialBackend::can_sign].
    pub async fn sign_with(&self, backend: &CredentialBackend) -> Result<String, SigningError> {
        self.validate()?;
        let identity = backend.identity().ok_or_else(|| {
            SigningError::signing(CredentialsError::validation(format!(
                "{} credentials cannot sign",
                backend.kind()
            )))
        })?;
        let canonical = self.canonicalize(&identity.client_email)?;
        let signature = backend
            .sign(canonical.string_to_sign().as_bytes())
            .await
            .map_err(SigningError::signing)?;
        tracing::debug!(
            bucket = %self.bucket,
            method = %self.method,
            expiration = self.expiration.whole_seconds(),
            "signed URL"
        );
        Ok(format!(
            "{}{}?{}&X-Goog-Signature={}",
            canonical.origin,
            canonical.resource_path,
            canonical.query,
            hex::encode(signature)
        ))
    }

    fn validate(&self) -> Result<(), SigningError> {
        if self.expiration.is_negative() || self.expiration > MAX_EXPIRATION {
            return Err(SigningError::invalid_parameter(
                "expiration",
                format!(
                    "must be between 0 and {} seconds, got {}",
                    MAX_EXPIRATION.whole_seconds(),
                    self.expiration.whole_seconds()
                ),
            ));
        }
        if let Some(values) = self.headers.get(CONTENT_SHA256) {
            let valid = matches!(values.as_slice(), [v] if is_sha256_hex(v));
            if !valid {
                return Err(SigningError::invalid_parameter(
                    CONTENT_SHA256,
                    "must be a single hex-encoded SHA-256 digest",
                ));
            }
        }
        Ok(())
    }

    fn canonicalize(&self, client_email: &str) -> Result<Canonical, SigningError> {
        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| SigningError::invalid_parameter("endpoint", e))?;
        let endpoint_host = endpoint
            .host_str()
            .ok_or_else(|| SigningError::invalid_parameter("endpoint", "missing host"))?;
        let endpoint_host = match endpoint.port() {
            Some(port) => format!("{endpoint_host}:{port}"),
            None => endpoint_host.to_string(),
        };

        let bucket = self.bucket.trim_start_matches("projects/_/buckets/");
        let object = self.object.strip_prefix('/').unwrap_or(&self.object);
        let object = utf8_percent_encode(object, PATH_ENCODE_SET);
        let (host, resource_path) = match self.url_style {
            UrlStyle::PathStyle => (endpoint_host, format!("/{bucket}/{object}")),
            UrlStyle::VirtualHostedStyle => (format!("{bucket}.{endpoint_host}"), format!("/{object}")),
            UrlStyle::BucketBoundHostname => (endpoint_host, format!("/{object}")),
        };

        let accessible_at = self
            .accessible_at
            .unwrap_or_else(|| self.clock.now())
            .to_offset(UtcOffset::UTC);
        let timestamp = accessible_at
            .format(TIMESTAMP_FORMAT)
            .map_err(|e| SigningError::invalid_parameter("accessible_at", e))?;
        let datestamp = accessible_at
            .format(DATE_FORMAT)
            .map_err(|e| SigningError::invalid_parameter("accessible_at", e))?;
        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");

        let mut headers = self.headers.clone();
        headers.insert("host".to_string(), vec![host.clone()]);
        let canonical_headers = headers
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|v| collapse_whitespace(v.trim()))
                    .collect::<Vec<_>>();
                format!("{name}:{}\n", values.join(","))
            })
            .collect::<String>();
        let signed_headers = headers
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";");
        let payload_hash = self
            .headers
            .get(CONTENT_SHA256)
            .and_then(|v| v.first())
            .map(String::as_str)
            .unwrap_or(UNSIGNED_PAYLOAD);

        let expiration = self.expiration.whole_seconds().to_string();
        let credential = format!("{client_email}/{credential_scope}");
        let mut query = [
            ("X-Goog-Algorithm", ALGORITHM),
            ("X-Goog-Credential", credential.as_str()),
            ("X-Goog-Date", timestamp.as_str()),
            ("X-Goog-Expires", expiration.as_str()),
            ("X-Goog-SignedHeaders", signed_headers.as_str()),
        ]
        .into_iter()
        .chain(
            self.query_parameters
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
        .map(|(k, v)| (encode_query(k), encode_query(v)))
        .collect::<Vec<_>>();
        query.sort();
        let query = query
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let request = [
            self.method.as_str(),
            resource_path.as_str(),
            query.as_str(),
            canonical_headers.as_str(),
            signed_headers.as_str(),
            payload_hash,
        ]
        .join("\n");

        Ok(Canonical {
            origin: format!("{}://{host}", endpoint.scheme()),
            resource_path,
            query,
            request,
            timestamp,
            credential_scope,
        })
    }
}

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

fn is_sha256_hex(value: &str) -> bool {
    hex::decode(value).is_ok_and(|digest| digest.len() == 32)
}

/// Replaces each run of two or more whitespace characters with one space.
fn collapse_whitespace(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.next_if(|n| n.is_whitespace()).is_some() {}
            collapsed.push(' ');
        } else {
            collapsed.push(c);
        }
    }
    collapsed
}
