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

//! Verify Firebase ID tokens.
//!
//! [IdTokenVerifier] checks the token signature against the current
//! [KeySet][super::jwks::KeySet], then validates the claims:
//!
//! * `iss` must be `https://securetoken.google.com/{project_id}`.
//! * `aud` must contain the project id.
//! * `sub` must be a non-empty string of at most 128 characters.
//! * `exp` must be in the future.
//! * `iat` and `auth_time` must not be more than 60 seconds in the future.

use super::jwks::JwksSource;
use crate::clock::{self, Clock};
use crate::credentials::CredentialBackend;
use crate::errors::CredentialsError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
pub use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const CLOCK_SKEW: Duration = Duration::seconds(60);
const MAX_UID_LENGTH: usize = 128;

/// The claims of a verified ID token.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    /// The user id.
    pub sub: String,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    /// When the user authenticated.
    #[serde(with = "time::serde::timestamp")]
    pub auth_time: OffsetDateTime,
    #[serde(default)]
    pub firebase: FirebaseInfo,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    /// Any other claims, including the custom claims set on the user.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl IdTokenClaims {
    /// The user id, same as `sub`.
    pub fn uid(&self) -> &str {
        &self.sub
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified == Some(true)
    }
}

/// The `firebase` claim.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FirebaseInfo {
    #[serde(default)]
    pub sign_in_provider: String,
    #[serde(default)]
    pub tenant: Option<String>,
    /// Sign-in provider to the user identifiers for that provider.
    #[serde(default)]
    pub identities: HashMap<String, Vec<String>>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Creates an [IdTokenVerifier].
#[derive(Debug, Default)]
pub struct Builder {
    project_id: Option<String>,
    jwks: Option<JwksSource>,
    clock: Option<Arc<dyn Clock>>,
}

impl Builder {
    /// The Firebase project that issued the tokens.
    pub fn with_project_id<S: Into<String>>(mut self, project_id: S) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Uses the project of `backend` if no project id is set explicitly.
    pub fn with_credentials(mut self, backend: &CredentialBackend) -> Self {
        if self.project_id.is_none() {
            self.project_id = backend
                .identity()
                .map(|i| i.project_id.clone())
                .filter(|p| !p.is_empty());
        }
        self
    }

    /// Use `jwks` for the public keys, e.g. to share them between verifiers.
    pub fn with_jwks_source(mut self, jwks: JwksSource) -> Self {
        self.jwks = Some(jwks);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fails with a configuration error if the project id is unknown.
    pub fn build(self) -> crate::Result<IdTokenVerifier> {
        let project_id = self.project_id.ok_or_else(|| {
            CredentialsError::config(
                "a project id is required to verify ID tokens, set one explicitly or use credentials with a project",
            )
        })?;
        let clock = self.clock.unwrap_or_else(clock::system);
        let jwks = self
            .jwks
            .unwrap_or_else(|| JwksSource::builder().with_clock(clock.clone()).build());
        Ok(IdTokenVerifier {
            issuer: format!("{ISSUER_PREFIX}{project_id}"),
            project_id,
            jwks,
            clock,
        })
    }
}

/// Verifies Firebase ID tokens. See the [module documentation](self).
#[derive(Clone, Debug)]
pub struct IdTokenVerifier {
    project_id: String,
    issuer: String,
    jwks: JwksSource,
    clock: Arc<dyn Clock>,
}

impl IdTokenVerifier {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Verifies the token signature and claims, returning the claims.
    ///
    /// The keys are fetched only if none are cached or the cached ones have
    /// expired. A key id that is not in the current set is an error, it does
    /// not trigger another fetch.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, Error> {
        let header = jsonwebtoken::decode_header(token).map_err(Error::decode)?;
        if header.alg != Algorithm::RS256 {
            return Err(Error::invalid_field(
                "alg",
                format!("expected RS256, found {:?}", header.alg),
            ));
        }
        let kid = header
            .kid
            .ok_or_else(|| Error::invalid_field("kid", "kid header is missing"))?;

        let keys = self.jwks.key_set().await.map_err(Error::load_keys)?;
        let key = keys.get(&kid).ok_or_else(|| Error::unknown_key(&kid))?;

        // Only the signature is checked here, the claims are checked below
        // against our clock.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let data = jsonwebtoken::decode::<IdTokenClaims>(token, key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => Error::invalid_field("signature", e),
                ErrorKind::Json(_) | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => Error::decode(e),
                _ => Error::invalid(e),
            }
        })?;

        let claims = data.claims;
        self.check_claims(&claims, self.clock.now())?;
        Ok(claims)
    }

    fn check_claims(&self, claims: &IdTokenClaims, now: OffsetDateTime) -> Result<(), Error> {
        if !claims.aud.iter().any(|a| a == &self.project_id) {
            return Err(Error::invalid_field(
                "aud",
                format!(
                    "expected `{}`, found {:?}",
                    self.project_id, claims.aud
                ),
            ));
        }
        if claims.iss != self.issuer {
            return Err(Error::invalid_field(
                "iss",
                format!("expected `{}`, found `{}`", self.issuer, claims.iss),
            ));
        }
        if claims.sub.is_empty() {
            return Err(Error::invalid_field("sub", "subject is empty"));
        }
        if claims.sub.chars().count() > MAX_UID_LENGTH {
            return Err(Error::invalid_field(
                "sub",
                format!("subject is longer than {MAX_UID_LENGTH} characters"),
            ));
        }
        if claims.exp <= now {
            return Err(Error::expired(claims.exp));
        }
        if claims.iat > now + CLOCK_SKEW {
            return Err(Error::invalid_field("iat", "token issued in the future"));
        }
        if claims.auth_time > now + CLOCK_SKEW {
            return Err(Error::invalid_field(
                "auth_time",
                "authentication time in the future",
            ));
        }
        Ok(())
    }

    /// Reports whether the token has expired, without verifying it.
    ///
    /// Use this to decide whether a cached token is worth sending. It is not
    /// a substitute for [verify][IdTokenVerifier::verify].
    pub fn is_expired(&self, token: &str) -> Result<bool, Error> {
        Ok(unverified_expiry(token)? <= self.clock.now())
    }
}

fn unverified_expiry(token: &str) -> Result<OffsetDateTime, Error> {
    #[derive(Deserialize)]
    struct Expiry {
        #[serde(with = "time::serde::timestamp")]
        exp: OffsetDateTime,
    }
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::decode("token is not a JWT"))?;
    let payload = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(Error::decode)?;
    let expiry = serde_json::from_slice::<Expiry>(&payload).map_err(Error::decode)?;
    Ok(expiry.exp)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [IdTokenVerifier] errors.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The token is not a well-formed JWT.
    pub fn is_decode(&self) -> bool {
        matches!(self.0, ErrorKind::Decode(_))
    }

    /// The token signature or one of its claims is invalid.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::Invalid(_) | ErrorKind::InvalidField(_, _)
        )
    }

    /// The claim that failed validation, if any.
    pub fn field(&self) -> Option<&str> {
        match &self.0 {
            ErrorKind::InvalidField(field, _) => Some(field),
            ErrorKind::Expired(_) => Some("exp"),
            _ => None,
        }
    }

    /// The token has expired.
    pub fn is_expired(&self) -> bool {
        matches!(self.0, ErrorKind::Expired(_))
    }

    /// The token was signed with a key that is not in the current key set.
    pub fn is_unknown_key(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownKey(_))
    }

    /// The public keys could not be fetched.
    pub fn is_load_keys(&self) -> bool {
        matches!(self.0, ErrorKind::LoadKeys(_))
    }

    /// The underlying error, if the keys could not be fetched.
    pub fn as_credentials_error(&self) -> Option<&CredentialsError> {
        match &self.0 {
            ErrorKind::LoadKeys(e) => Some(e),
            _ => None,
        }
    }

    fn decode<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Decode(source.into()))
    }

    fn invalid<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Invalid(source.into()))
    }

    fn invalid_field<S: Into<String>, T>(field: S, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::InvalidField(field.into(), source.into()))
    }

    fn expired(exp: OffsetDateTime) -> Error {
        Error(ErrorKind::Expired(exp))
    }

    fn unknown_key(kid: &str) -> Error {
        Error(ErrorKind::UnknownKey(kid.to_string()))
    }

    fn load_keys(source: CredentialsError) -> Error {
        Error(ErrorKind::LoadKeys(source))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot decode ID token: {0}")]
    Decode(#[source] BoxError),
    #[error("ID token is invalid: {0}")]
    Invalid(#[source] BoxError),
    #[error("ID token `{0}` field is invalid: {1}")]
    InvalidField(String, #[source] BoxError),
    #[error("ID token expired at {0}")]
    Expired(OffsetDateTime),
    #[error("ID token key id `{0}` is not in the current key set")]
    UnknownKey(String),
    #[error("failed to fetch ID token public keys: {0}")]
    LoadKeys(#[source] CredentialsError),
}
