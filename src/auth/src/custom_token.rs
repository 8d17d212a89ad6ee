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

//! Mint [custom tokens] for Firebase Authentication.
//!
//! A custom token lets a client sign in as the given user id. The token is a
//! JWT issued by the service account of the backend and signed through
//! [CredentialBackend::sign], so only backends that can sign may mint them.
//!
//! ```no_run
//! # use gcloud_kit_auth::credentials::Builder;
//! # use gcloud_kit_auth::custom_token::CustomTokenBuilder;
//! async fn sample() -> anyhow::Result<()> {
//!     let backend = Builder::default().build().await?;
//!     let token = CustomTokenBuilder::new("some-uid")
//!         .with_claim("premium", true)
//!         .sign(&backend)
//!         .await?;
//!     println!("{token}");
//!     Ok(())
//! }
//! ```
//!
//! [custom tokens]: https://firebase.google.com/docs/auth/admin/create-custom-tokens

use crate::Result;
use crate::clock::{self, Clock};
use crate::credentials::CredentialBackend;
use crate::credentials::jws::{DEFAULT_TOKEN_TIMEOUT, JwsHeader, compact, encode_segment};
use crate::errors::CredentialsError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;

/// The audience of every custom token.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

const MAX_UID_LENGTH: usize = 128;

// Claims set by Firebase, a custom token cannot override them.
const RESERVED_CLAIMS: [&str; 16] = [
    "acr",
    "amr",
    "at_hash",
    "aud",
    "auth_time",
    "azp",
    "cnf",
    "c_hash",
    "exp",
    "firebase",
    "iat",
    "iss",
    "jti",
    "nbf",
    "nonce",
    "sub",
];

#[derive(Serialize)]
struct CustomTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    #[serde(with = "time::serde::timestamp")]
    iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    exp: OffsetDateTime,
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    claims: &'a Map<String, Value>,
}

/// Creates a custom token for one user id.
#[derive(Clone, Debug)]
pub struct CustomTokenBuilder {
    uid: String,
    tenant_id: Option<String>,
    claims: Map<String, Value>,
    clock: Arc<dyn Clock>,
}

impl CustomTokenBuilder {
    pub fn new<S: Into<String>>(uid: S) -> Self {
        Self {
            uid: uid.into(),
            tenant_id: None,
            claims: Map::new(),
            clock: clock::system(),
        }
    }

    /// Signs the user into the given tenant.
    pub fn with_tenant_id<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Adds a developer claim, available to security rules as
    /// `auth.token.<name>`.
    pub fn with_claim<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Signs the token with `backend`.
    ///
    /// Fails with a validation error if the user id is empty or longer than
    /// 128 characters, if a developer claim uses a reserved name, or if the
    /// backend cannot sign.
    #[tracing::instrument(skip_all, fields(kind = backend.kind()))]
    pub async fn sign(&self, backend: &CredentialBackend) -> Result<String> {
        self.validate()?;
        let identity = backend.identity().ok_or_else(|| {
            CredentialsError::validation(format!(
                "{} credentials cannot sign custom tokens",
                backend.kind()
            ))
        })?;

        let iat = self.clock.now();
        let claims = CustomTokenClaims {
            iss: &identity.client_email,
            sub: &identity.client_email,
            aud: CUSTOM_TOKEN_AUDIENCE,
            iat,
            exp: iat + DEFAULT_TOKEN_TIMEOUT,
            uid: &self.uid,
            tenant_id: self.tenant_id.as_deref(),
            claims: &self.claims,
        };
        let signing_input = format!(
            "{}.{}",
            JwsHeader::rs256(None).encode()?,
            encode_segment(&claims)?
        );
        let signature = backend.sign(signing_input.as_bytes()).await?;
        tracing::debug!("minted custom token");
        Ok(compact(&signing_input, &signature))
    }

    fn validate(&self) -> Result<()> {
        let len = self.uid.chars().count();
        if len == 0 || len > MAX_UID_LENGTH {
            return Err(CredentialsError::validation(format!(
                "uid must be between 1 and {MAX_UID_LENGTH} characters, got {len}"
            )));
        }
        let reserved = self
            .claims
            .keys()
            .filter(|k| RESERVED_CLAIMS.contains(&k.as_str()))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !reserved.is_empty() {
            return Err(CredentialsError::validation(format!(
                "developer claims use reserved names: {}",
                reserved.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::credentials::Builder;
    use crate::credentials::emulator::Emulator;
    use crate::credentials::jws::tests::{SSJ_REGEX, b64_decode_to_json};
    use crate::credentials::tests::{authorized_user_json, service_account_json};
    use crate::signer::service_account::tests::verify_signature;
    use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
    use serde_json::json;
    use test_case::test_case;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    async fn service_account() -> Result<CredentialBackend> {
        Builder::default()
            .with_json(service_account_json())
            .build()
            .await
    }

    #[tokio::test]
    async fn claims() -> anyhow::Result<()> {
        let backend = service_account().await?;
        let token = CustomTokenBuilder::new("test-uid")
            .with_tenant_id("tenant-1")
            .with_claim("premium", true)
            .with_claim("level", 7)
            .with_clock(Arc::new(FakeClock::new(now())))
            .sign(&backend)
            .await?;

        let re = regex::Regex::new(SSJ_REGEX)?;
        let captures = re.captures(&token).expect("token has three segments");
        let header = b64_decode_to_json(&captures["header"]);
        assert_eq!(header, json!({"alg": "RS256", "typ": "JWT"}));

        let email = backend.identity().map(|i| i.client_email.clone()).unwrap();
        let claims = b64_decode_to_json(&captures["claims"]);
        assert_eq!(
            claims,
            json!({
                "iss": email,
                "sub": email,
                "aud": CUSTOM_TOKEN_AUDIENCE,
                "iat": 1_700_000_000,
                "exp": 1_700_003_600,
                "uid": "test-uid",
                "tenant_id": "tenant-1",
                "claims": {"premium": true, "level": 7},
            })
        );

        let (signing_input, _) = token.rsplit_once('.').unwrap();
        let signature = BASE64_URL_SAFE_NO_PAD.decode(&captures["sig"])?;
        verify_signature(signing_input.as_bytes(), &signature)?;
        Ok(())
    }

    #[tokio::test]
    async fn minimal_claims() -> anyhow::Result<()> {
        let backend = service_account().await?;
        let token = CustomTokenBuilder::new("test-uid").sign(&backend).await?;
        let claims = token.split('.').nth(1).map(b64_decode_to_json).unwrap();
        assert!(claims.get("tenant_id").is_none(), "{claims}");
        assert!(claims.get("claims").is_none(), "{claims}");
        Ok(())
    }

    #[test_case(""; "empty")]
    #[test_case(&"u".repeat(129); "too long")]
    #[tokio::test]
    async fn invalid_uid(uid: &str) -> anyhow::Result<()> {
        let backend = service_account().await?;
        let err = CustomTokenBuilder::new(uid)
            .sign(&backend)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn reserved_claims() -> anyhow::Result<()> {
        let backend = service_account().await?;
        let err = CustomTokenBuilder::new("test-uid")
            .with_claim("premium", true)
            .with_claim("sub", "someone-else")
            .sign(&backend)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err:?}");
        assert!(err.to_string().contains("sub"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn emulator_cannot_sign() -> anyhow::Result<()> {
        let backend = CredentialBackend::Emulator(Emulator::new(clock::system()));
        let err = CustomTokenBuilder::new("test-uid")
            .sign(&backend)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn user_credentials_cannot_sign() -> anyhow::Result<()> {
        let backend = Builder::default()
            .with_json(authorized_user_json())
            .build()
            .await?;
        let err = CustomTokenBuilder::new("test-uid")
            .sign(&backend)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err:?}");
        Ok(())
    }
}
