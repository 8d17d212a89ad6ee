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
use crate::errors::CredentialsError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// Lifetime of the assertions and custom tokens created by this crate.
pub(crate) const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::hours(1);

/// Claims of the JWT assertion exchanged for an access token.
#[derive(Serialize)]
pub(crate) struct JwsClaims<'a> {
    pub iss: &'a str,
    pub scope: &'a str,
    pub aud: &'a str,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
}

impl JwsClaims<'_> {
    pub fn encode(&self) -> Result<String> {
        if self.exp < self.iat {
            return Err(CredentialsError::validation(format!(
                "expiration time {:?}, must be later than issued time {:?}",
                self.exp, self.iat
            )));
        }
        encode_segment(self)
    }
}

/// The header that describes who, what, and how a token was created.
#[derive(Serialize)]
pub(crate) struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<&'a str>,
}

impl JwsHeader<'_> {
    pub fn rs256(kid: Option<&str>) -> JwsHeader<'_> {
        JwsHeader {
            alg: "RS256",
            typ: "JWT",
            kid,
        }
    }

    pub fn encode(&self) -> Result<String> {
        encode_segment(self)
    }
}

/// Encodes a JSON value as an unpadded base64url JWT segment.
pub(crate) fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(CredentialsError::validation)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Joins the signing input and the signature into a compact JWT.
pub(crate) fn compact(signing_input: &str, signature: &[u8]) -> String {
    format!(
        "{signing_input}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(signature)
    )
}
