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

//! Types and functions to work with OAuth 2.0 access tokens.

use time::{Duration, OffsetDateTime};

/// Lifetime assumed when a token endpoint omits `expires_in`.
pub(crate) const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(1);

/// Access tokens are refreshed this long before they expire.
pub(crate) const TOKEN_SAFETY_MARGIN: Duration = Duration::minutes(5);

/// Represents an OAuth 2.0 bearer token.
///
/// Tokens are immutable. They are never written to disk, and the token string
/// is censored in the `Debug` output.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    /// The actual token string.
    ///
    /// This is the value used in the `Authorization: Bearer` header.
    pub token: String,

    /// The time at which the token expires.
    pub expires_at: OffsetDateTime,
}

impl AccessToken {
    /// Remaining lifetime of the token at `now`, negative once expired.
    pub fn ttl(&self, now: OffsetDateTime) -> Duration {
        self.expires_at - now
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The response from an OAuth 2.0 token endpoint or the metadata server.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) token_type: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(self, now: OffsetDateTime) -> AccessToken {
        let lifetime = self
            .expires_in
            .map(|s| Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX)))
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        AccessToken {
            token: self.access_token,
            expires_at: now.saturating_add(lifetime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn debug() {
        let token = AccessToken {
            token: "token-test-only".into(),
            expires_at: OffsetDateTime::UNIX_EPOCH,
        };
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("token: \"[censored]\""), "{got}");
        assert!(got.contains("expires_at"), "{got}");
    }

    #[test]
    fn ttl() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
        let token = AccessToken {
            token: "t".into(),
            expires_at: now + Duration::seconds(90),
        };
        assert_eq!(token.ttl(now), Duration::seconds(90));
        assert_eq!(token.ttl(now + Duration::seconds(100)), Duration::seconds(-10));
    }

    #[test]
    fn from_response() -> anyhow::Result<()> {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
        let response = serde_json::from_value::<TokenResponse>(json!({
            "access_token": "test-access-token",
            "expires_in": 3599,
            "token_type": "Bearer",
        }))?;
        let token = response.into_access_token(now);
        assert_eq!(token.token, "test-access-token");
        assert_eq!(token.expires_at, now + Duration::seconds(3599));
        Ok(())
    }

    #[test]
    fn from_response_without_lifetime() -> anyhow::Result<()> {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
        let response = serde_json::from_value::<TokenResponse>(json!({
            "access_token": "test-access-token",
        }))?;
        let token = response.into_access_token(now);
        assert_eq!(token.expires_at, now + DEFAULT_TOKEN_LIFETIME);
        Ok(())
    }
}
