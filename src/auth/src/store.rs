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

//! A cached, shared access token for one [CredentialBackend].
//!
//! Downstream clients call [access_token][CredentialStore::access_token] once
//! per request. When the service rejects the token with an authorization
//! error they may call it once more with `force_refresh = true`, to replace a
//! token that was revoked before its nominal expiry.

use crate::Result;
use crate::clock::{self, Clock};
use crate::credentials::CredentialBackend;
use crate::errors::CredentialsError;
use crate::refresher::{RefreshSource, SingleFlightRefresher};
use crate::token::{AccessToken, TOKEN_SAFETY_MARGIN};
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::Arc;
use time::Duration;

/// Binds a [CredentialBackend] to a single-flight token cache.
///
/// Cloning the store is cheap, all the clones share the cached token.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    backend: Arc<CredentialBackend>,
    tokens: SingleFlightRefresher<AccessToken>,
}

#[derive(Debug)]
struct BackendSource {
    backend: Arc<CredentialBackend>,
    clock: Arc<dyn Clock>,
}

#[async_trait::async_trait]
impl RefreshSource<AccessToken> for BackendSource {
    async fn refresh(&self) -> Result<(AccessToken, Duration)> {
        let token = self.backend.fetch_token().await?;
        let ttl = token.ttl(self.clock.now());
        Ok((token, ttl))
    }
}

impl CredentialStore {
    /// Creates a store using the system clock.
    pub fn new(backend: CredentialBackend) -> Self {
        Self::with_clock(backend, clock::system())
    }

    /// Creates a store that uses `clock` to decide when the token expires.
    pub fn with_clock(backend: CredentialBackend, clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(backend);
        let source = BackendSource {
            backend: backend.clone(),
            clock: clock.clone(),
        };
        let tokens = SingleFlightRefresher::new(source, TOKEN_SAFETY_MARGIN, clock);
        Self { backend, tokens }
    }

    /// Returns a bearer token that is valid for at least five more minutes.
    pub async fn access_token(&self, force_refresh: bool) -> Result<String> {
        let token = self.tokens.get_value(force_refresh).await?;
        Ok(token.token)
    }

    /// The `Authorization` header for the current token.
    ///
    /// The header value is marked as sensitive.
    pub async fn headers(&self) -> Result<HeaderMap> {
        let token = self.access_token(false).await?;
        bearer_headers(&token)
    }

    /// The backend, for callers that need its identity or signing capability.
    pub fn backend(&self) -> &CredentialBackend {
        &self.backend
    }
}

pub(crate) fn bearer_headers(token: &str) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(CredentialsError::validation)?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::credentials::tests::authorized_user_json;
    use crate::credentials::{Builder, emulator::Emulator};
    use httptest::cycle;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;
    use time::OffsetDateTime;

    static_assertions::assert_impl_all!(CredentialStore: Clone, Send, Sync, std::fmt::Debug);

    async fn user_backend(server: &Server, clock: Arc<dyn Clock>) -> Result<CredentialBackend> {
        let mut json = authorized_user_json();
        json["token_uri"] = json!(server.url("/token").to_string());
        Builder::default()
            .with_json(json)
            .with_clock(clock)
            .build()
            .await
    }

    fn token_response(token: &str) -> impl Responder {
        json_encoded(json!({
            "access_token": token,
            "expires_in": 3600,
            "token_type": "Bearer",
        }))
    }

    #[tokio::test]
    async fn emulator_token() -> anyhow::Result<()> {
        let clock = Arc::new(FakeClock::default());
        let store = CredentialStore::with_clock(
            CredentialBackend::Emulator(Emulator::new(clock.clone())),
            clock,
        );
        assert_eq!(store.access_token(false).await?, "owner");
        assert_eq!(store.backend().kind(), "emulator");
        Ok(())
    }

    #[tokio::test]
    async fn cached_until_margin() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(2)
                .respond_with(token_response("test-token")),
        );

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)?;
        let clock = Arc::new(FakeClock::new(now));
        let backend = user_backend(&server, clock.clone()).await?;
        let store = CredentialStore::with_clock(backend, clock.clone());

        assert_eq!(store.access_token(false).await?, "test-token");
        // 3600s lifetime, 300s margin.
        clock.advance(Duration::seconds(3299));
        assert_eq!(store.access_token(false).await?, "test-token");
        clock.advance(Duration::seconds(1));
        assert_eq!(store.access_token(false).await?, "test-token");
        Ok(())
    }

    #[tokio::test]
    async fn force_refresh() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(2)
                .respond_with(cycle![token_response("token-1"), token_response("token-2")]),
        );

        let store = CredentialStore::new(user_backend(&server, clock::system()).await?);
        assert_eq!(store.access_token(false).await?, "token-1");
        assert_eq!(store.access_token(false).await?, "token-1");
        assert_eq!(store.access_token(true).await?, "token-2");
        assert_eq!(store.access_token(false).await?, "token-2");
        Ok(())
    }

    #[tokio::test]
    async fn failure_not_cached() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(2)
                .respond_with(cycle![
                    status_code(503).body("unavailable"),
                    token_response("test-token"),
                ]),
        );

        let store = CredentialStore::new(user_backend(&server, clock::system()).await?);
        let err = store.access_token(false).await.unwrap_err();
        assert!(err.is_remote_auth(), "{err:?}");
        assert_eq!(store.access_token(false).await?, "test-token");
        Ok(())
    }

    #[tokio::test]
    async fn headers() -> anyhow::Result<()> {
        let clock = Arc::new(FakeClock::default());
        let store = CredentialStore::with_clock(
            CredentialBackend::Emulator(Emulator::new(clock.clone())),
            clock,
        );
        let headers = store.headers().await?;
        let value = headers.get(AUTHORIZATION).expect("authorization header");
        assert_eq!(value, "Bearer owner");
        assert!(value.is_sensitive());
        Ok(())
    }

    #[test]
    fn bearer_headers_rejects_invalid() {
        let err = bearer_headers("bad\ntoken").unwrap_err();
        assert!(err.is_validation(), "{err:?}");
    }
}
