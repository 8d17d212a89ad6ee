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

//! The sources of access tokens, and the application default lookup that
//! chooses one of them.
//!
//! A [CredentialBackend] knows how to fetch a fresh token. It does not cache
//! anything, wrap it in a [CredentialStore][crate::store::CredentialStore] to
//! share one cached token between many callers.
//!
//! ```no_run
//! # use gcloud_kit_auth::credentials::Builder;
//! # async fn sample() -> Result<(), gcloud_kit_auth::errors::CredentialsError> {
//! let backend = Builder::default().build().await?;
//! println!("using {} credentials", backend.kind());
//! # Ok(()) }
//! ```

pub mod emulator;
pub(crate) mod jws;
pub mod mds;
pub mod service_account;
pub mod user_account;

use crate::Result;
use crate::clock::{self, Clock};
use crate::errors::CredentialsError;
use crate::token::AccessToken;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub(crate) const FIREBASE_AUTH_EMULATOR_HOST: &str = "FIREBASE_AUTH_EMULATOR_HOST";
const WINDOWS_APPDATA: &str = "APPDATA";
const UNIX_HOME: &str = "HOME";
const USER_CREDENTIAL_FILE: &str = "application_default_credentials.json";

/// The service account behind a backend.
///
/// Only the backends with a service account identity carry one. It provides
/// the default project for ID token verification and the signer email for
/// signed URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// The service account email, e.g.
    /// `my-sa@my-project.iam.gserviceaccount.com`.
    pub client_email: String,
    /// The project hosting the service account.
    pub project_id: String,
}

/// A source of access tokens, possibly able to sign bytes.
///
/// Each variant has a different set of capabilities. Use [can_sign] before
/// relying on [sign], the backends without a private key (or a remote signer)
/// return a validation error.
///
/// [can_sign]: CredentialBackend::can_sign
/// [sign]: CredentialBackend::sign
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum CredentialBackend {
    /// A service account key, signs locally.
    ServiceAccount(service_account::ServiceAccount),
    /// An OAuth 2.0 refresh token, typically from `gcloud auth application-default login`.
    RefreshToken(user_account::RefreshToken),
    /// The default service account of a Google Cloud instance.
    MetadataServer(mds::MetadataServer),
    /// Fixed credentials for the local emulators.
    Emulator(emulator::Emulator),
}

impl CredentialBackend {
    /// Fetches a new access token.
    ///
    /// Every call goes to the backing service, there is no caching at this
    /// level.
    pub async fn fetch_token(&self) -> Result<AccessToken> {
        match self {
            Self::ServiceAccount(c) => c.fetch_token().await,
            Self::RefreshToken(c) => c.fetch_token().await,
            Self::MetadataServer(c) => c.fetch_token().await,
            Self::Emulator(c) => c.fetch_token().await,
        }
    }

    /// Signs `content` with RSASSA-PKCS1-v1_5 and SHA-256.
    ///
    /// Returns a validation error if the backend cannot sign.
    pub async fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::ServiceAccount(c) => c.sign(content),
            Self::MetadataServer(c) => c.sign(content).await,
            Self::Emulator(c) => c.sign(content),
            Self::RefreshToken(_) => Err(CredentialsError::validation(format!(
                "{} credentials cannot sign, use a service account",
                self.kind()
            ))),
        }
    }

    /// Returns true if [sign][CredentialBackend::sign] can succeed.
    pub fn can_sign(&self) -> bool {
        matches!(self, Self::ServiceAccount(_) | Self::MetadataServer(_))
    }

    /// The service account identity, if the backend has one.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::ServiceAccount(c) => Some(c.identity()),
            Self::MetadataServer(c) => Some(c.identity()),
            Self::Emulator(c) => Some(c.identity()),
            Self::RefreshToken(_) => None,
        }
    }

    /// A short name for the backend, used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "service_account",
            Self::RefreshToken(_) => "authorized_user",
            Self::MetadataServer(_) => "metadata_server",
            Self::Emulator(_) => "emulator",
        }
    }
}

/// Finds the credentials for the application.
///
/// Explicit inputs win. Without them the lookup order is:
///
/// 1. `FIREBASE_AUTH_EMULATOR_HOST` is set: [Emulator][emulator::Emulator].
/// 2. `GOOGLE_APPLICATION_CREDENTIALS` names a JSON file: load it. A missing
///    file is an error, the lookup does not continue.
/// 3. The gcloud well-known file exists: load it.
/// 4. The [metadata server][mds::MetadataServer].
#[derive(Debug, Default)]
pub struct Builder {
    json: Option<Value>,
    path: Option<PathBuf>,
    metadata_endpoint: Option<String>,
    iam_endpoint: Option<String>,
    client: Option<reqwest::Client>,
    clock: Option<Arc<dyn Clock>>,
}

impl Builder {
    /// Uses the given credentials JSON, skipping the environment lookup.
    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    /// Loads the credentials from a file, skipping the environment lookup.
    pub fn with_credentials_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the metadata server endpoint, e.g. `http://127.0.0.1:8080`.
    pub fn with_metadata_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// Overrides the IAM credentials endpoint used by the metadata server
    /// backend to sign.
    pub fn with_iam_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.iam_endpoint = Some(endpoint.into());
        self
    }

    /// Uses `client` for all the requests made by the backend.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Uses `clock` for token lifetimes and assertion timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Resolves the backend.
    pub async fn build(self) -> Result<CredentialBackend> {
        let client = self.client.clone().unwrap_or_default();
        let clock = self.clock.clone().unwrap_or_else(clock::system);

        if let Some(json) = self.json {
            tracing::debug!("using explicit credentials JSON");
            return from_json(json, client, clock);
        }
        if let Some(path) = &self.path {
            tracing::debug!(path = %path.display(), "using explicit credentials file");
            let json = load_file(path).await?;
            return from_json(json, client, clock);
        }

        // 1: Emulator override.
        if let Ok(host) = std::env::var(FIREBASE_AUTH_EMULATOR_HOST) {
            if !host.is_empty() {
                tracing::debug!(%host, "{FIREBASE_AUTH_EMULATOR_HOST} is set, using emulator credentials");
                return Ok(CredentialBackend::Emulator(emulator::Emulator::new(clock)));
            }
        }
        // 2: Known environment variable.
        if let Ok(path) = std::env::var(GOOGLE_APPLICATION_CREDENTIALS) {
            tracing::debug!(%path, "loading credentials from {GOOGLE_APPLICATION_CREDENTIALS}");
            let json = load_file(Path::new(&path)).await?;
            return from_json(json, client, clock);
        }
        // 3: Well-known file.
        if let Some(path) = well_known_file() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(path = %path.display(), "loading credentials from the well-known file");
                let json = load_file(&path).await?;
                return from_json(json, client, clock);
            }
        }
        // 4: The metadata server.
        tracing::debug!("no credentials file found, using the metadata server");
        let mut builder = mds::Builder::default()
            .with_http_client(client)
            .with_clock(clock);
        if let Some(endpoint) = self.metadata_endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(endpoint) = self.iam_endpoint {
            builder = builder.with_iam_endpoint(endpoint);
        }
        Ok(CredentialBackend::MetadataServer(builder.build().await?))
    }
}

async fn load_file(path: &Path) -> Result<Value> {
    let contents = tokio::fs::read(path).await.map_err(|e| {
        CredentialsError::config(format!(
            "cannot read credentials file {}: {e}",
            path.display()
        ))
    })?;
    serde_json::from_slice(&contents).map_err(|e| {
        CredentialsError::config(format!(
            "credentials file {} is not valid JSON: {e}",
            path.display()
        ))
    })
}

/// Creates a backend from a credentials JSON object, dispatching on its
/// `type` field.
fn from_json(json: Value, client: reqwest::Client, clock: Arc<dyn Clock>) -> Result<CredentialBackend> {
    let cred_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CredentialsError::config("missing `type` field in credentials JSON"))?;
    match cred_type {
        "service_account" => {
            let key = serde_json::from_value::<service_account::ServiceAccountKey>(json)
                .map_err(CredentialsError::config)?;
            let backend = service_account::ServiceAccount::new(key)?
                .with_http_client(client)
                .with_clock(clock);
            Ok(CredentialBackend::ServiceAccount(backend))
        }
        "authorized_user" => {
            let user = serde_json::from_value::<user_account::AuthorizedUser>(json)
                .map_err(CredentialsError::config)?;
            let backend = user_account::RefreshToken::new(user)?
                .with_http_client(client)
                .with_clock(clock);
            Ok(CredentialBackend::RefreshToken(backend))
        }
        other => Err(CredentialsError::config(format!(
            "unsupported credential type found: {other}"
        ))),
    }
}

/// Returns the path to the gcloud application default credentials.
fn well_known_file() -> Option<PathBuf> {
    let mut path = PathBuf::new();
    if cfg!(windows) {
        path.push(std::env::var(WINDOWS_APPDATA).ok()?);
    } else {
        path.push(std::env::var(UNIX_HOME).ok()?);
        path.push(".config");
    }
    path.push("gcloud");
    path.push(USER_CREDENTIAL_FILE);
    Some(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mds::{GCE_METADATA_HOST_ENV_VAR, MDS_DEFAULT_URI, MDS_PROJECT_ID_URI};
    use crate::signer::service_account::tests::PKCS8_PRIVATE_KEY;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serde_json::json;
    use serial_test::{parallel, serial};
    use std::io::Write;

    pub(crate) fn service_account_json() -> Value {
        json!({
            "type": "service_account",
            "project_id": "my-project",
            "private_key_id": "918e6ef6548bc8fbe09be284b5196f3343df8611",
            "private_key": PKCS8_PRIVATE_KEY,
            "client_email": "my-app-local@my-project.iam.gserviceaccount.com",
            "client_id": "123456789",
        })
    }

    pub(crate) fn authorized_user_json() -> Value {
        json!({
            "type": "authorized_user",
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "refresh_token": "test-refresh-token",
        })
    }

    fn write_file(dir: &Path, name: &str, json: &Value) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(json.to_string().as_bytes()).unwrap();
        path
    }

    fn clear_env() -> Vec<ScopedEnv<&'static str>> {
        vec![
            ScopedEnv::remove(FIREBASE_AUTH_EMULATOR_HOST),
            ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS),
            ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR),
        ]
    }

    #[tokio::test]
    #[parallel]
    async fn from_json_service_account() -> anyhow::Result<()> {
        let backend = Builder::default()
            .with_json(service_account_json())
            .build()
            .await?;
        assert!(matches!(backend, CredentialBackend::ServiceAccount(_)), "{backend:?}");
        assert!(backend.can_sign());
        assert_eq!(backend.kind(), "service_account");
        assert_eq!(
            backend.identity(),
            Some(&Identity {
                client_email: "my-app-local@my-project.iam.gserviceaccount.com".into(),
                project_id: "my-project".into(),
            })
        );
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn from_json_authorized_user() -> anyhow::Result<()> {
        let backend = Builder::default()
            .with_json(authorized_user_json())
            .build()
            .await?;
        assert!(matches!(backend, CredentialBackend::RefreshToken(_)), "{backend:?}");
        assert!(!backend.can_sign());
        assert!(backend.identity().is_none());
        let err = backend.sign(b"content").await.unwrap_err();
        assert!(err.is_validation(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn from_json_unknown_type() {
        let err = Builder::default()
            .with_json(json!({"type": "external_account"}))
            .build()
            .await
            .unwrap_err();
        assert!(err.is_config(), "{err:?}");
        assert!(err.to_string().contains("external_account"), "{err}");
    }

    #[tokio::test]
    #[parallel]
    async fn from_json_missing_type() {
        let err = Builder::default()
            .with_json(json!({"client_email": "a@b.c"}))
            .build()
            .await
            .unwrap_err();
        assert!(err.is_config(), "{err:?}");
    }

    #[tokio::test]
    #[parallel]
    async fn from_json_malformed_key() {
        let mut json = service_account_json();
        json["private_key"] = json!("not a pem");
        let err = Builder::default().with_json(json).build().await.unwrap_err();
        assert!(err.is_config(), "{err:?}");
    }

    #[tokio::test]
    #[parallel]
    async fn explicit_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "key.json", &service_account_json());
        let backend = Builder::default()
            .with_credentials_file(path)
            .build()
            .await?;
        assert_eq!(backend.kind(), "service_account");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn explicit_input_wins_over_environment() -> anyhow::Result<()> {
        let _env = clear_env();
        let _e = ScopedEnv::set(FIREBASE_AUTH_EMULATOR_HOST, "localhost:9099");
        let backend = Builder::default()
            .with_json(authorized_user_json())
            .build()
            .await?;
        assert_eq!(backend.kind(), "authorized_user");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn emulator_override() -> anyhow::Result<()> {
        let _env = clear_env();
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "key.json", &service_account_json());
        let _e1 = ScopedEnv::set(FIREBASE_AUTH_EMULATOR_HOST, "localhost:9099");
        let _e2 = ScopedEnv::set(std::ffi::OsStr::new(GOOGLE_APPLICATION_CREDENTIALS), path.as_os_str());
        let backend = Builder::default().build().await?;
        assert_eq!(backend.kind(), "emulator");
        assert!(!backend.can_sign());
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn env_var_file() -> anyhow::Result<()> {
        let _env = clear_env();
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "user.json", &authorized_user_json());
        let _e = ScopedEnv::set(std::ffi::OsStr::new(GOOGLE_APPLICATION_CREDENTIALS), path.as_os_str());
        let backend = Builder::default().build().await?;
        assert_eq!(backend.kind(), "authorized_user");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn env_var_missing_file() -> anyhow::Result<()> {
        let _env = clear_env();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("does-not-exist.json");
        let _e = ScopedEnv::set(std::ffi::OsStr::new(GOOGLE_APPLICATION_CREDENTIALS), path.as_os_str());
        let err = Builder::default().build().await.unwrap_err();
        assert!(err.is_config(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn env_var_bad_json() -> anyhow::Result<()> {
        let _env = clear_env();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json")?;
        let _e = ScopedEnv::set(std::ffi::OsStr::new(GOOGLE_APPLICATION_CREDENTIALS), path.as_os_str());
        let err = Builder::default().build().await.unwrap_err();
        assert!(err.is_config(), "{err:?}");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn well_known_file_used() -> anyhow::Result<()> {
        let _env = clear_env();
        let home = tempfile::tempdir()?;
        let gcloud = home.path().join(".config").join("gcloud");
        std::fs::create_dir_all(&gcloud)?;
        write_file(&gcloud, USER_CREDENTIAL_FILE, &authorized_user_json());
        let _e = ScopedEnv::set(std::ffi::OsStr::new(UNIX_HOME), home.path().as_os_str());
        let backend = Builder::default().build().await?;
        assert_eq!(backend.kind(), "authorized_user");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn metadata_server_fallback() -> anyhow::Result<()> {
        let _env = clear_env();
        let home = tempfile::tempdir()?;
        let _e = ScopedEnv::set(std::ffi::OsStr::new(UNIX_HOME), home.path().as_os_str());

        let server = Server::run();
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/email")))
                .respond_with(status_code(200).body("sa@test-project.iam.gserviceaccount.com")),
        );
        server.expect(
            Expectation::matching(request::path(MDS_PROJECT_ID_URI))
                .respond_with(status_code(200).body("test-project")),
        );

        let backend = Builder::default()
            .with_metadata_endpoint(format!("http://{}", server.addr()))
            .with_clock(Arc::new(FakeClock::default()))
            .build()
            .await?;
        assert_eq!(backend.kind(), "metadata_server");
        assert!(backend.can_sign());
        assert_eq!(
            backend.identity().map(|i| i.project_id.as_str()),
            Some("test-project")
        );
        Ok(())
    }
}
