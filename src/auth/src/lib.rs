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

//! Credential and token lifecycle for Google Cloud and Firebase clients.
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases.
//!
//! The crate turns credential material into short-lived bearer tokens and
//! keeps them fresh:
//!
//! * [credentials::CredentialBackend] fetches tokens from a service account
//!   key, a user refresh token, the metadata server, or the Auth emulator.
//! * [store::CredentialStore] caches the current token. Concurrent callers
//!   share a single refresh.
//! * [idtoken] verifies Firebase ID tokens against the rotating public keys.
//! * [custom_token] mints custom sign-in tokens.
//!
//! ```no_run
//! # use gcloud_kit_auth::credentials::Builder;
//! # use gcloud_kit_auth::store::CredentialStore;
//! async fn sample() -> anyhow::Result<()> {
//!     let store = CredentialStore::new(Builder::default().build().await?);
//!     let token = store.access_token(false).await?;
//!     println!("Authorization: Bearer {token}");
//!     Ok(())
//! }
//! ```

pub mod authorized_client;
pub mod cache;
pub mod clock;
pub mod credentials;
pub mod custom_token;
pub mod errors;
pub mod idtoken;
pub mod refresher;
pub mod store;

/// Types and functions to work with auth [Tokens].
///
/// [Tokens]: https://cloud.google.com/docs/authentication#token
pub mod token;

pub(crate) mod http;
pub(crate) mod mds;
pub(crate) mod signer;

/// A `Result` alias where the `Err` case is
/// `gcloud_kit_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
