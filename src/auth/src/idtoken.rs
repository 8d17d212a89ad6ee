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

//! Verify [Firebase ID tokens].
//!
//! ID tokens are signed with keys that rotate every few hours. [jwks::JwksSource]
//! keeps the current public keys, refreshing them as often as the key server
//! asks via its `Cache-Control` header. [verifier::IdTokenVerifier] checks the
//! signature and the claims.
//!
//! ```no_run
//! # use gcloud_kit_auth::idtoken::verifier::Builder;
//! async fn verify(token: &str) -> anyhow::Result<()> {
//!     let verifier = Builder::default().with_project_id("my-project").build()?;
//!     let claims = verifier.verify(token).await?;
//!     println!("Hello: {}", claims.uid());
//!     Ok(())
//! }
//! ```
//!
//! [Firebase ID tokens]: https://firebase.google.com/docs/auth/admin/verify-id-tokens

pub mod jwks;
pub mod verifier;
