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

//! Cloud Storage helpers for the gcloud kit.
//!
//! This crate creates [V4 signed URLs], which grant time-limited access to a
//! single object without further authentication. The URL is signed with the
//! credentials of a [CredentialBackend][auth::credentials::CredentialBackend]
//! that can sign, either locally with a service account key or through the IAM
//! `signBlob` API.
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases.
//!
//! [V4 signed URLs]: https://cloud.google.com/storage/docs/access-control/signed-urls

pub mod error;
pub mod signed_url;

pub use signed_url::{SignedUrlBuilder, UrlStyle};
