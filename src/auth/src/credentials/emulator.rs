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

//! Credentials for the local emulators.
//!
//! The emulators accept the literal token `owner` and do not check
//! signatures. These credentials never touch the network. They are **not**
//! usable for production cryptography: [sign][Emulator::sign] always fails.

use super::Identity;
use crate::Result;
use crate::clock::Clock;
use crate::errors::CredentialsError;
use crate::token::AccessToken;
use std::sync::Arc;
use time::Duration;

pub(crate) const EMULATOR_TOKEN: &str = "owner";
pub(crate) const EMULATOR_TOKEN_LIFETIME: Duration = Duration::days(365);
const EMULATOR_EMAIL: &str = "owner@example.com";
const EMULATOR_PROJECT_ID: &str = "testing-project-id";

/// Fixed, fake credentials. See the [module documentation](self).
#[derive(Clone, Debug)]
pub struct Emulator {
    identity: Identity,
    clock: Arc<dyn Clock>,
}

impl Emulator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            identity: Identity {
                client_email: EMULATOR_EMAIL.to_string(),
                project_id: EMULATOR_PROJECT_ID.to_string(),
            },
            clock,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub async fn fetch_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: EMULATOR_TOKEN.to_string(),
            expires_at: self.clock.now().saturating_add(EMULATOR_TOKEN_LIFETIME),
        })
    }

    /// Always fails, the emulator credentials have no key.
    pub fn sign(&self, _content: &[u8]) -> Result<Vec<u8>> {
        Err(CredentialsError::validation(
            "emulator credentials cannot sign, use a service account key",
        ))
    }
}
