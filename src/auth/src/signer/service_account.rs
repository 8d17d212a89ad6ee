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
use rustls::crypto::CryptoProvider;
use rustls::sign::Signer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use std::sync::Arc;

// Signs with the RSA private key of a service account, without any network
// calls.
#[derive(Clone, Debug)]
pub(crate) struct LocalSigner {
    inner: Arc<dyn Signer>,
}

impl LocalSigner {
    /// Parses a PEM-encoded RSA key, in PKCS#8 or PKCS#1 form.
    pub(crate) fn from_pem(private_key: &str) -> Result<Self> {
        let key_provider = CryptoProvider::get_default().map_or_else(
            || rustls::crypto::aws_lc_rs::default_provider().key_provider,
            |p| p.key_provider,
        );

        let private_key = PrivateKeyDer::from_pem_slice(private_key.as_bytes()).map_err(|e| {
            CredentialsError::config(format!("cannot parse service account private key: {e}"))
        })?;
        if let PrivateKeyDer::Sec1(_) = private_key {
            return Err(CredentialsError::config(
                "expected an RSA key in PKCS#8 or PKCS#1 form, found an EC key",
            ));
        }
        let sk = key_provider
            .load_private_key(private_key)
            .map_err(CredentialsError::config)?;

        let inner = sk
            .choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| {
                CredentialsError::config(
                    "unable to choose RSA_PKCS1_SHA256 signing scheme as it is not supported by current signer",
                )
            })?;
        Ok(Self {
            inner: Arc::from(inner),
        })
    }

    /// Returns the RSASSA-PKCS1-v1_5 SHA-256 signature of `content`.
    pub(crate) fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .sign(content)
            .map_err(CredentialsError::validation)
    }
}
