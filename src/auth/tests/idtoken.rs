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

#[cfg(test)]
mod tests {
    use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
    use gcloud_kit_auth::clock::{Clock, FakeClock};
    use gcloud_kit_auth::idtoken::jwks::JwksSource;
    use gcloud_kit_auth::idtoken::verifier::Builder;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use rsa::RsaPrivateKey;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::sha2::Sha256;
    use rsa::signature::{SignatureEncoding, Signer};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use time::{Duration, OffsetDateTime};

    const PRIVATE_KEY: &str = include_str!("../testdata/private_key.pem");
    const CERTIFICATE: &str = include_str!("../testdata/certificate.pem");

    fn sign(kid: &str, claims: &Value) -> anyhow::Result<String> {
        let header = json!({"alg": "RS256", "typ": "JWT", "kid": kid});
        let input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let key = SigningKey::<Sha256>::new(RsaPrivateKey::from_pkcs8_pem(PRIVATE_KEY)?);
        let signature = key.sign(input.as_bytes()).to_vec();
        Ok(format!("{input}.{}", BASE64_URL_SAFE_NO_PAD.encode(signature)))
    }

    fn claims(now: OffsetDateTime, project: &str) -> Value {
        let now = now.unix_timestamp();
        json!({
            "iss": format!("https://securetoken.google.com/{project}"),
            "aud": project,
            "sub": "alice",
            "iat": now,
            "auth_time": now,
            "exp": now + 60,
            "firebase": {"sign_in_provider": "custom", "tenant": "tenant-a"},
        })
    }

    #[tokio::test]
    async fn verify_with_rotating_keys() -> anyhow::Result<()> {
        let now = OffsetDateTime::from_unix_timestamp(1_750_000_000)?;
        let clock = Arc::new(FakeClock::new(now));

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/certs"))
                .times(2)
                .respond_with(
                    status_code(200)
                        .append_header("cache-control", "public, max-age=600, must-revalidate")
                        .append_header("content-type", "application/json")
                        .body(json!({"key-1": CERTIFICATE}).to_string()),
                ),
        );

        let jwks = JwksSource::builder()
            .with_url(server.url("/certs").to_string())
            .with_clock(clock.clone())
            .build();
        let verifier = Builder::default()
            .with_project_id("proj1")
            .with_jwks_source(jwks.clone())
            .with_clock(clock.clone())
            .build()?;

        let token = sign("key-1", &claims(now, "proj1"))?;
        let got = verifier.verify(&token).await?;
        assert_eq!(got.uid(), "alice");
        assert_eq!(got.firebase.tenant.as_deref(), Some("tenant-a"));
        assert!(!got.is_email_verified());

        let other = sign("key-1", &claims(now, "proj2"))?;
        let err = verifier.verify(&other).await.unwrap_err();
        assert_eq!(err.field(), Some("aud"), "{err:?}");

        // The keys expire after `max-age` and are fetched again.
        clock.advance(Duration::seconds(600));
        let token = sign("key-1", &claims(clock.now(), "proj1"))?;
        let _ = verifier.verify(&token).await?;
        assert_eq!(jwks.key_set().await?.len(), 1);
        Ok(())
    }
}
