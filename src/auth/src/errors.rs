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

//! Errors returned while loading credentials or producing tokens.

use http::StatusCode;
use std::sync::Arc;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents an error creating or using a
/// [CredentialBackend](crate::credentials::CredentialBackend).
///
/// The error is cheap to clone. A single failed refresh is handed, unmodified,
/// to every caller waiting on that refresh.
///
/// Use the `is_*` predicates to classify the failure:
///
/// * [is_config][CredentialsError::is_config]: the credential material is
///   missing or malformed. Retrying will not help.
/// * [is_transport][CredentialsError::is_transport]: the request never got a
///   response. Future attempts may succeed.
/// * [is_remote_auth][CredentialsError::is_remote_auth]: a token, key, or
///   signing endpoint answered with an error status.
/// * [is_validation][CredentialsError::is_validation]: the input was rejected
///   locally, including credentials that cannot sign.
#[derive(Clone, Debug, thiserror::Error)]
#[error(transparent)]
pub struct CredentialsError(Arc<ErrorKind>);

impl CredentialsError {
    /// Creates an error for missing or malformed credential material.
    pub fn config<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Config(source.into()))
    }

    /// Creates an error for a request that did not produce a response.
    pub fn transport<C: Into<String>, T: Into<BoxError>>(context: C, source: T) -> Self {
        Self::new(ErrorKind::Transport {
            context: context.into(),
            source: source.into(),
        })
    }

    /// Creates an error for a non-success response from an authorization
    /// endpoint.
    pub fn remote_auth<M: Into<String>>(
        status: StatusCode,
        code: Option<String>,
        message: M,
    ) -> Self {
        Self::new(ErrorKind::RemoteAuth {
            status,
            code,
            message: message.into(),
        })
    }

    /// Creates an error for inputs rejected before any network or crypto work.
    pub fn validation<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Validation(source.into()))
    }

    fn new(kind: ErrorKind) -> Self {
        Self(Arc::new(kind))
    }

    /// The credential material is missing or malformed.
    pub fn is_config(&self) -> bool {
        matches!(*self.0, ErrorKind::Config(_))
    }

    /// The request failed before a response was received.
    pub fn is_transport(&self) -> bool {
        matches!(*self.0, ErrorKind::Transport { .. })
    }

    /// The remote service rejected the request.
    pub fn is_remote_auth(&self) -> bool {
        matches!(*self.0, ErrorKind::RemoteAuth { .. })
    }

    /// The input was rejected locally.
    pub fn is_validation(&self) -> bool {
        matches!(*self.0, ErrorKind::Validation(_))
    }

    /// Returns `true` if a future attempt may succeed.
    ///
    /// This crate never retries on its own. The classification is offered to
    /// callers that run their own retry loops.
    pub fn is_retryable(&self) -> bool {
        match &*self.0 {
            ErrorKind::Transport { .. } => true,
            ErrorKind::RemoteAuth { status, .. } => is_retryable(*status),
            ErrorKind::Config(_) | ErrorKind::Validation(_) => false,
        }
    }

    /// The HTTP status returned by the remote service, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match &*self.0 {
            ErrorKind::RemoteAuth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The provider error code, such as `invalid_grant` or `PERMISSION_DENIED`.
    pub fn provider_code(&self) -> Option<&str> {
        match &*self.0 {
            ErrorKind::RemoteAuth { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("invalid credential configuration: {0}")]
    Config(#[source] BoxError),
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("{message} (status: {status}{})", fmt_code(.code))]
    RemoteAuth {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
    #[error("validation failed: {0}")]
    Validation(#[source] BoxError),
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_ref()
        .map(|c| format!(", code: {c}"))
        .unwrap_or_default()
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

/// Maps a `reqwest` send failure into a transport error.
pub(crate) fn from_http_error(err: reqwest::Error, context: &str) -> CredentialsError {
    CredentialsError::transport(context, err)
}

/// Maps a non-success HTTP response into a remote auth error.
///
/// Both the OAuth 2.0 error frame (`{"error": "...", "error_description": "..."}`)
/// and the Google API error frame (`{"error": {"code": ..., "message": ..., "status": ...}}`)
/// are recognized. Anything else is reported with the raw body.
pub(crate) async fn from_http_response(
    response: reqwest::Response,
    context: &str,
) -> CredentialsError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return from_http_error(e, context),
    };
    let (code, detail) = match serde_json::from_str::<ErrorFrame>(&body) {
        Ok(ErrorFrame::Google { error }) => (error.status, error.message.unwrap_or(body)),
        Ok(ErrorFrame::OAuth {
            error,
            error_description,
        }) => (Some(error), error_description.unwrap_or(body)),
        Err(_) => (None, body),
    };
    CredentialsError::remote_auth(status, code, format!("{context}: {detail}"))
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum ErrorFrame {
    Google {
        error: GoogleStatus,
    },
    OAuth {
        error: String,
        error_description: Option<String>,
    },
}

#[derive(Debug, serde::Deserialize)]
struct GoogleStatus {
    message: Option<String>,
    status: Option<String>,
}
