//! Error types for the OpenAM client.
//!
//! # Design
//! Status-keyed variants (`RedirectionError`, `ClientError`, `ServerError`)
//! are produced once, where the transport response is classified. Only the
//! authentication call sites (`login`, `callback_login`, `change_password`)
//! turn a 401 into `AuthenticationFailure`. Every status-keyed variant keeps
//! the raw response so callers can branch on the server's JSON error body.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = OpenAmError> = std::result::Result<T, E>;

/// Decoded body of a failed response.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    /// Body declared as `application/json` that parsed successfully.
    Json(Value),
    /// Anything else, kept verbatim.
    Text(String),
}

impl ErrorBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ErrorBody::Json(value) => Some(value),
            ErrorBody::Text(_) => None,
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Json(value) => write!(f, "{value}"),
            ErrorBody::Text(text) => f.write_str(text),
        }
    }
}

/// Status, body and content type of a non-2xx response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub body: Option<ErrorBody>,
    pub content_type: Option<String>,
}

impl ErrorResponse {
    /// Decode `body` as JSON when `content_type` says so. An empty body is
    /// recorded as absent; JSON that fails to parse is kept as text.
    pub fn new(status: u16, body: String, content_type: Option<String>) -> Self {
        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"));
        let body = if body.trim().is_empty() {
            None
        } else if is_json {
            Some(
                serde_json::from_str(&body)
                    .map(ErrorBody::Json)
                    .unwrap_or(ErrorBody::Text(body)),
            )
        } else {
            Some(ErrorBody::Text(body))
        };
        Self {
            status,
            body,
            content_type,
        }
    }

    fn details(&self) -> String {
        match &self.body {
            Some(body) => format!(" Details: {body}"),
            None => String::new(),
        }
    }
}

/// Errors returned by `ServerContext` and `Session` operations.
#[derive(Debug, Error)]
pub enum OpenAmError {
    /// 401 from login, callback login or password change.
    #[error("{message}{}", .response.details())]
    AuthenticationFailure {
        message: String,
        response: ErrorResponse,
    },

    /// 3xx response that the transport did not follow.
    #[error("{message}{}", .response.details())]
    RedirectionError {
        message: String,
        response: ErrorResponse,
    },

    /// 4xx response.
    #[error("{message}{}", .response.details())]
    ClientError {
        message: String,
        response: ErrorResponse,
    },

    /// 5xx response.
    #[error("{message}{}", .response.details())]
    ServerError {
        message: String,
        response: ErrorResponse,
    },

    /// No HTTP response was obtained: DNS, refused connection, timeout, TLS.
    #[error("{message}")]
    CommunicationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The request could not be built, e.g. a header name the server handed
    /// back is not a valid HTTP token.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A successful response did not have the expected shape.
    #[error("unexpected response: {what}")]
    InvalidResponse {
        what: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{operation} requires an authenticated session")]
    NotAuthenticated { operation: &'static str },

    #[error("session has been logged out")]
    SessionClosed,

    /// The server answered a callback submission with another challenge.
    /// The new challenge is available from `Session::pending_challenge`.
    #[error("server requested another authentication round{}", stage_suffix(.stage))]
    MultiRoundChallenge { stage: Option<String> },
}

fn stage_suffix(stage: &Option<String>) -> String {
    match stage {
        Some(stage) => format!(" (stage {stage})"),
        None => String::new(),
    }
}

impl OpenAmError {
    /// Build the status-keyed error for a non-2xx response to `url`.
    pub(crate) fn from_status(url: &str, response: ErrorResponse) -> Self {
        let status = response.status;
        let reason = ureq::http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown");
        match status {
            401 => OpenAmError::ClientError {
                message: format!("401 Unauthorised to access {url}"),
                response,
            },
            300..=399 => OpenAmError::RedirectionError {
                message: format!("{status} Redirection response ({reason}) from {url}"),
                response,
            },
            400..=499 => OpenAmError::ClientError {
                message: format!("{status} Client error ({reason}) from {url}."),
                response,
            },
            _ => OpenAmError::ServerError {
                message: format!("{status} Server error ({reason}) from {url}"),
                response,
            },
        }
    }

    pub(crate) fn communication(url: &str, source: ureq::Error) -> Self {
        OpenAmError::CommunicationError {
            message: format!("Communication error when trying {url}. {source}"),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn invalid_json(what: impl Into<String>, source: serde_json::Error) -> Self {
        OpenAmError::InvalidResponse {
            what: what.into(),
            source: Some(source),
        }
    }

    /// Re-key a 401 as `AuthenticationFailure` naming `username`; any other
    /// error passes through unchanged.
    pub(crate) fn into_authentication_failure(self, username: Option<&str>) -> Self {
        match self {
            OpenAmError::ClientError { response, .. } if response.status == 401 => {
                OpenAmError::AuthenticationFailure {
                    message: format!(
                        "Invalid credentials for user \"{}\".",
                        username.unwrap_or_default()
                    ),
                    response,
                }
            }
            other => other,
        }
    }

    /// The full error response for status-keyed variants.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            OpenAmError::AuthenticationFailure { response, .. }
            | OpenAmError::RedirectionError { response, .. }
            | OpenAmError::ClientError { response, .. }
            | OpenAmError::ServerError { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    pub fn body(&self) -> Option<&ErrorBody> {
        self.response().and_then(|r| r.body.as_ref())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.response().and_then(|r| r.content_type.as_deref())
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, OpenAmError::AuthenticationFailure { .. })
    }
}
