//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. Remote
//! failures carry a [`RemoteErrorKind`] assigned where the failure is first
//! observed, so callers never have to inspect message text to decide whether
//! the credential needs attention.

use thiserror::Error;

/// Classification attached to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The access credential is missing or was rejected.
    Credential,
    /// The service could not resolve the requested entity (model, operation).
    NotFound,
    Other,
}

/// What the tool controller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    MissingCredential,
    UnresolvableReference,
    Other,
}

impl ErrorClass {
    /// Both credential-related classes ask the credential provider to re-check.
    pub fn requires_credential_recheck(self) -> bool {
        matches!(
            self,
            ErrorClass::MissingCredential | ErrorClass::UnresolvableReference
        )
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to encode {path}: {source}")]
    Encoding {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed audio payload: {0}")]
    MalformedAudio(String),

    #[error("No result: {0}")]
    NoResult(String),

    #[error("Operation completed immediately without a result")]
    EmptyImmediateCompletion,

    #[error("Remote call failed: {message}")]
    RemoteCall {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("Operation {operation} failed (code {code}): {message}")]
    OperationFailed {
        operation: String,
        code: i64,
        message: String,
    },

    #[error("Polling failed: {0}")]
    PollFailure(#[source] Box<Error>),

    #[error("Polling gave up after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    #[error("Failed to fetch result (status {status}): {message}")]
    ResultFetchFailure { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Error::RemoteCall {
            kind,
            message: message.into(),
        }
    }

    /// Classifies the error for the tool controller.
    ///
    /// Poll failures are classified by the refresh error they wrap.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::RemoteCall {
                kind: RemoteErrorKind::Credential,
                ..
            } => ErrorClass::MissingCredential,
            Error::RemoteCall {
                kind: RemoteErrorKind::NotFound,
                ..
            } => ErrorClass::UnresolvableReference,
            Error::PollFailure(inner) => inner.class(),
            _ => ErrorClass::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
