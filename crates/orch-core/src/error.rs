//! Error taxonomy shared by every orchestration-core component.

use thiserror::Error;

/// Stable error kind, independent of the human-readable message.
///
/// Every error carries exactly one kind; callers match on the kind rather
/// than the message text. Kinds map directly onto the CLI exit codes
/// produced by `orchctl` (see `orchctl::output::exit_code_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    PolicyDenied,
    ResourceExhausted,
    PreconditionFailed,
    Timeout,
    ValidationFailed,
    Fatal,
}

/// The core error type returned by every fallible operation in the
/// orchestration-core crates.
#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {message}")]
pub struct OrchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OrchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, msg)
    }

    pub fn policy_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyDenied, msg)
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, msg)
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, msg)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }
}

impl From<std::io::Error> for OrchError {
    fn from(e: std::io::Error) -> Self {
        OrchError::fatal(format!("io error: {e}"))
    }
}

impl From<serde_json::Error> for OrchError {
    fn from(e: serde_json::Error) -> Self {
        OrchError::fatal(format!("serialization error: {e}"))
    }
}

pub type OrchResult<T> = Result<T, OrchError>;
