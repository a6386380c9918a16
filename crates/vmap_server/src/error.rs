//! Error types for the map server.
//!
//! Handlers return [`ServerError`]; the transport boundary turns it into a
//! [`Status`] with [`ServerError::status`]. Storage errors are mapped by
//! their [`ErrorKind`], never by variant, so new core variants cannot leak
//! through unmapped.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use vmap_core::{ErrorKind, MapError, TreeId};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failure reported by an injected collaborator (signer, hasher).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    /// Creates a collaborator error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur in the map server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The tree is not known to the tree provider.
    #[error("unknown tree: {0}")]
    UnknownTree(TreeId),

    /// The request did not reach commit in time.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The root signer failed.
    #[error("signer failed: {0}")]
    Signer(CollaboratorError),

    /// The root hasher failed.
    #[error("hasher failed: {0}")]
    Hasher(CollaboratorError),

    /// Storage error.
    #[error(transparent)]
    Map(#[from] MapError),
}

impl ServerError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the transport status for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(message) => Status::new(Code::InvalidArgument, message.clone()),
            Self::UnknownTree(_) => Status::new(Code::NotFound, self.to_string()),
            Self::DeadlineExceeded(_) => Status::new(Code::DeadlineExceeded, self.to_string()),
            Self::Signer(_) | Self::Hasher(_) => Status::new(Code::Internal, self.to_string()),
            Self::Map(err) => Status::from(err),
        }
    }

    /// Returns true if the caller caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.status().code,
            Code::NotFound | Code::InvalidArgument | Code::FailedPrecondition
        )
    }

    /// Returns true if the server or its backend caused the error.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

/// Transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The tree, revision or root does not exist.
    NotFound,
    /// The request is malformed or names an unreadable revision.
    InvalidArgument,
    /// The session is not in a state that allows the call.
    FailedPrecondition,
    /// A concurrent writer won; retry.
    Aborted,
    /// A limit was exceeded.
    ResourceExhausted,
    /// The backend is unavailable; retry.
    Unavailable,
    /// The request ran out of time.
    DeadlineExceeded,
    /// A collaborator failed.
    Internal,
}

impl Code {
    /// Returns the canonical name of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl From<ErrorKind> for Code {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound | ErrorKind::NoRootsYet => Self::NotFound,
            ErrorKind::InvalidRevision => Self::InvalidArgument,
            ErrorKind::DuplicateRoot | ErrorKind::MissingRoot | ErrorKind::Closed => {
                Self::FailedPrecondition
            }
            ErrorKind::Busy => Self::Aborted,
            ErrorKind::ResourceExhausted => Self::ResourceExhausted,
            ErrorKind::Storage => Self::Unavailable,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status code with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The code.
    pub code: Code,
    /// Details for humans; never parsed.
    pub message: String,
}

impl Status {
    /// Creates a status.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&MapError> for Status {
    fn from(err: &MapError) -> Self {
        Self::new(Code::from(err.kind()), err.to_string())
    }
}

impl From<ServerError> for Status {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
