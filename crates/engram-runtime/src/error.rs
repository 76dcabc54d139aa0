use std::fmt;

/// Result type for engram-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// The public error taxonomy of the service surface.
///
/// Errors surface unchanged to the caller; the core performs no retries
/// beyond the storage layer's single serialization-conflict retry.
#[derive(Debug)]
pub enum Error {
    /// Malformed or out-of-range caller input; never retried
    Invalid(String),

    /// Missing resource, or a cross-tenant resource (indistinguishable)
    NotFound(String),

    /// Principal lacks the required role or scope
    Forbidden(String),

    /// Concurrent write contention or a state-machine violation
    Conflict(String),

    /// Secret detected while policy is reject
    SensitiveContent(String),

    /// Capsule or access-time expiry
    Expired(String),

    /// Storage or dependency failure; transient, caller owns retry
    Backend(engram_store::Error),

    /// Request exceeded its deadline at an I/O boundary
    DeadlineExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Invalid(msg) => write!(f, "Invalid request: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::SensitiveContent(msg) => write!(f, "Sensitive content: {}", msg),
            Error::Expired(msg) => write!(f, "Expired: {}", msg),
            Error::Backend(err) => write!(f, "Backend error: {}", err),
            Error::DeadlineExceeded => write!(f, "Deadline exceeded"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<engram_store::Error> for Error {
    fn from(err: engram_store::Error) -> Self {
        Error::Backend(err)
    }
}

impl From<engram_types::Error> for Error {
    fn from(err: engram_types::Error) -> Self {
        Error::Invalid(err.to_string())
    }
}
