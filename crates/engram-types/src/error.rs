use std::fmt;

/// Result type for engram-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the types layer
#[derive(Debug)]
pub enum Error {
    /// Identifier failed prefix or charset validation
    InvalidId(String),

    /// A field value is malformed or out of range
    InvalidField(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidId(msg) => write!(f, "Invalid id: {}", msg),
            Error::InvalidField(msg) => write!(f, "Invalid field: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
