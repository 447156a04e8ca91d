//! Classified graph store errors.
//!
//! Every failure coming out of a [`GraphStore`](super::GraphStore) or a
//! [`GraphTxn`](super::GraphTxn) is a [`StoreError`]. The transactional executor
//! only looks at [`StoreError::class`] to decide whether an attempt is retried.

use thiserror::Error;

/// Neo4j status code reported when the lock manager aborts a transaction.
pub const DEADLOCK_CODE: &str = "Neo.TransientError.Transaction.DeadlockDetected";

/// How the executor must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Store unreachable or session expired. Retried immediately.
    Unavailable,
    /// Write-write conflict (deadlock). Retried with exponential backoff.
    WriteConflict,
    /// Any other transient condition. Not retried.
    Transient,
    /// Programming or data error. Not retried.
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::WriteConflict)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::WriteConflict => write!(f, "write_conflict"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error raised by the graph store or by work running inside a transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("transient store error {code}: {message}")]
    Transient { code: String, message: String },

    #[error("store rejected query {code}: {message}")]
    Database { code: String, message: String },

    #[error("invalid identifier for templated query: {0}")]
    InvalidIdentifier(String),

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("identifier already in use: {0}")]
    IdentifierTaken(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Shorthand used by stores and tests to signal a deadlock abort.
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::Transient {
            code: DEADLOCK_CODE.to_string(),
            message: message.into(),
        }
    }

    /// Build an error from a Neo4j status code.
    pub fn from_status(code: &str, message: &str) -> Self {
        if code.contains("ServiceUnavailable") || code.contains("DatabaseUnavailable") {
            Self::Unavailable(format!("{code}: {message}"))
        } else if code.contains("SessionExpired") {
            Self::SessionExpired(format!("{code}: {message}"))
        } else if code.starts_with("Neo.TransientError") {
            Self::Transient {
                code: code.to_string(),
                message: message.to_string(),
            }
        } else {
            Self::Database {
                code: code.to_string(),
                message: message.to_string(),
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable(_) | Self::SessionExpired(_) => ErrorClass::Unavailable,
            Self::Transient { code, .. } if code == DEADLOCK_CODE => ErrorClass::WriteConflict,
            Self::Transient { .. } => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// Errors caused by the shape of the data rather than by the store.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidIdentifier(_) | Self::IdentifierTaken(_)
        )
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        match err {
            neo4rs::Error::Neo4j(ref e) => Self::from_status(e.code(), e.message()),
            neo4rs::Error::IOError { .. } => Self::Unavailable(err.to_string()),
            other => {
                let text = other.to_string();
                if text.to_lowercase().contains("connection") {
                    Self::Unavailable(text)
                } else {
                    Self::Other(anyhow::anyhow!(text))
                }
            }
        }
    }
}

impl From<neo4rs::DeError> for StoreError {
    fn from(err: neo4rs::DeError) -> Self {
        Self::Other(anyhow::anyhow!("failed to decode row: {err}"))
    }
}
