//! Error types
//!
//! A single crate-level error enum covers every failure class the feed and
//! pool layers distinguish. [`ErrorKind`] is its cheap, copyable
//! classification, used where only the category matters (feed snapshots,
//! retry decisions).

use crate::content::ContentId;
use crate::pool::ResourceError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retryable network failure
    TransientNetwork,
    /// A single record could not be interpreted
    MalformedRecord,
    /// Playback resource construction failed
    ResourceConstruction,
    /// A cached media artifact is unreadable
    CorruptedArtifact,
    /// Pool admission over budget (resolved internally by eviction)
    CapacityExceeded,
    /// A source refused or dropped a subscription
    Source,
    /// A bounded wait expired
    Timeout,
    /// The operation was cancelled by its owner
    Cancelled,
    /// The owning feed or pool is gone
    Disposed,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may be retried as-is
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork | ErrorKind::Timeout | ErrorKind::Source
        )
    }
}

/// Crate error type
#[derive(Debug, Clone)]
pub enum Error {
    /// Retryable network failure (connection reset, relay unreachable, ...)
    TransientNetwork(String),
    /// Record failed validation and was dropped
    MalformedRecord {
        /// Identifier of the offending record (may be empty)
        id: String,
        /// What made it uninterpretable
        reason: &'static str,
    },
    /// Playback resource could not be built
    ResourceConstruction(ContentId, ResourceError),
    /// Durable artifact for a locator is corrupted
    CorruptedArtifact(String),
    /// Pool is over budget and nothing could be evicted
    CapacityExceeded { live: usize, max: usize },
    /// Subscription refused or closed with an error
    Source(String),
    /// Bounded wait expired
    Timeout,
    /// Cancelled by the owner
    Cancelled,
    /// Owner already torn down
    Disposed,
}

impl Error {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Error::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Error::ResourceConstruction(..) => ErrorKind::ResourceConstruction,
            Error::CorruptedArtifact(_) => ErrorKind::CorruptedArtifact,
            Error::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Error::Source(_) => ErrorKind::Source,
            Error::Timeout => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Disposed => ErrorKind::Disposed,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TransientNetwork(msg) => write!(f, "Transient network error: {}", msg),
            Error::MalformedRecord { id, reason } => {
                write!(f, "Malformed record {:?}: {}", id, reason)
            }
            Error::ResourceConstruction(id, err) => {
                write!(f, "Resource construction failed for {}: {}", id, err)
            }
            Error::CorruptedArtifact(locator) => write!(f, "Corrupted artifact: {}", locator),
            Error::CapacityExceeded { live, max } => {
                write!(f, "Pool capacity exceeded: {} live, max {}", live, max)
            }
            Error::Source(msg) => write!(f, "Source error: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Disposed => write!(f, "Owner disposed"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            Error::MalformedRecord {
                id: "x".into(),
                reason: "empty owner"
            }
            .kind(),
            ErrorKind::MalformedRecord
        );
        assert_eq!(
            Error::CapacityExceeded { live: 4, max: 3 }.kind(),
            ErrorKind::CapacityExceeded
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::MalformedRecord.is_retryable());
        assert!(!ErrorKind::Disposed.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::Source("relay closed".into());
        assert_eq!(err.to_string(), "Source error: relay closed");
    }
}
