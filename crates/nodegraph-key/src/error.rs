//! Error types for composite key operations.

use thiserror::Error;

/// Which segment of a composite key an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// The leading tool segment.
    Tool,
    /// The domain segment.
    Domain,
    /// The optional resource kind segment.
    Kind,
    /// The trailing numeric id.
    Id,
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Domain => write!(f, "domain"),
            Self::Kind => write!(f, "kind"),
            Self::Id => write!(f, "id"),
        }
    }
}

/// The error type for composite key encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key does not split into 3 or 4 segments.
    #[error("invalid key format '{key}': expected tool:domain[:kind]:id, found {segments} segment(s)")]
    InvalidFormat {
        /// The rejected key.
        key: String,
        /// Number of segments found.
        segments: usize,
    },

    /// A segment is empty or contains the separator.
    #[error("invalid {segment} segment '{value}': {reason}")]
    InvalidSegment {
        /// Which segment was rejected.
        segment: Segment,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The id segment is not a positive integer.
    #[error("invalid id '{0}': must be a positive integer")]
    InvalidId(String),

    /// A segment exceeds its maximum length.
    #[error("{segment} segment is too long ({len} > {max} bytes)")]
    TooLong {
        /// Which segment was rejected.
        segment: Segment,
        /// Actual length in bytes.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },
}

/// A specialized Result type for composite key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
