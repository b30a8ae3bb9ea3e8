//! Error types for log construction, append, join and fetch.
//!
//! [`LogError`] is the single error surfaced by the public log API. Each
//! variant maps onto a stable [`ErrorCode`] so callers can branch on a
//! machine-readable identifier instead of matching display strings.

use std::fmt;

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Configuration,
    Validation,
    InvalidBound,
    EmptyLog,
    NotALog,
    AccessDenied,
    SignatureInvalid,
    StorageTimeout,
    IdMismatch,
    StorageFailure,
    SigningFailure,
    SerializationFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Configuration => "E1001",
            Self::Validation => "E1002",
            Self::InvalidBound => "E1003",
            Self::EmptyLog => "E2001",
            Self::NotALog => "E2002",
            Self::AccessDenied => "E3001",
            Self::SignatureInvalid => "E3002",
            Self::StorageTimeout => "E4001",
            Self::IdMismatch => "E4002",
            Self::StorageFailure => "E5001",
            Self::SigningFailure => "E5002",
            Self::SerializationFailure => "E9001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Configuration => "Invalid log configuration",
            Self::Validation => "Malformed entries or heads",
            Self::InvalidBound => "Invalid iterator bound",
            Self::EmptyLog => "Log is empty",
            Self::NotALog => "Block is not a log manifest",
            Self::AccessDenied => "Write access denied",
            Self::SignatureInvalid => "Entry signature invalid",
            Self::StorageTimeout => "Block fetch timed out",
            Self::IdMismatch => "Log ids differ",
            Self::StorageFailure => "Block store failure",
            Self::SigningFailure => "Identity could not sign",
            Self::SerializationFailure => "Serialization failure",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::Configuration => Some("Check concurrency values and the sort name in weft.toml."),
            Self::InvalidBound => Some("Pass hashes of entries that are present in the log."),
            Self::EmptyLog => Some("Append at least one entry before writing a manifest."),
            Self::AccessDenied => Some("Grant the identity write access in the access controller."),
            Self::StorageTimeout => Some("Raise the fetch timeout or check block availability."),
            Self::IdMismatch => Some("Only logs sharing an id can be joined."),
            Self::Validation
            | Self::NotALog
            | Self::SignatureInvalid
            | Self::StorageFailure
            | Self::SigningFailure
            | Self::SerializationFailure => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by [`crate::log::Log`], [`crate::entry_io`] and [`crate::log_io`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Construction or config values are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Entries or heads handed to a constructor are inconsistent.
    #[error("validation error: {0}")]
    Validation(String),

    /// An iterator bound does not resolve to entries of this log.
    #[error("lt or lte must be a hash or entries known to the log: {0}")]
    InvalidBound(String),

    /// A manifest was requested for a log with no entries.
    #[error("can't serialize an empty log")]
    EmptyLog,

    /// A block was read as a log manifest but lacks `id` or `heads`.
    #[error("block {0} is not a log manifest")]
    NotALog(String),

    /// The access controller rejected an entry.
    #[error("could not append entry, key \"{identity}\" is not allowed to write to the log")]
    AccessDenied {
        /// Identity id of the rejected writer.
        identity: String,
    },

    /// An entry's signature did not verify against its claimed key.
    #[error("could not validate signature \"{sig}\" for entry \"{hash}\" and key \"{key}\"")]
    Signature {
        /// Hash of the offending entry.
        hash: String,
        /// The signature carried by the entry.
        sig: String,
        /// The public key the entry claims.
        key: String,
    },

    /// A single block fetch exceeded its deadline.
    #[error("couldn't fetch entry {hash}, request timed out ({timeout_ms}ms)")]
    StorageTimeout {
        /// Address that was being fetched.
        hash: String,
        /// The deadline that elapsed.
        timeout_ms: u128,
    },

    /// Two logs with different ids were combined.
    #[error("can't join logs with different ids: {expected} vs {actual}")]
    IdMismatch {
        /// Id of the receiving log.
        expected: String,
        /// Id of the other log.
        actual: String,
    },

    /// The block store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The identity provider failed to sign or verify.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A JSON value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LogError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Validation(_) => ErrorCode::Validation,
            Self::InvalidBound(_) => ErrorCode::InvalidBound,
            Self::EmptyLog => ErrorCode::EmptyLog,
            Self::NotALog(_) => ErrorCode::NotALog,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::Signature { .. } => ErrorCode::SignatureInvalid,
            Self::StorageTimeout { .. } => ErrorCode::StorageTimeout,
            Self::IdMismatch { .. } => ErrorCode::IdMismatch,
            Self::Store(_) => ErrorCode::StorageFailure,
            Self::Identity(_) => ErrorCode::SigningFailure,
            Self::Serialization(_) => ErrorCode::SerializationFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
