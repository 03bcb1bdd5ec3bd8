//! Numeric result codes carried in wire envelopes

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable result codes surfaced to clients in the `result` field.
///
/// `0` is reserved for success and never produced by an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorCode {
    Internal,
    ClusterNotFound,
    UnknownOperation,
    InvalidOptions,
    Conflict,
    Storage,
    TransactionNotFound,
    InvalidTransition,
    InvalidConfig,
}

impl ErrorCode {
    /// Integer value placed in the `result` field of a response.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Internal => 1,
            Self::ClusterNotFound => 2,
            Self::UnknownOperation => 3,
            Self::InvalidOptions => 4,
            Self::Conflict => 5,
            Self::Storage => 6,
            Self::TransactionNotFound => 7,
            Self::InvalidTransition => 8,
            Self::InvalidConfig => 9,
        }
    }

    /// Upper-case identifier used in logs and error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "INTERNAL",
            Self::ClusterNotFound => "CLUSTER_NOT_FOUND",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::Conflict => "CONFLICT",
            Self::Storage => "STORAGE",
            Self::TransactionNotFound => "NOT_FOUND",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
