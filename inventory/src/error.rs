//! Inventory error types.
//!
//! Load failures (`SourceNotFound`, `MalformedDocument`, `CycleError`, `Resolution`)
//! abort only the reload in progress. Lookup misses (`UnknownHost`, `UnknownGroup`)
//! are returned by snapshot accessors and never defaulted.

use thiserror::Error;

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Error returned by `reload()` and friends.
pub type LoadError = InventoryError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Inventory source not found: {location}: {reason}")]
    SourceNotFound { location: String, reason: String },

    #[error("Malformed inventory document: {0}")]
    MalformedDocument(String),

    #[error("Group cycle detected: {}", .cycle.join(" -> "))]
    CycleError { cycle: Vec<String> },

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Inventory resolution failed: {0}")]
    Resolution(String),
}

impl InventoryError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// True for `UnknownHost` / `UnknownGroup`, which say nothing about the
    /// health of the loaded inventory.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Self::UnknownHost(_) | Self::UnknownGroup(_))
    }
}
