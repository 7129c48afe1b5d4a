//! Error types for reference operations.

use sheets_types::ObjectId;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A compare-and-swap update observed a different old value.
    #[error("ref {name} moved: expected {expected}, found {}", display_tip(.actual))]
    Conflict {
        name: String,
        expected: ObjectId,
        actual: Option<ObjectId>,
    },

    /// A lock guarding the ref table was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

fn display_tip(tip: &Option<ObjectId>) -> String {
    match tip {
        Some(id) => id.to_string(),
        None => "nothing".into(),
    }
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
