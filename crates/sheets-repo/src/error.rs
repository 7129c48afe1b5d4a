use sheets_refs::RefError;
use sheets_store::StoreError;
use sheets_types::ObjectId;

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    /// A ref or hash that does not resolve to an object.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// A path glob that does not compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// An object that had to be a commit is something else.
    #[error("not a commit: {0}")]
    NotACommit(ObjectId),
}

pub type RepoResult<T> = Result<T, RepoError>;
