use sheets_types::ObjectId;

/// Errors from object store and staging tree operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Serialization or deserialization failure of a tree or commit.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object data is malformed or of an unexpected kind.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Attempted to store an object whose id is null.
    #[error("cannot store object with null ID")]
    NullObjectId,

    /// A path segment that must be a tree is a blob.
    #[error("not a tree: {0}")]
    NotATree(String),

    /// A path that cannot address a tree child (empty, or names the root).
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
