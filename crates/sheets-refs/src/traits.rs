//! The [`RefStore`] trait defining the reference storage interface.

use sheets_types::ObjectId;

use crate::error::RefResult;

/// Storage backend for named references.
///
/// Implementations must be thread-safe and make [`RefStore::update_ref`]
/// atomic: the comparison against `expected_old` and the write happen under
/// one lock. Names are canonical (`refs/heads/master`).
pub trait RefStore: Send + Sync {
    /// Read a ref by canonical name. `Ok(None)` if it does not exist.
    fn read_ref(&self, name: &str) -> RefResult<Option<ObjectId>>;

    /// Point `name` at `new`.
    ///
    /// When `expected_old` is given the update only succeeds if the ref
    /// currently points there; otherwise it fails with
    /// [`RefError::Conflict`](crate::RefError::Conflict) and nothing changes.
    fn update_ref(
        &self,
        name: &str,
        new: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> RefResult<()>;

    /// Delete a ref. Returns `Ok(true)` if it existed.
    fn delete_ref(&self, name: &str) -> RefResult<bool>;

    /// List all refs whose canonical name starts with `prefix`, sorted.
    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, ObjectId)>>;

    /// List all branch refs.
    fn branches(&self) -> RefResult<Vec<(String, ObjectId)>> {
        self.list_refs(crate::names::HEADS_PREFIX)
    }
}
