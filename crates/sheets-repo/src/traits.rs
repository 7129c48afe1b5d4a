use std::sync::Arc;

use async_trait::async_trait;
use sheets_store::{BlobRef, MutableTree, ObjectStore, Tree};
use sheets_types::ObjectId;

use crate::error::RepoResult;

/// The object database a sheet reads from and writes to.
///
/// Refs may be short branch names (`master`), canonical names
/// (`refs/heads/master`) or full hex object ids.
#[async_trait]
pub trait ObjectDatabase: Send + Sync {
    /// The backing object store, for staging trees.
    fn store(&self) -> Arc<dyn ObjectStore>;

    async fn read_blob(&self, id: &ObjectId) -> RepoResult<Vec<u8>>;

    async fn write_blob(&self, data: &[u8]) -> RepoResult<BlobRef>;

    /// Resolve a ref to the object it names. `Ok(None)` if it does not resolve.
    async fn resolve_ref(&self, reference: &str) -> RepoResult<Option<ObjectId>>;

    /// A staging tree loaded from the root tree of `reference`.
    ///
    /// Fails with [`RepoError::InvalidRef`](crate::RepoError::InvalidRef)
    /// when the ref does not resolve.
    async fn create_tree_from_ref(&self, reference: &str) -> RepoResult<MutableTree>;

    /// Hash of the tree at `path` below the root tree of `reference`.
    ///
    /// `Ok(None)` when the path does not exist or is not a tree.
    async fn tree_hash(&self, reference: &str, path: &str) -> RepoResult<Option<ObjectId>>;

    /// Write every touched level of a staging tree, returning its hash.
    async fn write_tree(&self, tree: &MutableTree) -> RepoResult<ObjectId>;

    /// Raw NUL-delimited diff between two trees, restricted to `pattern`.
    async fn diff_tree(&self, src: &ObjectId, dst: &ObjectId, pattern: &str)
        -> RepoResult<Vec<u8>>;

    /// Returns `true` if commit `ancestor` is reachable from `descendant`.
    async fn merge_base_is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> RepoResult<bool>;

    async fn commit_tree(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> RepoResult<ObjectId>;

    /// Point a branch at `new`, optionally only if it currently points at
    /// `expected_old`.
    async fn update_ref(
        &self,
        reference: &str,
        new: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> RepoResult<()>;

    /// Force-delete a branch. Returns `Ok(true)` if it existed.
    async fn delete_branch(&self, name: &str) -> RepoResult<bool>;

    /// A new, empty staging tree.
    fn create_tree(&self) -> MutableTree {
        MutableTree::new(self.store())
    }

    /// Hash of the empty tree.
    fn empty_tree_hash(&self) -> ObjectId {
        Tree::empty_id()
    }
}
