use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use sheets_refs::{qualify_branch, InMemoryRefStore, RefStore};
use sheets_store::{
    BlobRef, Commit, InMemoryObjectStore, MutableTree, ObjectKind, ObjectStore, Tree,
};
use sheets_types::ObjectId;
use tracing::{debug, info};

use crate::diff::{content_similarity, diff_blob_maps, encode_raw_diff};
use crate::error::{RepoError, RepoResult};
use crate::pathspec::PathGlob;
use crate::traits::ObjectDatabase;

/// An [`ObjectDatabase`] over an object store and a ref store.
#[derive(Clone)]
pub struct Repository {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
}

impl Repository {
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self { objects, refs }
    }

    /// A repository whose objects and refs live in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
        )
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    fn resolve(&self, reference: &str) -> RepoResult<Option<ObjectId>> {
        if ObjectId::looks_like_hex(reference) {
            let id = reference
                .parse::<ObjectId>()
                .map_err(|_| RepoError::InvalidRef(reference.to_string()))?;
            let known = id == Tree::empty_id() || self.objects.exists(&id)?;
            return Ok(known.then_some(id));
        }
        match qualify_branch(reference) {
            Ok(name) => Ok(self.refs.read_ref(&name)?),
            Err(_) => Ok(None),
        }
    }

    fn resolve_required(&self, reference: &str) -> RepoResult<ObjectId> {
        self.resolve(reference)?
            .ok_or_else(|| RepoError::InvalidRef(reference.to_string()))
    }

    /// The root tree named by a commit or tree id.
    fn root_tree(&self, id: ObjectId) -> RepoResult<ObjectId> {
        if id == Tree::empty_id() {
            return Ok(id);
        }
        let object = self.objects.read_required(&id)?;
        match object.kind {
            ObjectKind::Commit => Ok(Commit::from_stored_object(&object)?.tree),
            ObjectKind::Tree => Ok(id),
            ObjectKind::Blob => Err(RepoError::InvalidRef(id.to_hex())),
        }
    }

    fn commit(&self, id: &ObjectId) -> RepoResult<Commit> {
        let object = self.objects.read_required(id)?;
        if object.kind != ObjectKind::Commit {
            return Err(RepoError::NotACommit(*id));
        }
        Ok(Commit::from_stored_object(&object)?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectDatabase for Repository {
    fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.objects)
    }

    async fn read_blob(&self, id: &ObjectId) -> RepoResult<Vec<u8>> {
        Ok(self.objects.read_blob(id)?)
    }

    async fn write_blob(&self, data: &[u8]) -> RepoResult<BlobRef> {
        Ok(BlobRef::regular(self.objects.write_blob(data)?))
    }

    async fn resolve_ref(&self, reference: &str) -> RepoResult<Option<ObjectId>> {
        self.resolve(reference)
    }

    async fn create_tree_from_ref(&self, reference: &str) -> RepoResult<MutableTree> {
        let root = self.root_tree(self.resolve_required(reference)?)?;
        Ok(MutableTree::from_id(self.store(), root))
    }

    async fn tree_hash(&self, reference: &str, path: &str) -> RepoResult<Option<ObjectId>> {
        let mut current = self.root_tree(self.resolve_required(reference)?)?;
        for segment in sheets_store::tree::split_path(path) {
            let tree = self.objects.read_tree(&current)?;
            match tree.get(segment) {
                Some(entry) if entry.mode.is_tree() => current = entry.object_id,
                _ => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    async fn write_tree(&self, tree: &MutableTree) -> RepoResult<ObjectId> {
        Ok(tree.write()?)
    }

    async fn diff_tree(
        &self,
        src: &ObjectId,
        dst: &ObjectId,
        pattern: &str,
    ) -> RepoResult<Vec<u8>> {
        let old = MutableTree::from_id(self.store(), self.root_tree(*src)?).get_blob_map()?;
        let new = MutableTree::from_id(self.store(), self.root_tree(*dst)?).get_blob_map()?;
        let glob = PathGlob::new(pattern)?;
        let store = self.store();
        let changes = diff_blob_maps(&old, &new, &glob, |src, dst| {
            Ok::<_, RepoError>(content_similarity(
                &store.read_blob(&src.id)?,
                &store.read_blob(&dst.id)?,
            ))
        })?;
        debug!(
            src = %src.short_hex(),
            dst = %dst.short_hex(),
            pattern,
            changes = changes.len(),
            "diffed trees"
        );
        Ok(encode_raw_diff(&changes))
    }

    async fn merge_base_is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> RepoResult<bool> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);
        while let Some(id) = queue.pop_front() {
            if id == *ancestor {
                return Ok(true);
            }
            if seen.insert(id) {
                queue.extend(self.commit(&id)?.parents);
            }
        }
        Ok(false)
    }

    async fn commit_tree(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> RepoResult<ObjectId> {
        let commit = Commit {
            tree: *tree,
            parents: parents.to_vec(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        let id = self.objects.write_commit(&commit)?;
        info!(
            commit = %id.short_hex(),
            tree = %tree.short_hex(),
            parents = parents.len(),
            "created commit"
        );
        Ok(id)
    }

    async fn update_ref(
        &self,
        reference: &str,
        new: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> RepoResult<()> {
        let name = qualify_branch(reference)?;
        self.refs.update_ref(&name, new, expected_old)?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str) -> RepoResult<bool> {
        let name = qualify_branch(name)?;
        Ok(self.refs.delete_ref(&name)?)
    }
}
