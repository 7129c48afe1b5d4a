//! The mutable staging tree.
//!
//! A [`MutableTree`] is an in-memory view over a stored tree. Children are
//! loaded from the store the first time a level is touched; writes replace
//! entries in memory and [`MutableTree::write`] folds the touched levels back
//! into new tree objects, bottom-up. Untouched subtrees keep their original
//! id and are never re-read.
//!
//! Handles are cheap to clone and share state: a subtree obtained through
//! [`MutableTree::get_subtree`] is the same node its parent holds, so writing
//! through it is visible from the parent.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sheets_types::ObjectId;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::{EntryMode, Tree, TreeEntry};
use crate::traits::ObjectStore;

/// A reference to a stored blob as it appears in a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub id: ObjectId,
    pub mode: EntryMode,
}

impl BlobRef {
    pub fn regular(id: ObjectId) -> Self {
        Self {
            id,
            mode: EntryMode::Regular,
        }
    }
}

/// A child of a staging tree.
#[derive(Clone)]
pub enum Node {
    Blob(BlobRef),
    Tree(MutableTree),
}

impl Node {
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob(_))
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }

    pub fn as_blob(&self) -> Option<&BlobRef> {
        match self {
            Self::Blob(blob) => Some(blob),
            Self::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&MutableTree> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Blob(_) => None,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob(blob) => f.debug_tuple("Blob").field(&blob.id).finish(),
            Self::Tree(tree) => f.debug_tuple("Tree").field(tree).finish(),
        }
    }
}

/// What to place at a path with [`MutableTree::write_child`].
pub enum ChildContent {
    /// Raw bytes, stored as a new regular blob.
    Bytes(Vec<u8>),
    /// An already-stored blob.
    Blob(BlobRef),
    /// A subtree, grafted as-is.
    Tree(MutableTree),
}

impl From<Vec<u8>> for ChildContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for ChildContent {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<BlobRef> for ChildContent {
    fn from(blob: BlobRef) -> Self {
        Self::Blob(blob)
    }
}

impl From<MutableTree> for ChildContent {
    fn from(tree: MutableTree) -> Self {
        Self::Tree(tree)
    }
}

struct TreeState {
    /// Stored tree this node was loaded from, or last written as.
    base: Option<ObjectId>,
    /// `None` until the level is first loaded.
    children: Option<BTreeMap<String, Node>>,
}

/// Shared handle to a lazily-loaded, mutable tree.
#[derive(Clone)]
pub struct MutableTree {
    inner: Arc<Mutex<TreeState>>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for MutableTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("MutableTree");
        if let Ok(state) = self.inner.lock() {
            dbg.field("base", &state.base)
                .field("loaded", &state.children.as_ref().map(|c| c.len()));
        }
        dbg.finish()
    }
}

/// Split a slash-separated path into its non-empty segments, dropping `.`.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

impl MutableTree {
    /// A new, empty tree.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_state(
            store,
            TreeState {
                base: None,
                children: Some(BTreeMap::new()),
            },
        )
    }

    /// A tree backed by a stored tree object; children load on first access.
    pub fn from_id(store: Arc<dyn ObjectStore>, id: ObjectId) -> Self {
        Self::with_state(
            store,
            TreeState {
                base: Some(id),
                children: None,
            },
        )
    }

    fn with_state(store: Arc<dyn ObjectStore>, state: TreeState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Returns `true` if both handles point at the same node.
    pub fn same_node(&self, other: &MutableTree) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, TreeState>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn loaded<'a>(&self, state: &'a mut TreeState) -> StoreResult<&'a mut BTreeMap<String, Node>> {
        if state.children.is_none() {
            let mut children = BTreeMap::new();
            if let Some(id) = state.base {
                let tree = self.store.read_tree(&id)?;
                trace!(tree = %id.short_hex(), entries = tree.len(), "loaded tree level");
                for entry in tree.entries {
                    let node = if entry.mode.is_tree() {
                        Node::Tree(MutableTree::from_id(Arc::clone(&self.store), entry.object_id))
                    } else {
                        Node::Blob(BlobRef {
                            id: entry.object_id,
                            mode: entry.mode,
                        })
                    };
                    children.insert(entry.name, node);
                }
            }
            state.children = Some(children);
        }
        Ok(state.children.get_or_insert_with(BTreeMap::new))
    }

    /// Snapshot of this level's children.
    pub fn get_children(&self) -> StoreResult<BTreeMap<String, Node>> {
        let mut state = self.lock()?;
        Ok(self.loaded(&mut state)?.clone())
    }

    fn child_named(&self, name: &str) -> StoreResult<Option<Node>> {
        let mut state = self.lock()?;
        Ok(self.loaded(&mut state)?.get(name).cloned())
    }

    /// Look up a descendant by slash-separated path.
    ///
    /// An empty path (or `.`) names this tree itself.
    pub fn get_child(&self, path: &str) -> StoreResult<Option<Node>> {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Ok(Some(Node::Tree(self.clone())));
        };

        let mut current = self.clone();
        for segment in parents {
            match current.child_named(segment)? {
                Some(Node::Tree(tree)) => current = tree,
                _ => return Ok(None),
            }
        }
        current.child_named(last)
    }

    /// Look up (and optionally create) the subtree at `path`.
    ///
    /// With `create`, missing levels are inserted as empty trees; a blob in
    /// the way is an error. Without it, a missing or non-tree level is `None`.
    pub fn get_subtree(&self, path: &str, create: bool) -> StoreResult<Option<MutableTree>> {
        let mut current = self.clone();
        for segment in split_path(path) {
            let next = {
                let mut state = current.lock()?;
                let children = current.loaded(&mut state)?;
                match children.get(segment) {
                    Some(Node::Tree(tree)) => tree.clone(),
                    Some(Node::Blob(_)) if create => {
                        return Err(StoreError::NotATree(path.to_string()));
                    }
                    Some(Node::Blob(_)) => return Ok(None),
                    None if create => {
                        let tree = MutableTree::new(Arc::clone(&current.store));
                        children.insert(segment.to_string(), Node::Tree(tree.clone()));
                        tree
                    }
                    None => return Ok(None),
                }
            };
            current = next;
        }
        Ok(Some(current))
    }

    /// Place content at `path`, creating intermediate trees as needed.
    ///
    /// Returns the node now stored at `path`.
    pub fn write_child(&self, path: &str, content: impl Into<ChildContent>) -> StoreResult<Node> {
        let segments = split_path(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };

        let node = match content.into() {
            ChildContent::Bytes(bytes) => Node::Blob(BlobRef::regular(self.store.write_blob(&bytes)?)),
            ChildContent::Blob(blob) => Node::Blob(blob),
            ChildContent::Tree(tree) => Node::Tree(tree),
        };

        let parent = self
            .get_subtree(&parents.join("/"), true)?
            .ok_or_else(|| StoreError::NotATree(path.to_string()))?;
        let mut state = parent.lock()?;
        parent
            .loaded(&mut state)?
            .insert((*name).to_string(), node.clone());
        trace!(path, "wrote tree child");
        Ok(node)
    }

    /// Remove the entry at `path`. Returns the removed node, if any.
    pub fn delete_child(&self, path: &str) -> StoreResult<Option<Node>> {
        let segments = split_path(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };
        let Some(parent) = self.get_subtree(&parents.join("/"), false)? else {
            return Ok(None);
        };
        let mut state = parent.lock()?;
        Ok(parent.loaded(&mut state)?.remove(*name))
    }

    /// Remove every child of this level except the named ones.
    pub fn retain_only(&self, keep: &[&str]) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let children = self.loaded(&mut state)?;
        let before = children.len();
        children.retain(|name, _| keep.contains(&name.as_str()));
        Ok(before - children.len())
    }

    /// Flattened map of every blob below this tree, keyed by relative path.
    pub fn get_blob_map(&self) -> StoreResult<BTreeMap<String, BlobRef>> {
        let mut out = BTreeMap::new();
        self.collect_blobs("", &mut out)?;
        Ok(out)
    }

    fn collect_blobs(&self, prefix: &str, out: &mut BTreeMap<String, BlobRef>) -> StoreResult<()> {
        for (name, node) in self.get_children()? {
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            match node {
                Node::Blob(blob) => {
                    out.insert(path, blob);
                }
                Node::Tree(tree) => tree.collect_blobs(&path, out)?,
            }
        }
        Ok(())
    }

    /// Returns `true` if no blob exists anywhere below this tree.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.get_blob_map()?.is_empty())
    }

    /// Write every loaded level to the store and return this tree's id.
    ///
    /// Empty subtrees are omitted from their parent, as in git.
    pub fn write(&self) -> StoreResult<ObjectId> {
        let children = {
            let state = self.lock()?;
            match &state.children {
                None => return Ok(state.base.unwrap_or_else(Tree::empty_id)),
                Some(children) => children.clone(),
            }
        };

        let mut entries = Vec::with_capacity(children.len());
        for (name, node) in children {
            match node {
                Node::Blob(blob) => entries.push(TreeEntry::new(blob.mode, name, blob.id)),
                Node::Tree(tree) => {
                    let id = tree.write()?;
                    if id != Tree::empty_id() {
                        entries.push(TreeEntry::new(EntryMode::Directory, name, id));
                    }
                }
            }
        }

        let tree = Tree::new(entries);
        let id = if tree.is_empty() {
            Tree::empty_id()
        } else {
            self.store.write_tree(&tree)?
        };
        self.lock()?.base = Some(id);
        Ok(id)
    }
}
