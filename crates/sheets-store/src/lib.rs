//! Content-addressed object storage for sheets.
//!
//! This crate is the storage half of the object store adapter: an immutable,
//! hash-keyed store of blobs, trees and commits analogous to git's object
//! database, plus [`MutableTree`], the in-memory staging tree that record
//! writes are applied to before a new tree hash is produced.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content (a serialized record or an attachment)
//! - [`Tree`] -- sorted directory listing mapping names to object ids
//! - [`Commit`] -- a tree snapshot with parent commits and a message
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; the same bytes always yield the
//!    same [`ObjectId`](sheets_types::ObjectId).
//! 2. Concurrent reads are always safe.
//! 3. The store never interprets blob contents.
//! 4. Staging trees load children lazily and only write what was touched.

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Commit, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
pub use tree::{BlobRef, ChildContent, MutableTree, Node};
