//! The object database adapter consumed by sheets.
//!
//! [`ObjectDatabase`] is the narrow, async interface the sheet layer talks
//! to: blob I/O, staging trees, tree hashes at a ref, a glob-restricted tree
//! diff in git's raw `-z` format, ancestry checks, commit creation and
//! compare-and-swap ref updates. [`Repository`] implements it over an
//! [`ObjectStore`](sheets_store::ObjectStore) and a
//! [`RefStore`](sheets_refs::RefStore).
//!
//! # Modules
//!
//! - [`error`] -- [`RepoError`]
//! - [`traits`] -- the [`ObjectDatabase`] trait
//! - [`repository`] -- [`Repository`]
//! - [`diff`] -- flattened tree comparison and raw diff encoding
//! - [`pathspec`] -- path globs restricting diffs

pub mod diff;
pub mod error;
pub mod pathspec;
pub mod repository;
pub mod traits;

pub use diff::{
    content_similarity, diff_blob_maps, encode_raw_diff, ChangeKind, TreeChange, RENAME_THRESHOLD,
};
pub use error::{RepoError, RepoResult};
pub use pathspec::PathGlob;
pub use repository::Repository;
pub use traits::ObjectDatabase;
