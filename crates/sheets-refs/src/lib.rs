//! Named references for sheets.
//!
//! Refs are the human-readable entry points into commit history: a branch
//! such as `refs/heads/master` names the commit at its tip. Updates are
//! compare-and-swap so that two writers racing on the same branch cannot
//! silently overwrite each other.
//!
//! # Modules
//!
//! - [`error`] -- Error types for ref operations
//! - [`traits`] -- The [`RefStore`] trait defining the storage interface
//! - [`names`] -- Branch name validation and qualification
//! - [`memory`] -- In-memory [`InMemoryRefStore`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{RefError, RefResult};
pub use memory::InMemoryRefStore;
pub use names::{qualify_branch, short_name, validate_branch_name, HEADS_PREFIX};
pub use traits::RefStore;
