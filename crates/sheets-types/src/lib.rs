//! Foundation types for sheets.
//!
//! Every other sheets crate depends on `sheets-types`. It defines how stored
//! content is addressed: an [`ObjectId`] is the BLAKE3 hash of an object's
//! bytes, computed by a [`ContentHasher`] that prefixes a per-kind domain tag
//! so a blob and a tree with identical bytes never share an address.

pub mod error;
pub mod hasher;
pub mod object;

pub use error::TypeError;
pub use hasher::ContentHasher;
pub use object::ObjectId;
