//! Record path templates.
//!
//! A template such as `people/${{ last_name }}/${{ id }}` maps a record to
//! the path it is stored at (`people/lovelace/1`, stored as
//! `people/lovelace/1.toml`). The same template drives queries: a partial
//! record renders the components it can, and the tree walk descends only
//! into the branches those components name, enumerating the rest.
//!
//! Expressions inside `${{ }}` are evaluated by the sandboxed interpreter
//! in [`expr`].

pub mod error;
pub mod expr;
pub mod template;

pub use error::{TemplateError, TemplateResult};
pub use template::{Component, ComponentKind, Template};
