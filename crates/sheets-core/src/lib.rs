//! Sheets of records stored as files in a content-addressed tree.
//!
//! A [`Sheet`] maps every record to a path through its configured template,
//! stores it as a canonical TOML blob in a staging [`MutableTree`] and reads
//! it back through template-guided queries. [`GitSheets`] adds the
//! repository-level workflow on top: checking out workspaces, importing
//! and exporting whole sheets, committing to branches, comparing two refs
//! record by record and merging a proposal branch.
//!
//! # Modules
//!
//! - [`config`] -- [`SheetConfig`], field declarations and [`OpenOptions`]
//! - [`normalize`] -- defaults, coercion, enums and array sorting
//! - [`sort`] -- comparators for declared array sort orders
//! - [`query`] -- [`Query`] filters and loose equality
//! - [`sheet`] -- [`Sheet`]: upsert, query, delete, attachments, diff
//! - [`diff`] -- raw diff parsing and [`DiffEntry`]
//! - [`patch`] -- JSON patches between two records
//! - [`gitsheets`] -- [`GitSheets`]: import, export, compare, merge
//!
//! [`MutableTree`]: sheets_store::MutableTree

pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod gitsheets;
pub mod normalize;
pub mod patch;
pub mod query;
pub mod queue;
pub mod sheet;
pub mod sort;


pub use config::{FieldSpec, FieldType, OpenOptions, SheetConfig, SortSpec, CONFIG_DIR};
pub use diff::{DiffEntry, DiffOptions, DiffStatus};
pub use error::{SheetError, SheetResult};
pub use gitsheets::{has_sheet, GitSheets, ImportOutcome, ImportRequest};
pub use normalize::normalize;
pub use patch::{diff_records, PatchKind, PatchOp};
pub use query::{Criterion, Query};
pub use sheet::{PendingRecord, QueriedRecord, RecordStream, Sheet, UpsertResult};

// Re-export the types callers need to drive a sheet.
pub use sheets_codec::{Record, Value};
pub use sheets_repo::{ObjectDatabase, Repository};
pub use sheets_store::{BlobRef, MutableTree};
pub use sheets_types::ObjectId;
