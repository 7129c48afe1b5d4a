//! Record codecs for sheets.
//!
//! A [`Record`] is a TOML table. Tables are `BTreeMap`-backed, so keys are
//! sorted at every depth and [`serialize_record`] is canonical: two records
//! with the same fields always encode to the same bytes, and therefore the
//! same blob hash. TOML has no `null`; decoders drop null fields, so a null
//! field and an absent one are the same record.
//!
//! Interchange formats:
//!
//! - JSON ([`json`]) -- objects to records and back.
//! - CSV ([`csv`]) -- header row, `a.b.c` columns expand into nested tables.

pub mod csv;
pub mod error;
pub mod json;
pub mod record;

pub use error::{CodecError, CodecResult};
pub use record::{
    deserialize_record, render_scalar, serialize_record, Format, Record, Value, RECORD_EXTENSION,
};
