use crate::error::{CodecError, CodecResult};

pub use toml::Value;

/// A record: field name to scalar, array or nested table.
pub type Record = toml::Table;

/// File extension of stored records.
pub const RECORD_EXTENSION: &str = "toml";

/// Encode a record canonically.
pub fn serialize_record(record: &Record) -> CodecResult<Vec<u8>> {
    Ok(toml::to_string(record)?.into_bytes())
}

/// Decode a stored record.
pub fn deserialize_record(bytes: &[u8]) -> CodecResult<Record> {
    Ok(toml::from_str(std::str::from_utf8(bytes)?)?)
}

/// The textual form of a scalar, as it appears in a path or CSV cell.
///
/// Arrays and tables have no scalar form.
pub fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

/// An interchange format records can be read from and written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
    Csv,
}

impl Format {
    /// Guess a format from a file name or bare extension.
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next().unwrap_or(name);
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Decode every record in `bytes`.
    ///
    /// TOML input holds one record; JSON input holds an object or an array
    /// of objects; CSV input holds one record per row.
    pub fn read_records(&self, bytes: &[u8]) -> CodecResult<Vec<Record>> {
        match self {
            Self::Toml => Ok(vec![deserialize_record(bytes)?]),
            Self::Json => crate::json::read_records(bytes),
            Self::Csv => crate::csv::read_records(bytes),
        }
    }

    /// Encode records for export.
    pub fn write_records(&self, records: &[Record]) -> CodecResult<Vec<u8>> {
        match self {
            Self::Toml => {
                let mut out = Vec::new();
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        out.push(b'\n');
                    }
                    out.extend(serialize_record(record)?);
                }
                Ok(out)
            }
            Self::Json => crate::json::write_records(records),
            Self::Csv => crate::csv::write_records(records),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| CodecError::UnknownFormat(s.to_string()))
    }
}
