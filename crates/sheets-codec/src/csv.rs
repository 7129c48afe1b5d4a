//! CSV to record conversion.
//!
//! Column names with dots (`address.city`) address nested tables. On read
//! every cell is a string and empty cells are skipped; on write nested tables
//! are flattened back into dotted columns.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CodecError, CodecResult};
use crate::json::to_json;
use crate::record::{render_scalar, Record, Value};

/// Insert `value` at a dotted path, creating intermediate tables.
pub fn insert_dotted(record: &mut Record, column: &str, value: Value) -> CodecResult<()> {
    let mut parts: Vec<&str> = column.split('.').collect();
    let Some(leaf) = parts.pop() else {
        return Err(CodecError::ConflictingColumn(column.to_string()));
    };
    let mut table = record;
    for part in parts {
        let entry = table
            .entry(part.to_string())
            .or_insert_with(|| Value::Table(Record::new()));
        table = match entry {
            Value::Table(inner) => inner,
            _ => return Err(CodecError::ConflictingColumn(column.to_string())),
        };
    }
    if table.get(leaf).is_some_and(Value::is_table) {
        return Err(CodecError::ConflictingColumn(column.to_string()));
    }
    table.insert(leaf.to_string(), value);
    Ok(())
}

/// Flatten nested tables into dotted keys. Arrays become JSON text.
pub fn flatten(record: &Record) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into("", record, &mut out);
    out
}

fn flatten_into(prefix: &str, table: &Record, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let column = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(inner) => flatten_into(&column, inner, out),
            Value::Array(_) => {
                out.insert(column, to_json(value).to_string());
            }
            scalar => {
                out.insert(column, render_scalar(scalar).unwrap_or_default());
            }
        }
    }
}

/// Decode CSV with a header row into records.
pub fn read_records(bytes: &[u8]) -> CodecResult<Vec<Record>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::Headers)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (column, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() || column.is_empty() {
                continue;
            }
            insert_dotted(&mut record, column, Value::String(cell.to_string()))?;
        }
        records.push(record);
    }
    Ok(records)
}

/// Encode records as CSV. The header is the sorted union of every
/// record's flattened columns.
pub fn write_records(records: &[Record]) -> CodecResult<Vec<u8>> {
    let rows: Vec<_> = records.iter().map(flatten).collect();
    let header: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(header.iter().map(|column| {
            row.get(*column).map(String::as_str).unwrap_or("")
        }))?;
    }
    writer
        .into_inner()
        .map_err(|e| CodecError::Io(e.into_error()))
}
