/// Errors from encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("record is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A document that had to be a table (or list of tables) is not one.
    #[error("expected a table, found {0}")]
    NotATable(String),

    /// Two columns disagree on whether a dotted prefix is a value or a table.
    #[error("conflicting column {0:?}")]
    ConflictingColumn(String),

    #[error("unknown format: {0:?}")]
    UnknownFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
