use sheets_codec::CodecError;
use sheets_refs::RefError;
use sheets_repo::RepoError;
use sheets_store::StoreError;
use sheets_template::TemplateError;

/// Errors surfaced by sheet and repository operations.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    /// Missing or invalid sheet configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    /// A ref that does not resolve.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// The ancestry check before a merge failed.
    #[error("merge error: {0}")]
    Merge(String),

    /// A field value violates its declared type, enum or sort.
    #[error("invalid value for field {field:?}: {reason}")]
    Validation { field: String, reason: String },

    /// No path could be generated for a record.
    #[error("could not generate any path for record: {0}")]
    Unrenderable(String),

    /// The object database produced a diff that could not be parsed.
    #[error("malformed diff output: {0}")]
    MalformedDiff(String),

    #[error("template error: {0}")]
    Template(TemplateError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("repository error: {0}")]
    Repo(RepoError),
}

impl SheetError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<TemplateError> for SheetError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Unrenderable(_) | TemplateError::EmptyPath => {
                Self::Unrenderable(err.to_string())
            }
            TemplateError::Store(inner) => Self::Store(inner),
            other => Self::Template(other),
        }
    }
}

impl From<RepoError> for SheetError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::InvalidRef(reference) => Self::InvalidRef(reference),
            RepoError::Ref(inner) => Self::Ref(inner),
            RepoError::Store(inner) => Self::Store(inner),
            other => Self::Repo(other),
        }
    }
}

pub type SheetResult<T> = Result<T, SheetError>;
