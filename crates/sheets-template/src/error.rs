use sheets_store::StoreError;

use crate::expr::ExprError;

/// Errors from compiling, rendering or querying a path template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("expression {0} not closed with }}}}")]
    Unclosed(String),

    #[error("path segment {0:?} holds more than one expression")]
    MultipleExpressions(String),

    #[error("invalid expression {expr:?}: {source}")]
    InvalidExpression { expr: String, source: ExprError },

    #[error("failed to evaluate {expr:?}: {source}")]
    Evaluation { expr: String, source: ExprError },

    #[error("unable to render path component {0:?}")]
    Unrenderable(String),

    #[error("could not generate any path for record")]
    EmptyPath,

    #[error("value {value:?} of {component:?} would span several path segments")]
    InvalidValue { component: String, value: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type TemplateResult<T> = Result<T, TemplateError>;
