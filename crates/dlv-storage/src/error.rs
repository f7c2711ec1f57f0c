use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown view `{0}`")]
    UnknownView(String),

    #[error("invalid query on view `{view}`: {reason}")]
    InvalidQuery { view: String, reason: String },

    #[error("document body must be a JSON object")]
    NotAnObject,

    #[error("document `_id` must be a non-empty string")]
    BadId,
}
