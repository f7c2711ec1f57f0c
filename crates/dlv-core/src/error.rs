use thiserror::Error;

use crate::DocKind;

/// Per-document failures raised while mapping. The view engine isolates these
/// to the offending document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("project `{0}` is not of the form <project>@<customer>")]
    MalformedProject(String),

    #[error("invalid {kind} document: {reason}")]
    InvalidDocument { kind: DocKind, reason: String },
}
