//! Errors surfaced at the engine boundary.
//!
//! Missing data (empty corpus, unknown tag, unknown `force_tag`) is never an
//! error here: those cases produce empty results. Only malformed requests,
//! inconsistent configuration, and failures of external collaborators are
//! reported.

#[derive(Debug, thiserror::Error)]
pub enum TagRelError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown relation type `{0}` (expected synonym, antonym or unrelated)")]
    UnknownRelationType(String),

    #[error("relation source unavailable: {0}")]
    RelationSource(String),

    #[error("failed to build scoring worker pool: {0}")]
    WorkerPool(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = TagRelError> = std::result::Result<T, E>;
