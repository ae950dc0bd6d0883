use tagrel_core::TagRelError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("relation {0} not found")]
    NotFound(u64),

    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("relation file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to replace relation file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl From<StoreError> for TagRelError {
    fn from(err: StoreError) -> Self {
        TagRelError::RelationSource(err.to_string())
    }
}
