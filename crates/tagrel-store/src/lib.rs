//! Tagrel relation store: the human-reviewed relation table.
//!
//! Rows are created when a reviewer confirms or denies a suggestion and are
//! read back by the inference core through [`tagrel_core::RelationSource`].
//! The table lives in memory and is optionally mirrored to a JSON file.

pub mod error;
pub mod model;
pub mod query;
mod store;

pub use error::{Result, StoreError};
pub use model::{ConfirmRequest, NewRelation, StoredRelation};
pub use query::{ListQuery, RelationPage, RelationStats, SortBy};
pub use store::RelationStore;
