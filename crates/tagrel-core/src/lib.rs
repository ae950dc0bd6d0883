//! Tagrel core: tag relationship inference over a tagged-object corpus.
//!
//! Given many objects each carrying a set of tags, this crate
//!
//! - proposes **synonym** and **antonym** pairs for human review
//!   ([`RelationInferenceEngine`]), and
//! - ranks **next-tag suggestions** for a partially tagged object
//!   ([`SuggestionRanker`]).
//!
//! Both read co-occurrence statistics from an immutable [`TagIndex`] and the
//! human-confirmed relation table through [`RelationSource`].
//!
//! ## Module Organization
//!
//! - `index`: interned tags, Roaring posting sets, per-object tag sets
//! - `context`: tag neighbor graph used for antonym context similarity
//! - `scorer`: pure synonym / antonym verdicts for one pair
//! - `dispatch`: chunked parallel scoring on a dedicated rayon pool
//! - `engine`: paginated, cached, deduplicated inference
//! - `ranker`: next-tag suggestion scoring
//! - `relations`: confirmed relation views
//! - `overview`: display counts for a stored relation

pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod index;
pub mod overview;
pub mod ranker;
pub mod relations;
pub mod scorer;
pub mod tag;

pub use config::{EngineConfig, RankerConfig, TagrelConfig};
pub use context::{ContextGraph, ContextGraphCache, ContextGraphOptions};
pub use engine::{InferRequest, RelationInferenceEngine};
pub use error::{Result, TagRelError};
pub use index::{TagId, TagIndex, TagInterner};
pub use overview::{pair_cooccurrence, relation_overview, tag_counts, RelationOverview};
pub use ranker::{RankResult, SuggestionRanker, TagSuggestion};
pub use relations::{
    find_relation, ConfirmedRelation, RelationDirection, RelationMatch, RelationSnapshot,
    RelationSource, RelationType,
};
pub use scorer::{CandidateSuggestion, SuggestedDirection, SuggestionKey};
pub use tag::normalize_tag;
