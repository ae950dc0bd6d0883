use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagrel_core::{CandidateSuggestion, ConfirmedRelation, RelationType, SuggestedDirection};

/// One row of the relation table. Unique on `(tag1, tag2, context_tags)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRelation {
    pub id: u64,
    pub tag1: String,
    pub tag2: String,
    #[serde(default)]
    pub context_tags: String,
    pub relation_type: RelationType,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub tag1_count: u64,
    #[serde(default)]
    pub tag2_count: u64,
    pub bidirectional: bool,
    #[serde(default)]
    pub cooccurrence: u64,
    #[serde(default)]
    pub calculation: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl StoredRelation {
    /// `|cooccurrence / min(tag1_count, tag2_count) - 1|`; `None` when a count is 0.
    pub fn overlap_gap(&self) -> Option<f64> {
        let min = self.tag1_count.min(self.tag2_count);
        (min > 0).then(|| (self.cooccurrence as f64 / min as f64 - 1.0).abs())
    }

    pub fn to_confirmed(&self) -> ConfirmedRelation {
        ConfirmedRelation {
            tag1: self.tag1.clone(),
            tag2: self.tag2.clone(),
            context_tags: self.context_tags.clone(),
            relation_type: self.relation_type,
            bidirectional: self.bidirectional,
        }
    }
}

/// Fields written by [`crate::RelationStore::add_relation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelation {
    pub tag1: String,
    pub tag2: String,
    #[serde(default)]
    pub context_tags: String,
    pub relation_type: RelationType,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub tag1_count: u64,
    #[serde(default)]
    pub tag2_count: u64,
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    #[serde(default)]
    pub cooccurrence: u64,
    #[serde(default)]
    pub calculation: String,
}

fn default_true() -> bool {
    true
}

impl NewRelation {
    pub fn new(tag1: &str, tag2: &str, relation_type: RelationType) -> Self {
        Self {
            tag1: tag1.to_string(),
            tag2: tag2.to_string(),
            context_tags: String::new(),
            relation_type,
            confidence: 0.0,
            tag1_count: 0,
            tag2_count: 0,
            bidirectional: true,
            cooccurrence: 0,
            calculation: String::new(),
        }
    }
}

/// A reviewer accepting a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    #[serde(flatten)]
    pub relation: NewRelation,
    /// The reviewer chose the direction explicitly; keep `tag1 -> tag2` as given.
    #[serde(default)]
    pub user_swapped: bool,
}

impl ConfirmRequest {
    /// Accept a suggestion as proposed. Contextual antonyms carry their
    /// compound `tag1` into the stored row unchanged.
    pub fn from_suggestion(s: &CandidateSuggestion) -> Self {
        Self {
            relation: NewRelation {
                tag1: s.tag1.clone(),
                tag2: s.tag2.clone(),
                context_tags: s.context_tags.clone(),
                relation_type: s.relation_type,
                confidence: s.confidence,
                tag1_count: s.tag1_count,
                tag2_count: s.tag2_count,
                bidirectional: s.suggested_direction != SuggestedDirection::OneWay,
                cooccurrence: s.cooccurrence,
                calculation: s.calculation.clone(),
            },
            user_swapped: false,
        }
    }
}
