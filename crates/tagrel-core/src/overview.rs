//! Per-pair counts for presenting a relation to a reviewer.

use serde::{Deserialize, Serialize};

use crate::index::TagIndex;
use crate::tag::{compound_parts, normalize_tag};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationOverview {
    pub tag1: String,
    pub tag2: String,
    pub tag1_count: u64,
    pub tag2_count: u64,
    pub cooccurrence: u64,
    pub tag1_only: u64,
    pub tag2_only: u64,
    /// `cooccurrence / min(counts) * 100`, one decimal; 0 when a side is empty.
    pub overlap_percentage: f64,
}

/// Current counts for a (possibly compound) pair, given its stored co-occurrence.
pub fn relation_overview(
    index: &TagIndex,
    tag1: &str,
    tag2: &str,
    cooccurrence: u64,
) -> RelationOverview {
    let (tag1_count, tag2_count) = tag_counts(index, tag1, tag2);
    let min = tag1_count.min(tag2_count);
    let overlap_percentage = if min == 0 {
        0.0
    } else {
        (cooccurrence as f64 / min as f64 * 1000.0).round() / 10.0
    };
    RelationOverview {
        tag1: tag1.to_string(),
        tag2: tag2.to_string(),
        tag1_count,
        tag2_count,
        cooccurrence,
        tag1_only: tag1_count.saturating_sub(cooccurrence),
        tag2_only: tag2_count.saturating_sub(cooccurrence),
        overlap_percentage,
    }
}

/// Display counts of both sides of a pair.
pub fn tag_counts(index: &TagIndex, tag1: &str, tag2: &str) -> (u64, u64) {
    (index.display_count(tag1), index.display_count(tag2))
}

/// Objects carrying every atomic part of both (possibly compound) tags.
pub fn pair_cooccurrence(index: &TagIndex, tag1: &str, tag2: &str) -> u64 {
    let (Some(tag1), Some(tag2)) = (normalize_tag(tag1), normalize_tag(tag2)) else {
        return 0;
    };
    let mut parts = compound_parts(&tag1).chain(compound_parts(&tag2));
    let Some(first) = parts.next() else {
        return 0;
    };
    let mut objects = index.postings(first).clone();
    for part in parts {
        objects &= index.postings(part);
    }
    objects.len()
}
