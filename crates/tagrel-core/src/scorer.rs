//! PairScorer: pure verdict functions for a single tag pair.
//!
//! Each function returns `None` ("no verdict") for any pair that fails a
//! precondition or threshold; none of them can fail. All thresholds below are
//! tuned policy values and must not be rounded or merged.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::context::ContextGraph;
use crate::index::{TagId, TagIndex};
use crate::relations::RelationType;
use crate::tag::compound_tag;

// -----------------------------------------------------------------------------
// Synonym thresholds
// -----------------------------------------------------------------------------

pub const SYNONYM_MIN_COOCCURRENCE_RATE: f64 = 0.7;
pub const SYNONYM_MIN_FREQUENCY_RATIO: f64 = 0.4;
pub const SYNONYM_BIDIRECTIONAL_RATE: f64 = 0.9;
pub const SYNONYM_BIDIRECTIONAL_RATIO: f64 = 0.8;
pub const SYNONYM_OCCURRENCE_EXPONENT: f64 = 0.5;

// -----------------------------------------------------------------------------
// Global antonym thresholds
// -----------------------------------------------------------------------------

pub const ANTONYM_MAX_COOCCURRENCE_RATE: f64 = 0.08;
pub const ANTONYM_MIN_FREQUENCY_RATIO: f64 = 0.25;
pub const ANTONYM_MIN_CONTEXT_SIMILARITY: f64 = 0.35;
pub const ANTONYM_MIN_COVERAGE: f64 = 0.008;
pub const ANTONYM_OCCURRENCE_EXPONENT: f64 = 0.3;
pub const ANTONYM_CONFIDENCE_DAMPING: f64 = 0.7;

/// Occurrence weights saturate once the rarer tag reaches this count.
pub const OCCURRENCE_SATURATION: f64 = 1000.0;

// -----------------------------------------------------------------------------
// Contextual antonym thresholds
// -----------------------------------------------------------------------------

pub const CONTEXT_TAG_MIN_FREQUENCY: u64 = 1000;
pub const MAX_CONTEXT_TAGS: usize = 50;
/// Minimum overlap with the context for a tag to be considered inside it.
pub const CONTEXT_MEMBER_MIN_OVERLAP: u64 = 50;
pub const CONTEXT_PAIR_MIN_OVERLAP: u64 = 100;
/// Both tags must overlap the context by strictly more than this.
pub const CONTEXT_STRICT_OVERLAP: u64 = 80;
pub const CONTEXT_MAX_COOCCURRENCE_RATE: f64 = 0.05;
pub const CONTEXT_OVERLAP_SATURATION: f64 = 150.0;
pub const CONTEXT_CONFIDENCE_DAMPING: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedDirection {
    Bidirectional,
    OneWay,
    None,
}

/// A scored relation candidate. Lives for one inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    pub tag1: String,
    pub tag2: String,
    pub tag1_count: u64,
    pub tag2_count: u64,
    pub relation_type: RelationType,
    /// Percentage in `[0, 100]`, one decimal.
    pub confidence: f64,
    pub context_tags: String,
    pub cooccurrence: u64,
    /// Human-readable derivation of the verdict.
    pub calculation: String,
    pub suggested_direction: SuggestedDirection,
}

/// Identity used to avoid re-suggesting a candidate across calls.
pub type SuggestionKey = (String, String, String, RelationType);

impl CandidateSuggestion {
    pub fn dedup_key(&self) -> SuggestionKey {
        (
            self.tag1.clone(),
            self.tag2.clone(),
            self.context_tags.clone(),
            self.relation_type,
        )
    }

    pub fn min_count(&self) -> u64 {
        self.tag1_count.min(self.tag2_count)
    }
}

/// Shared statistics of a tag pair.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PairStats {
    cooccur: u64,
    min_count: u64,
    max_count: u64,
    rate: f64,
    ratio: f64,
}

impl PairStats {
    fn new(freq_a: u64, freq_b: u64, cooccur: u64) -> Option<Self> {
        let min_count = freq_a.min(freq_b);
        let max_count = freq_a.max(freq_b);
        if min_count == 0 {
            return None;
        }
        Some(Self {
            cooccur,
            min_count,
            max_count,
            rate: cooccur as f64 / min_count as f64,
            ratio: min_count as f64 / max_count as f64,
        })
    }

    fn occurrence_weight(&self, exponent: f64) -> f64 {
        (self.min_count as f64 / OCCURRENCE_SATURATION)
            .powf(exponent)
            .min(1.0)
    }
}

fn percent(confidence: f64) -> f64 {
    (confidence * 1000.0).round() / 10.0
}

/// Lower-frequency tag first; ties keep the given order.
fn ordered(index: &TagIndex, a: TagId, b: TagId) -> (TagId, TagId) {
    if index.frequency_of(b) < index.frequency_of(a) {
        (b, a)
    } else {
        (a, b)
    }
}

/// Synonym verdict for `(a, b)`.
pub fn score_synonym(
    index: &TagIndex,
    a: TagId,
    b: TagId,
    min_frequency: u64,
) -> Option<CandidateSuggestion> {
    let freq_a = index.frequency_of(a);
    let freq_b = index.frequency_of(b);
    if freq_a < min_frequency || freq_b < min_frequency {
        return None;
    }
    let stats = PairStats::new(freq_a, freq_b, index.cooccurrence(a, b))?;

    let (confidence, direction) = if stats.cooccur == stats.min_count
        && stats.cooccur == stats.max_count
    {
        (1.0, SuggestedDirection::Bidirectional)
    } else if stats.cooccur == stats.min_count {
        (1.0, SuggestedDirection::OneWay)
    } else if stats.rate > SYNONYM_MIN_COOCCURRENCE_RATE
        && stats.ratio > SYNONYM_MIN_FREQUENCY_RATIO
    {
        let confidence =
            stats.rate * stats.ratio * stats.occurrence_weight(SYNONYM_OCCURRENCE_EXPONENT);
        let direction = if stats.rate > SYNONYM_BIDIRECTIONAL_RATE
            && stats.ratio > SYNONYM_BIDIRECTIONAL_RATIO
        {
            SuggestedDirection::Bidirectional
        } else {
            SuggestedDirection::OneWay
        };
        (confidence, direction)
    } else {
        return None;
    };

    let (first, second) = ordered(index, a, b);
    Some(CandidateSuggestion {
        tag1: index.name(first).to_string(),
        tag2: index.name(second).to_string(),
        tag1_count: index.frequency_of(first),
        tag2_count: index.frequency_of(second),
        relation_type: RelationType::Synonym,
        confidence: percent(confidence),
        context_tags: String::new(),
        cooccurrence: stats.cooccur,
        calculation: format!(
            "Co-occur: {}/{} ({:.1}%), Freq ratio: {:.2}",
            stats.cooccur,
            stats.min_count,
            stats.rate * 100.0,
            stats.ratio
        ),
        suggested_direction: direction,
    })
}

/// Global antonym verdict for `(a, b)`.
pub fn score_antonym(
    index: &TagIndex,
    context: &ContextGraph,
    a: TagId,
    b: TagId,
    min_frequency: u64,
) -> Option<CandidateSuggestion> {
    let freq_a = index.frequency_of(a);
    let freq_b = index.frequency_of(b);
    if freq_a < min_frequency || freq_b < min_frequency {
        return None;
    }
    let total = index.total_objects();
    if total == 0 {
        return None;
    }
    let stats = PairStats::new(freq_a, freq_b, index.cooccurrence(a, b))?;

    let similarity = context.context_similarity(a, b);
    let coverage = (freq_a + freq_b) as f64 / (2 * total) as f64;

    if !(stats.rate < ANTONYM_MAX_COOCCURRENCE_RATE
        && stats.ratio > ANTONYM_MIN_FREQUENCY_RATIO
        && similarity > ANTONYM_MIN_CONTEXT_SIMILARITY
        && coverage > ANTONYM_MIN_COVERAGE)
    {
        return None;
    }

    let confidence = (1.0 - stats.rate)
        * stats.ratio
        * similarity
        * stats.occurrence_weight(ANTONYM_OCCURRENCE_EXPONENT)
        * ANTONYM_CONFIDENCE_DAMPING;

    let (first, second) = ordered(index, a, b);
    Some(CandidateSuggestion {
        tag1: index.name(first).to_string(),
        tag2: index.name(second).to_string(),
        tag1_count: index.frequency_of(first),
        tag2_count: index.frequency_of(second),
        relation_type: RelationType::Antonym,
        confidence: percent(confidence),
        context_tags: String::new(),
        cooccurrence: stats.cooccur,
        calculation: format!(
            "Co-occur: {}/{} ({:.1}%), Context sim: {:.2}",
            stats.cooccur,
            stats.min_count,
            stats.rate * 100.0,
            similarity
        ),
        suggested_direction: SuggestedDirection::None,
    })
}

/// A tag's posting set restricted to one context.
struct ContextMember {
    tag: TagId,
    objects: RoaringBitmap,
    overlap: u64,
}

/// Antonyms that only hold inside a high-frequency context tag.
///
/// `tags` is the analyzed window (most frequent first). Context tags are the
/// first [`MAX_CONTEXT_TAGS`] atomic tags of the window with frequency
/// ≥ [`CONTEXT_TAG_MIN_FREQUENCY`]. `force` keeps only results involving
/// that tag as the context or as either member of the pair.
/// `is_known(context, t1, t2)` skips pairs already present in the relation table.
pub fn score_contextual_antonyms(
    index: &TagIndex,
    tags: &[TagId],
    force: Option<TagId>,
    is_known: impl Fn(&str, &str, &str) -> bool,
) -> Vec<CandidateSuggestion> {
    let mut out = Vec::new();

    let contexts: Vec<TagId> = tags
        .iter()
        .copied()
        .filter(|&t| index.frequency_of(t) >= CONTEXT_TAG_MIN_FREQUENCY && !index.is_compound(t))
        .take(MAX_CONTEXT_TAGS)
        .collect();

    for context in contexts {
        let context_objects = index.postings_of(context);
        let mut members: Vec<ContextMember> = tags
            .iter()
            .copied()
            .filter(|&t| t != context && !index.is_compound(t))
            .filter_map(|tag| {
                let objects = index.postings_of(tag) & context_objects;
                let overlap = objects.len();
                (overlap >= CONTEXT_MEMBER_MIN_OVERLAP).then_some(ContextMember {
                    tag,
                    objects,
                    overlap,
                })
            })
            .collect();
        members.sort_by(|x, y| index.name(x.tag).cmp(index.name(y.tag)));

        let context_name = index.name(context);
        for (i, m1) in members.iter().enumerate() {
            for m2 in &members[i + 1..] {
                if let Some(f) = force {
                    if m1.tag != f && m2.tag != f && context != f {
                        continue;
                    }
                }
                let (t1, t2) = (index.name(m1.tag), index.name(m2.tag));
                if is_known(context_name, t1, t2) {
                    continue;
                }

                let min_overlap = m1.overlap.min(m2.overlap);
                if min_overlap < CONTEXT_PAIR_MIN_OVERLAP {
                    continue;
                }
                let cooccur = m1.objects.intersection_len(&m2.objects);
                let rate = cooccur as f64 / min_overlap as f64;

                if rate < CONTEXT_MAX_COOCCURRENCE_RATE
                    && m1.overlap > CONTEXT_STRICT_OVERLAP
                    && m2.overlap > CONTEXT_STRICT_OVERLAP
                {
                    let confidence = (1.0 - rate)
                        * (min_overlap as f64 / CONTEXT_OVERLAP_SATURATION).min(1.0)
                        * CONTEXT_CONFIDENCE_DAMPING;
                    out.push(CandidateSuggestion {
                        tag1: compound_tag(context_name, t1),
                        tag2: t2.to_string(),
                        tag1_count: m1.overlap,
                        tag2_count: m2.overlap,
                        relation_type: RelationType::Antonym,
                        confidence: percent(confidence),
                        context_tags: context_name.to_string(),
                        cooccurrence: cooccur,
                        calculation: format!(
                            "Contextual: {cooccur}/{min_overlap} in '{context_name}' context"
                        ),
                        suggested_direction: SuggestedDirection::None,
                    });
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextGraphOptions;

    fn corpus(groups: &[(usize, &[&str])]) -> TagIndex {
        let mut objects: Vec<Vec<String>> = Vec::new();
        for (count, tags) in groups {
            for _ in 0..*count {
                objects.push(tags.iter().map(|t| t.to_string()).collect());
            }
        }
        TagIndex::build(objects)
    }

    fn id(index: &TagIndex, tag: &str) -> TagId {
        index.id_of(tag).unwrap()
    }

    #[test]
    fn tiny_subset_example() {
        let index = TagIndex::build(vec![vec!["a", "b"], vec!["a", "b"], vec!["a"]]);
        let s = score_synonym(&index, id(&index, "a"), id(&index, "b"), 0).unwrap();
        assert_eq!(s.confidence, 100.0);
        assert_eq!(s.suggested_direction, SuggestedDirection::OneWay);
        assert_eq!((s.tag1.as_str(), s.tag2.as_str()), ("b", "a"));
        assert_eq!(s.cooccurrence, 2);
        assert_eq!((s.tag1_count, s.tag2_count), (2, 3));
    }

    #[test]
    fn identical_postings_are_bidirectional() {
        let index = corpus(&[(12, &["sofa", "couch"])]);
        let s = score_synonym(&index, id(&index, "sofa"), id(&index, "couch"), 10).unwrap();
        assert_eq!(s.confidence, 100.0);
        assert_eq!(s.suggested_direction, SuggestedDirection::Bidirectional);
        // Equal frequencies keep the given order.
        assert_eq!(s.tag1, "sofa");
    }

    #[test]
    fn below_minimum_frequency_has_no_verdict() {
        let index = corpus(&[(9, &["sofa", "couch"])]);
        assert!(score_synonym(&index, id(&index, "sofa"), id(&index, "couch"), 10).is_none());
    }

    #[test]
    fn high_overlap_uses_weighted_confidence() {
        // a: 100, b: 100, together on 95.
        let index = corpus(&[(95, &["a", "b"]), (5, &["a"]), (5, &["b"])]);
        let s = score_synonym(&index, id(&index, "a"), id(&index, "b"), 10).unwrap();
        // 0.95 * 1.0 * sqrt(100 / 1000)
        let expected = percent(0.95 * (0.1f64).sqrt());
        assert_eq!(s.confidence, expected);
        assert_eq!(s.suggested_direction, SuggestedDirection::Bidirectional);
        assert_eq!(s.calculation, "Co-occur: 95/100 (95.0%), Freq ratio: 1.00");
    }

    #[test]
    fn low_overlap_has_no_synonym_verdict() {
        let index = corpus(&[(50, &["a", "b"]), (50, &["a"]), (50, &["b"])]);
        assert!(score_synonym(&index, id(&index, "a"), id(&index, "b"), 10).is_none());
    }

    fn antonym_corpus() -> TagIndex {
        // "day" and "night" never meet but share the same neighbours.
        corpus(&[
            (60, &["day", "sky", "city", "street"]),
            (60, &["night", "sky", "city", "street"]),
            (30, &["sky", "city", "street"]),
        ])
    }

    #[test]
    fn disjoint_tags_in_shared_context_are_antonyms() {
        let index = antonym_corpus();
        let graph = ContextGraph::build(&index, ContextGraphOptions::default());
        let s = score_antonym(&index, &graph, id(&index, "day"), id(&index, "night"), 50).unwrap();
        assert_eq!(s.relation_type, RelationType::Antonym);
        assert_eq!(s.suggested_direction, SuggestedDirection::None);
        assert_eq!(s.cooccurrence, 0);
        assert!(s.confidence > 0.0 && s.confidence <= 100.0);
    }

    #[test]
    fn disjoint_contexts_are_not_antonyms() {
        let index = corpus(&[
            (60, &["day", "sun", "beach"]),
            (60, &["night", "moon", "club"]),
        ]);
        let graph = ContextGraph::build(&index, ContextGraphOptions::default());
        let (d, n) = (id(&index, "day"), id(&index, "night"));
        assert_eq!(graph.context_similarity(d, n), 0.0);
        assert!(score_antonym(&index, &graph, d, n, 50).is_none());
    }

    #[test]
    fn contextual_antonyms_use_compound_tag1() {
        // Inside "animal", "cat" and "dog" never meet; outside they do.
        let index = corpus(&[
            (500, &["animal", "cat"]),
            (500, &["animal", "dog"]),
            (300, &["cat", "dog"]),
        ]);
        let window = index.tags_by_frequency();
        let found = score_contextual_antonyms(&index, &window, None, |_, _, _| false);
        let hit = found
            .iter()
            .find(|s| s.context_tags == "animal")
            .expect("contextual antonym inside animal");
        assert_eq!(hit.tag1, "animal cat");
        assert_eq!(hit.tag2, "dog");
        assert_eq!(hit.cooccurrence, 0);
        assert_eq!(hit.confidence, 50.0);
        assert_eq!(hit.calculation, "Contextual: 0/500 in 'animal' context");
    }

    #[test]
    fn contextual_pass_respects_known_pairs() {
        let index = corpus(&[
            (500, &["animal", "cat"]),
            (500, &["animal", "dog"]),
        ]);
        let window = index.tags_by_frequency();
        let found = score_contextual_antonyms(&index, &window, None, |c, t1, t2| {
            c == "animal" && t1 == "cat" && t2 == "dog"
        });
        assert!(found.iter().all(|s| s.context_tags != "animal"));
    }

    #[test]
    fn contextual_force_matches_either_member() {
        let index = corpus(&[
            (500, &["animal", "bird"]),
            (500, &["animal", "cat"]),
            (500, &["animal", "dog"]),
        ]);
        let window = index.tags_by_frequency();
        let dog = id(&index, "dog");
        let found = score_contextual_antonyms(&index, &window, Some(dog), |_, _, _| false);

        // "dog" sorts after both partners and is still kept.
        assert!(found.iter().any(|s| s.tag1 == "animal cat" && s.tag2 == "dog"));
        assert!(found.iter().any(|s| s.tag1 == "animal bird" && s.tag2 == "dog"));
        assert!(found.iter().all(|s| s.tag2 == "dog"));
    }
}
