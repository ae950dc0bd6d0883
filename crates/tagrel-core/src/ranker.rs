//! SuggestionRanker: next-tag suggestions for a partially tagged object.
//!
//! Scores every known tag against the input set by co-occurrence, rarity and
//! contradiction with the inputs. Confirmed antonyms are removed outright;
//! confirmed synonyms and near-certain correlations are pinned to the top.

use std::sync::Arc;

use ahash::AHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::RankerConfig;
use crate::error::Result;
use crate::index::{TagId, TagIndex};
use crate::relations::{RelationSnapshot, RelationSource};
use crate::tag::normalize_tag;

/// Below this frequency the contradiction penalty is scaled by `freq / 50`.
pub const PENALTY_DAMPING_FREQUENCY: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSuggestion {
    pub tag: String,
    pub score: f64,
    pub rarity: f64,
    pub cooccurrence: f64,
    pub penalty: f64,
    pub max_correlation: f64,
    pub is_synonym: bool,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankResult {
    pub matched_documents: u64,
    pub suggestions: Vec<TagSuggestion>,
    pub has_more: bool,
}

pub struct SuggestionRanker {
    index: Arc<TagIndex>,
    source: Arc<dyn RelationSource>,
    config: RankerConfig,
}

impl std::fmt::Debug for SuggestionRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionRanker")
            .field("tags", &self.index.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

impl SuggestionRanker {
    pub fn new(
        index: Arc<TagIndex>,
        source: Arc<dyn RelationSource>,
        config: RankerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            source,
            config,
        })
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn rank<S: AsRef<str>>(
        &self,
        input_tags: &[S],
        top_n: usize,
        offset: usize,
    ) -> Result<RankResult> {
        let total = self.index.total_objects();
        let mut inputs: Vec<String> = Vec::with_capacity(input_tags.len());
        for tag in input_tags.iter().filter_map(|t| normalize_tag(t.as_ref())) {
            if !inputs.contains(&tag) {
                inputs.push(tag);
            }
        }
        if inputs.is_empty() {
            return Ok(RankResult {
                matched_documents: total,
                suggestions: Vec::new(),
                has_more: false,
            });
        }

        // The last tag may still be being typed.
        if inputs
            .last()
            .is_some_and(|last| self.index.postings(last).is_empty())
        {
            inputs.pop();
        }

        let snapshot = RelationSnapshot::load(self.source.as_ref())?;
        let boosted = snapshot.synonyms_of(&inputs);
        let input_ids: Vec<TagId> = inputs.iter().filter_map(|t| self.index.id_of(t)).collect();

        let candidates: Vec<TagId> = self
            .index
            .tag_ids()
            .filter(|&id| !inputs.iter().any(|t| t == self.index.name(id)))
            .collect();

        let score = |id: TagId| self.score(id, &inputs, &input_ids, &boosted, &snapshot, total);
        let mut suggestions: Vec<TagSuggestion> = if self.config.parallel {
            candidates.par_iter().filter_map(|&id| score(id)).collect()
        } else {
            candidates.iter().filter_map(|&id| score(id)).collect()
        };

        suggestions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.is_synonym.cmp(&a.is_synonym))
                .then_with(|| a.tag.cmp(&b.tag))
        });
        let has_more = offset.saturating_add(top_n) < suggestions.len();
        let suggestions = suggestions.into_iter().skip(offset).take(top_n).collect();

        tracing::debug!(inputs = inputs.len(), has_more, "ranked tag suggestions");
        Ok(RankResult {
            matched_documents: total,
            suggestions,
            has_more,
        })
    }

    fn score(
        &self,
        candidate: TagId,
        inputs: &[String],
        input_ids: &[TagId],
        boosted: &AHashSet<String>,
        snapshot: &RelationSnapshot,
        total: u64,
    ) -> Option<TagSuggestion> {
        let index = self.index.as_ref();
        let cfg = &self.config;
        let name = index.name(candidate);

        if snapshot.is_antonym_of_any(name, inputs) {
            return None;
        }
        let is_synonym = boosted.contains(name);
        let count = index.frequency_of(candidate);
        if count < cfg.min_tag_occurrences && !is_synonym {
            return None;
        }

        let postings = index.postings_of(candidate);
        let mut cooccurrence = 0u64;
        let mut penalty = 0.0;
        let mut max_correlation = 0.0f64;
        for &t in input_ids {
            let input_postings = index.postings_of(t);
            let shared = postings.intersection_len(input_postings);
            cooccurrence += shared;
            if input_postings.is_empty() {
                continue;
            }
            let rate = shared as f64 / input_postings.len() as f64;
            max_correlation = max_correlation.max(rate);
            if postings.is_empty() {
                continue;
            }
            penalty += if count >= PENALTY_DAMPING_FREQUENCY {
                1.0 - rate
            } else {
                (1.0 - rate) * (count as f64 / PENALTY_DAMPING_FREQUENCY as f64)
            };
        }

        let cooccurrence_norm = cooccurrence as f64 / inputs.len().max(1) as f64;
        let rarity = ((total + 1) as f64 / (count + 1) as f64).ln();
        let rarity_boosted = rarity * (1.0 + rarity.ln_1p());

        let mut score =
            cfg.alpha * cooccurrence_norm + cfg.beta * rarity_boosted - cfg.gamma * penalty;
        if max_correlation >= cfg.strong_correlation_threshold {
            score = cfg.strong_correlation_boost + max_correlation;
        }
        if is_synonym {
            score = cfg.synonym_boost;
        }

        Some(TagSuggestion {
            tag: name.to_string(),
            score: round4(score),
            rarity: round4(rarity_boosted),
            cooccurrence: round4(cooccurrence_norm),
            penalty: round4(penalty),
            max_correlation: round4(max_correlation),
            is_synonym,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::{ConfirmedRelation, RelationType};
    use approx::assert_relative_eq;

    struct Fixed(Vec<ConfirmedRelation>);

    impl RelationSource for Fixed {
        fn relations(&self) -> Result<Vec<ConfirmedRelation>> {
            Ok(self.0.clone())
        }
    }

    fn ranker(relations: Vec<ConfirmedRelation>) -> SuggestionRanker {
        let mut objects: Vec<Vec<&str>> = Vec::new();
        objects.extend(std::iter::repeat(vec!["dog", "grass", "outdoor"]).take(40));
        objects.extend(std::iter::repeat(vec!["dog", "sofa", "indoor"]).take(30));
        objects.extend(std::iter::repeat(vec!["cat", "sofa", "indoor"]).take(30));
        objects.extend(std::iter::repeat(vec!["puppy", "dog"]).take(12));
        objects.extend(std::iter::repeat(vec!["kitten"]).take(3));
        let config = RankerConfig {
            parallel: false,
            ..RankerConfig::default()
        };
        SuggestionRanker::new(
            Arc::new(TagIndex::build(objects)),
            Arc::new(Fixed(relations)),
            config,
        )
        .unwrap()
    }

    fn tags(result: &RankResult) -> Vec<&str> {
        result.suggestions.iter().map(|s| s.tag.as_str()).collect()
    }

    #[test]
    fn empty_input_returns_total() {
        let r = ranker(vec![]);
        let result = r.rank::<&str>(&[], 10, 0).unwrap();
        assert_eq!(result.matched_documents, 115);
        assert!(result.suggestions.is_empty());
        assert!(!result.has_more);
    }

    #[test]
    fn incomplete_last_tag_is_ignored() {
        let r = ranker(vec![]);
        let typed = r.rank(&["sofa", "do"], 50, 0).unwrap();
        let settled = r.rank(&["sofa"], 50, 0).unwrap();
        assert_eq!(typed, settled);
    }

    #[test]
    fn inputs_are_never_suggested() {
        let r = ranker(vec![]);
        let result = r.rank(&["dog", "Sofa"], 50, 0).unwrap();
        assert!(!tags(&result).contains(&"dog"));
        assert!(!tags(&result).contains(&"sofa"));
    }

    #[test]
    fn strong_correlation_ranks_first() {
        let r = ranker(vec![]);
        let result = r.rank(&["cat"], 10, 0).unwrap();
        // Every cat object also has sofa and indoor.
        let top: Vec<&str> = tags(&result).into_iter().take(2).collect();
        assert_eq!(top, vec!["indoor", "sofa"]);
        assert_relative_eq!(result.suggestions[0].score, 10_000.0, epsilon = 1e-9);
        assert!(!result.suggestions[0].is_synonym);
    }

    #[test]
    fn confirmed_synonym_beats_everything_and_bypasses_rarity_floor() {
        let r = ranker(vec![ConfirmedRelation::new(
            "cat",
            "kitten",
            RelationType::Synonym,
        )]);
        // "kitten" occurs 3 times, below the rarity floor, and ties on score
        // with the fully correlated "indoor" and "sofa".
        let result = r.rank(&["cat"], 10, 0).unwrap();
        assert_eq!(tags(&result)[..3], ["kitten", "indoor", "sofa"]);
        assert!(result.suggestions[0].is_synonym);
        assert_eq!(result.suggestions[0].score, 10_000.0);
    }

    #[test]
    fn confirmed_antonym_is_filtered() {
        let r = ranker(vec![ConfirmedRelation::new(
            "outdoor",
            "indoor",
            RelationType::Antonym,
        )]);
        let result = r.rank(&["indoor"], 50, 0).unwrap();
        assert!(!tags(&result).contains(&"outdoor"));

        let baseline = ranker(vec![]).rank(&["indoor"], 50, 0).unwrap();
        assert!(tags(&baseline).contains(&"outdoor"));
    }

    #[test]
    fn rare_tags_are_dropped() {
        let mut objects = vec![vec!["rare", "dog"]];
        objects.extend(std::iter::repeat(vec!["dog", "grass"]).take(20));
        let r = SuggestionRanker::new(
            Arc::new(TagIndex::build(objects)),
            Arc::new(Fixed(vec![])),
            RankerConfig::default(),
        )
        .unwrap();
        let result = r.rank(&["dog"], 10, 0).unwrap();
        assert_eq!(tags(&result), vec!["grass"]);
    }

    #[test]
    fn pagination_reports_more() {
        let r = ranker(vec![]);
        let all = r.rank(&["dog"], 100, 0).unwrap();
        let first = r.rank(&["dog"], 2, 0).unwrap();
        let rest = r.rank(&["dog"], 100, 2).unwrap();
        assert!(first.has_more);
        assert!(!rest.has_more);
        let joined: Vec<&str> = tags(&first).into_iter().chain(tags(&rest)).collect();
        assert_eq!(joined, tags(&all));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let seq = ranker(vec![]);
        let par = SuggestionRanker::new(
            Arc::clone(&seq.index),
            Arc::new(Fixed(vec![])),
            RankerConfig::default(),
        )
        .unwrap();
        assert_eq!(
            seq.rank(&["dog", "indoor"], 20, 0).unwrap(),
            par.rank(&["dog", "indoor"], 20, 0).unwrap()
        );
    }
}
