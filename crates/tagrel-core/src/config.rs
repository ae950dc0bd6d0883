//! Tunable settings for relation inference and suggestion ranking.
//!
//! Every field is independently adjustable. Changing any engine setting at
//! runtime goes through [`crate::RelationInferenceEngine::set_config`], which
//! invalidates both the result cache and the cached context graph.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagRelError};

/// Settings for [`crate::RelationInferenceEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the most-frequent-tags window searched per inference call.
    pub max_tags_analyzed: usize,
    /// Both tags need at least this many occurrences for a synonym verdict.
    pub min_synonym_frequency: u64,
    /// Both tags need at least this many occurrences for an antonym verdict.
    pub min_antonym_frequency: u64,
    /// Score pairs on a worker pool instead of the calling thread.
    pub parallel: bool,
    pub worker_count: usize,
    pub cache_ttl_secs: u64,
    /// Maximum number of cached result pages; the oldest is evicted first.
    pub cache_capacity: usize,
    /// Maximum number of remembered dedup keys; the oldest is evicted first.
    pub seen_capacity: usize,
    /// Skip objects with fewer than `min_tags_per_object` tags when building
    /// the context graph.
    pub sparse_object_filter: bool,
    pub min_tags_per_object: usize,
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tags_analyzed == 0 {
            return Err(TagRelError::InvalidConfig(
                "max_tags_analyzed must be at least 1".to_string(),
            ));
        }
        if self.parallel && self.worker_count == 0 {
            return Err(TagRelError::InvalidConfig(
                "worker_count must be at least 1 when parallel scoring is enabled".to_string(),
            ));
        }
        if self.sparse_object_filter && self.min_tags_per_object < 2 {
            return Err(TagRelError::InvalidConfig(
                "min_tags_per_object below 2 cannot contribute any co-occurrence".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tags_analyzed: 1000,
            min_synonym_frequency: 10,
            min_antonym_frequency: 50,
            parallel: true,
            worker_count: default_worker_count(),
            cache_ttl_secs: 30,
            cache_capacity: 20,
            seen_capacity: 100_000,
            sparse_object_filter: true,
            min_tags_per_object: 3,
        }
    }
}

/// Available parallelism minus one (the calling thread), never below one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Settings for [`crate::SuggestionRanker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Co-occurrence weight.
    pub alpha: f64,
    /// Rarity weight.
    pub beta: f64,
    /// Contradiction penalty weight.
    pub gamma: f64,
    /// Candidates rarer than this are dropped unless they are confirmed synonyms.
    pub min_tag_occurrences: u64,
    pub strong_correlation_threshold: f64,
    pub strong_correlation_boost: f64,
    pub synonym_boost: f64,
    pub parallel: bool,
}

impl RankerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("strong_correlation_boost", self.strong_correlation_boost),
            ("synonym_boost", self.synonym_boost),
        ] {
            if !value.is_finite() {
                return Err(TagRelError::InvalidConfig(format!(
                    "{name} must be a finite number"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.strong_correlation_threshold) {
            return Err(TagRelError::InvalidConfig(
                "strong_correlation_threshold must lie in [0, 1]".to_string(),
            ));
        }
        if self.synonym_boost < self.strong_correlation_boost + 1.0 {
            return Err(TagRelError::InvalidConfig(
                "synonym_boost must be at least strong_correlation_boost + 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.7,
            gamma: 1.5,
            min_tag_occurrences: 10,
            strong_correlation_threshold: 0.99,
            strong_correlation_boost: 9999.0,
            synonym_boost: 10000.0,
            parallel: true,
        }
    }
}

/// Combined settings file (`{"engine": {...}, "ranker": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagrelConfig {
    pub engine: EngineConfig,
    pub ranker: RankerConfig,
}

impl TagrelConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.ranker.validate()
    }
}
