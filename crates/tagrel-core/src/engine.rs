//! RelationInferenceEngine: ranked synonym/antonym candidates for review.
//!
//! One `infer` call:
//! 1. restricts the search to the most frequent tags (or `force_tag` plus the
//!    next most frequent ones),
//! 2. reads a fresh confirmed-relation snapshot,
//! 3. enumerates atomic tag pairs that are neither confirmed nor denied,
//! 4. scores them on the worker pool,
//! 5. appends the contextual antonym pass when antonyms are requested,
//! 6. drops anything already returned by an earlier call,
//! 7. sorts by `(confidence desc, min count desc)`,
//! 8. remembers and returns the requested page.
//!
//! Pages are memoized per request for the configured TTL; a hit skips all of
//! the above, so results inside the TTL window can be stale with respect to
//! the relation store.

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{BoundedSet, TtlCache};
use crate::config::EngineConfig;
use crate::context::{ContextGraph, ContextGraphCache, ContextGraphOptions};
use crate::dispatch::{ScoringPool, TagPair};
use crate::error::{Result, TagRelError};
use crate::index::{TagId, TagIndex};
use crate::relations::{RelationSnapshot, RelationSource, RelationType};
use crate::scorer::{
    score_antonym, score_contextual_antonyms, score_synonym, CandidateSuggestion, SuggestionKey,
};
use crate::tag::normalize_tag;

/// Validated arguments of [`RelationInferenceEngine::infer`]; also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferRequest {
    pub limit: usize,
    pub offset: usize,
    /// `None` asks for both synonyms and antonyms.
    pub relation_type: Option<RelationType>,
    pub force_tag: Option<String>,
}

impl InferRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            relation_type: None,
            force_tag: None,
        }
    }

    pub fn with_type(mut self, relation_type: RelationType) -> Self {
        self.relation_type = Some(relation_type);
        self
    }

    pub fn with_force_tag(mut self, tag: &str) -> Self {
        self.force_tag = normalize_tag(tag);
        self
    }

    /// Boundary validation for untyped callers (CLI, HTTP).
    pub fn parse(
        limit: i64,
        offset: i64,
        relation_type: Option<&str>,
        force_tag: Option<&str>,
    ) -> Result<Self> {
        let limit = usize::try_from(limit)
            .map_err(|_| TagRelError::InvalidRequest(format!("limit must be >= 0, got {limit}")))?;
        let offset = usize::try_from(offset).map_err(|_| {
            TagRelError::InvalidRequest(format!("offset must be >= 0, got {offset}"))
        })?;
        let relation_type = match relation_type.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<RelationType>()? {
                RelationType::Unrelated => {
                    return Err(TagRelError::InvalidRequest(
                        "only synonym and antonym candidates can be inferred".to_string(),
                    ))
                }
                t => Some(t),
            },
        };
        Ok(Self {
            limit,
            offset,
            relation_type,
            force_tag: force_tag.and_then(normalize_tag),
        })
    }

    fn wants(&self, relation_type: RelationType) -> bool {
        self.relation_type.map_or(true, |t| t == relation_type)
    }
}

#[derive(Debug)]
struct EngineState {
    config: EngineConfig,
    pool: Arc<ScoringPool>,
    /// Bumped on every invalidation so in-flight calls don't repopulate the cache.
    generation: u64,
    pages: TtlCache<InferRequest, Vec<CandidateSuggestion>>,
    seen: BoundedSet<SuggestionKey>,
}

pub struct RelationInferenceEngine {
    index: Arc<TagIndex>,
    source: Arc<dyn RelationSource>,
    context: ContextGraphCache,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for RelationInferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationInferenceEngine")
            .field("tags", &self.index.len())
            .field("objects", &self.index.total_objects())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RelationInferenceEngine {
    pub fn new(
        index: Arc<TagIndex>,
        source: Arc<dyn RelationSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ScoringPool::new(&config)?);
        let state = EngineState {
            pages: TtlCache::new(config.cache_ttl(), config.cache_capacity),
            seen: BoundedSet::new(config.seen_capacity),
            generation: 0,
            pool,
            config,
        };
        Ok(Self {
            index,
            source,
            context: ContextGraphCache::default(),
            state: Mutex::new(state),
        })
    }

    pub fn index(&self) -> &Arc<TagIndex> {
        &self.index
    }

    pub fn config(&self) -> EngineConfig {
        self.state.lock().config.clone()
    }

    /// Swap the configuration. Invalidates the page cache and the context graph.
    pub fn set_config(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        let pool = Arc::new(ScoringPool::new(&config)?);
        let mut state = self.state.lock();
        state.pages = TtlCache::new(config.cache_ttl(), config.cache_capacity);
        state.seen.resize(config.seen_capacity);
        state.pool = pool;
        state.config = config;
        state.generation += 1;
        self.context.invalidate();
        tracing::info!("engine configuration replaced; caches invalidated");
        Ok(())
    }

    /// Drop cached pages and the cached context graph.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.pages.clear();
        state.generation += 1;
        self.context.invalidate();
    }

    /// Forget which suggestions were already handed out.
    pub fn clear_seen(&self) {
        self.state.lock().seen.clear();
    }

    pub fn cached_pages(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn seen_count(&self) -> usize {
        self.state.lock().seen.len()
    }

    /// Build the context graph now instead of on the first antonym request.
    pub fn context_graph(&self) -> Arc<ContextGraph> {
        let (config, pool) = self.settings();
        self.context_graph_with(&config, &pool)
    }

    pub fn infer(&self, request: &InferRequest) -> Result<Vec<CandidateSuggestion>> {
        let now = Instant::now();
        let (config, pool, generation) = {
            let mut state = self.state.lock();
            if let Some(page) = state.pages.get(request, now) {
                tracing::debug!(?request, "inference served from cache");
                return Ok(page);
            }
            (
                state.config.clone(),
                Arc::clone(&state.pool),
                state.generation,
            )
        };

        let snapshot = RelationSnapshot::load(self.source.as_ref())?;
        let mut candidates = self.candidates(request, &config, &pool, &snapshot);

        let mut state = self.state.lock();
        candidates.retain(|s| !state.seen.contains(&s.dedup_key()));
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.min_count().cmp(&a.min_count()))
        });

        let page: Vec<CandidateSuggestion> = candidates
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        for s in &page {
            state.seen.insert(s.dedup_key());
        }
        if state.generation == generation {
            state.pages.insert(request.clone(), page.clone(), now);
        }
        Ok(page)
    }

    /// Review-queue variant: over-fetches, then drops pairs that the relation
    /// store already knows in any form (unrelated, or any stored relation in a
    /// valid direction, including contextual rows keyed by a compound `tag1`).
    pub fn review_queue(&self, request: &InferRequest) -> Result<Vec<CandidateSuggestion>> {
        let widened = InferRequest {
            limit: request.limit.saturating_mul(2),
            ..request.clone()
        };
        let suggestions = self.infer(&widened)?;
        let snapshot = RelationSnapshot::load(self.source.as_ref())?;

        let mut out = Vec::with_capacity(request.limit);
        for s in suggestions {
            if out.len() >= request.limit {
                break;
            }
            if snapshot.is_unrelated(&s.tag1, &s.tag2) {
                continue;
            }
            if self.source.get_relation(&s.tag1, &s.tag2)?.is_some() {
                continue;
            }
            out.push(s);
        }
        Ok(out)
    }

    fn settings(&self) -> (EngineConfig, Arc<ScoringPool>) {
        let state = self.state.lock();
        (state.config.clone(), Arc::clone(&state.pool))
    }

    fn context_graph_with(&self, config: &EngineConfig, pool: &ScoringPool) -> Arc<ContextGraph> {
        let options = ContextGraphOptions {
            min_tags_per_object: config
                .sparse_object_filter
                .then_some(config.min_tags_per_object),
            parallel: config.parallel,
        };
        // The once-cell wait happens on the calling thread; only the build
        // itself runs on the pool.
        self.context
            .get_or_build(|| pool.install(|| ContextGraph::build(&self.index, options)))
    }

    /// The analyzed tag window, or `None` when `force_tag` is unknown.
    fn window(&self, force_tag: Option<&str>, size: usize) -> Option<Vec<TagId>> {
        let ranked = self.index.tags_by_frequency();
        match force_tag {
            None => Some(ranked.into_iter().take(size).collect()),
            Some(tag) => {
                let forced = self.index.id_of(tag)?;
                let mut window = Vec::with_capacity(size);
                window.push(forced);
                window.extend(
                    ranked
                        .into_iter()
                        .filter(|&t| t != forced)
                        .take(size.saturating_sub(1)),
                );
                Some(window)
            }
        }
    }

    fn candidates(
        &self,
        request: &InferRequest,
        config: &EngineConfig,
        pool: &ScoringPool,
        snapshot: &RelationSnapshot,
    ) -> Vec<CandidateSuggestion> {
        let started = Instant::now();
        let index = self.index.as_ref();
        if index.is_empty() {
            return Vec::new();
        }
        let Some(window) = self.window(request.force_tag.as_deref(), config.max_tags_analyzed)
        else {
            tracing::debug!(force_tag = ?request.force_tag, "force_tag not in index");
            return Vec::new();
        };
        let forced = request.force_tag.as_deref().and_then(|t| index.id_of(t));

        let pairs = candidate_pairs(index, &window, forced, snapshot);
        let mut out = Vec::new();
        let mut failed_chunks = 0;

        if request.wants(RelationType::Synonym) {
            let min = config.min_synonym_frequency;
            let outcome = pool.map_pairs(&pairs, |a, b| score_synonym(index, a, b, min));
            failed_chunks += outcome.failed_chunks;
            out.extend(outcome.results);
        }

        if request.wants(RelationType::Antonym) {
            let graph = self.context_graph_with(config, pool);
            let min = config.min_antonym_frequency;
            let outcome = pool.map_pairs(&pairs, |a, b| score_antonym(index, &graph, a, b, min));
            failed_chunks += outcome.failed_chunks;
            out.extend(outcome.results);

            // NOTE: keyed as (context, t1, t2) against stored (tag1, tag2, context)
            // rows; a contextual relation persisted under its compound tag1 is
            // only caught by `review_queue`.
            out.extend(score_contextual_antonyms(
                index,
                &window,
                forced,
                |context, t1, t2| {
                    snapshot.has_key(context, t1, t2) || snapshot.has_key(context, t2, t1)
                },
            ));
        }

        tracing::info!(
            window = window.len(),
            pairs = pairs.len(),
            verdicts = out.len(),
            failed_chunks,
            workers = pool.workers(),
            parallel = pool.is_parallel(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scored relation candidates"
        );
        out
    }
}

/// Unordered atomic pairs of the window, lexicographically ordered inside
/// each pair, minus pairs already confirmed (without context) or denied.
/// With `forced`, only pairs involving that tag.
fn candidate_pairs(
    index: &TagIndex,
    window: &[TagId],
    forced: Option<TagId>,
    snapshot: &RelationSnapshot,
) -> Vec<TagPair> {
    let blocked = blocked_pairs(index, snapshot);
    let atomic: Vec<TagId> = window
        .iter()
        .copied()
        .filter(|&t| !index.is_compound(t))
        .collect();

    let ordered = |a: TagId, b: TagId| {
        if index.name(a) <= index.name(b) {
            (a, b)
        } else {
            (b, a)
        }
    };
    let allowed = |pair: &TagPair| !blocked.contains(&unordered(pair.0, pair.1));

    match forced {
        Some(f) if index.is_compound(f) => Vec::new(),
        Some(f) => atomic
            .iter()
            .filter(|&&t| t != f)
            .map(|&t| ordered(f, t))
            .filter(allowed)
            .collect(),
        None => {
            let mut pairs = Vec::with_capacity(atomic.len() * atomic.len().saturating_sub(1) / 2);
            for (i, &a) in atomic.iter().enumerate() {
                for &b in &atomic[i + 1..] {
                    let pair = ordered(a, b);
                    if allowed(&pair) {
                        pairs.push(pair);
                    }
                }
            }
            pairs
        }
    }
}

fn unordered(a: TagId, b: TagId) -> TagPair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn blocked_pairs(index: &TagIndex, snapshot: &RelationSnapshot) -> AHashSet<TagPair> {
    let plain = snapshot
        .existing
        .iter()
        .filter(|(_, _, context)| context.is_empty())
        .map(|(a, b, _)| (a, b));
    let denied = snapshot.unrelated.iter().map(|(a, b)| (a, b));
    plain
        .chain(denied)
        .filter_map(|(a, b)| Some(unordered(index.id_of(a)?, index.id_of(b)?)))
        .collect()
}
