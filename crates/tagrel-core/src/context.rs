//! ContextGraph: for every tag, the tags it co-occurs with anywhere in the
//! corpus, weighted by the number of objects carrying both.
//!
//! Used only for antonym context similarity (Jaccard overlap of neighbor
//! sets). Building it is quadratic in tags-per-object and linear in object
//! count, which makes it the most expensive precomputation; the engine keeps
//! it in a [`ContextGraphCache`] and rebuilds only after invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::index::{TagId, TagIndex};

/// Which objects contribute to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextGraphOptions {
    /// When set, objects with fewer tags than this are skipped.
    pub min_tags_per_object: Option<usize>,
    pub parallel: bool,
}

impl Default for ContextGraphOptions {
    fn default() -> Self {
        Self {
            min_tags_per_object: Some(3),
            parallel: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ContextGraph {
    /// `tag -> (neighbor -> co-occurrence count)`, indexed by `TagId`.
    weights: Vec<AHashMap<TagId, u32>>,
    /// Neighbor sets as bitmaps over `TagId`s, for fast Jaccard.
    neighbors: Vec<RoaringBitmap>,
    empty: RoaringBitmap,
}

type Weights = Vec<AHashMap<TagId, u32>>;

impl ContextGraph {
    pub fn build(index: &TagIndex, options: ContextGraphOptions) -> Self {
        let started = Instant::now();
        let tag_count = index.len();
        let keep = |tags: &&[TagId]| match options.min_tags_per_object {
            Some(min) => tags.len() >= min,
            None => true,
        };

        let weights: Weights = if options.parallel {
            let objects: Vec<&[TagId]> = index.objects().filter(keep).collect();
            objects
                .par_iter()
                .fold(
                    || vec![AHashMap::new(); tag_count],
                    |mut acc, tags| {
                        count_object(&mut acc, tags);
                        acc
                    },
                )
                .reduce(|| vec![AHashMap::new(); tag_count], merge_weights)
        } else {
            let mut acc = vec![AHashMap::new(); tag_count];
            for tags in index.objects().filter(keep) {
                count_object(&mut acc, tags);
            }
            acc
        };

        let neighbors: Vec<RoaringBitmap> = weights
            .iter()
            .map(|row| row.keys().map(|id| id.raw()).collect())
            .collect();

        let edges: usize = weights.iter().map(|row| row.len()).sum();
        tracing::info!(
            tags = tag_count,
            directed_edges = edges,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built context graph"
        );

        Self {
            weights,
            neighbors,
            empty: RoaringBitmap::new(),
        }
    }

    /// Co-occurrence count of `a` with `b`; symmetric.
    pub fn weight(&self, a: TagId, b: TagId) -> u32 {
        self.weights
            .get(a.raw() as usize)
            .and_then(|row| row.get(&b))
            .copied()
            .unwrap_or(0)
    }

    pub fn neighbors(&self, tag: TagId) -> &RoaringBitmap {
        self.neighbors.get(tag.raw() as usize).unwrap_or(&self.empty)
    }

    /// Jaccard overlap of the two neighbor sets; 0 if either is empty.
    pub fn context_similarity(&self, a: TagId, b: TagId) -> f64 {
        let na = self.neighbors(a);
        let nb = self.neighbors(b);
        if na.is_empty() || nb.is_empty() {
            return 0.0;
        }
        let union = na.union_len(nb);
        if union == 0 {
            return 0.0;
        }
        na.intersection_len(nb) as f64 / union as f64
    }
}

fn count_object(acc: &mut Weights, tags: &[TagId]) {
    for (i, &a) in tags.iter().enumerate() {
        for &b in &tags[i + 1..] {
            *acc[a.raw() as usize].entry(b).or_insert(0) += 1;
            *acc[b.raw() as usize].entry(a).or_insert(0) += 1;
        }
    }
}

fn merge_weights(mut left: Weights, right: Weights) -> Weights {
    for (row, other) in left.iter_mut().zip(right) {
        if row.is_empty() {
            *row = other;
            continue;
        }
        for (tag, count) in other {
            *row.entry(tag).or_insert(0) += count;
        }
    }
    left
}

/// Lazily built, shared [`ContextGraph`].
///
/// Each generation owns a [`OnceLock`]: the first caller builds, concurrent
/// callers block on the cell (not on the slot lock) and then share the result.
/// The slot lock is only held to look up or replace the cell, never across the
/// build, so a build that fans out on a rayon pool cannot wait on itself.
/// [`ContextGraphCache::invalidate`] bumps the generation so the next access
/// rebuilds.
#[derive(Debug, Default)]
pub struct ContextGraphCache {
    generation: AtomicU64,
    slot: Mutex<(u64, Arc<OnceLock<Arc<ContextGraph>>>)>,
}

impl ContextGraphCache {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_built(&self) -> bool {
        let slot = self.slot.lock();
        slot.0 == self.generation() && slot.1.get().is_some()
    }

    /// The current graph, running `build` if this generation has none yet.
    /// `build` may fan out on a thread pool; call this from outside that pool.
    pub fn get_or_build(&self, build: impl FnOnce() -> ContextGraph) -> Arc<ContextGraph> {
        let cell = self.current_cell();
        Arc::clone(cell.get_or_init(|| Arc::new(build())))
    }

    fn current_cell(&self) -> Arc<OnceLock<Arc<ContextGraph>>> {
        let mut slot = self.slot.lock();
        let gen = self.generation();
        if slot.0 != gen {
            *slot = (gen, Arc::new(OnceLock::new()));
        }
        Arc::clone(&slot.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TagIndex {
        TagIndex::build(vec![
            vec!["a", "b", "c"],
            vec!["a", "b", "d"],
            vec!["x", "y"],
        ])
    }

    #[test]
    fn counts_once_per_object_and_is_symmetric() {
        let index = index();
        let graph = ContextGraph::build(
            &index,
            ContextGraphOptions {
                min_tags_per_object: None,
                parallel: false,
            },
        );
        let id = |t: &str| index.id_of(t).unwrap();
        assert_eq!(graph.weight(id("a"), id("b")), 2);
        assert_eq!(graph.weight(id("b"), id("a")), 2);
        assert_eq!(graph.weight(id("c"), id("d")), 0);
        assert_eq!(graph.weight(id("x"), id("y")), 1);
        assert_eq!(graph.neighbors(id("a")).len(), 3);
    }

    #[test]
    fn sparse_filter_skips_small_objects() {
        let index = index();
        let graph = ContextGraph::build(&index, ContextGraphOptions::default());
        let id = |t: &str| index.id_of(t).unwrap();
        assert_eq!(graph.weight(id("x"), id("y")), 0);
        assert!(graph.neighbors(id("x")).is_empty());
        assert_eq!(graph.weight(id("a"), id("b")), 2);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let index = index();
        let seq = ContextGraph::build(
            &index,
            ContextGraphOptions {
                min_tags_per_object: None,
                parallel: false,
            },
        );
        let par = ContextGraph::build(
            &index,
            ContextGraphOptions {
                min_tags_per_object: None,
                parallel: true,
            },
        );
        for a in index.tag_ids() {
            for b in index.tag_ids() {
                assert_eq!(seq.weight(a, b), par.weight(a, b));
            }
        }
    }

    #[test]
    fn jaccard_similarity() {
        let index = index();
        let graph = ContextGraph::build(
            &index,
            ContextGraphOptions {
                min_tags_per_object: None,
                parallel: false,
            },
        );
        let id = |t: &str| index.id_of(t).unwrap();
        // c: {a, b}, d: {a, b}
        assert_eq!(graph.context_similarity(id("c"), id("d")), 1.0);
        // a: {b, c, d}, x: {y}
        assert_eq!(graph.context_similarity(id("a"), id("x")), 0.0);
    }

    #[test]
    fn cache_builds_once_per_generation() {
        let index = index();
        let cache = ContextGraphCache::default();
        assert!(!cache.is_built());
        let build = || ContextGraph::build(&index, ContextGraphOptions::default());
        let first = cache.get_or_build(build);
        let second = cache.get_or_build(build);
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        assert!(!cache.is_built());
        let third = cache.get_or_build(build);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let index = index();
        let cache = ContextGraphCache::default();
        let builds = AtomicU64::new(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();

        let graphs: Vec<Arc<ContextGraph>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        cache.get_or_build(|| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            pool.install(|| ContextGraph::build(&index, ContextGraphOptions::default()))
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(graphs.iter().all(|g| Arc::ptr_eq(g, &graphs[0])));
        assert!(cache.is_built());
    }
}
