use std::sync::Arc;

use parking_lot::RwLock;
use tagrel_core::{
    CandidateSuggestion, ConfirmedRelation, EngineConfig, InferRequest, RelationInferenceEngine,
    RelationSource, RelationType, Result, TagIndex,
};

#[derive(Default)]
struct SharedRelations(RwLock<Vec<ConfirmedRelation>>);

impl RelationSource for SharedRelations {
    fn relations(&self) -> Result<Vec<ConfirmedRelation>> {
        Ok(self.0.read().clone())
    }
}

fn repeat(objects: &mut Vec<Vec<&'static str>>, n: usize, tags: &[&'static str]) {
    objects.extend(std::iter::repeat(tags.to_vec()).take(n));
}

/// A corpus with every kind of verdict:
/// - `sofa`/`couch` always together (bidirectional synonym)
/// - `kitten` a strict subset of `cat` (one-way synonym)
/// - `day`/`night` never together but sharing neighbours (global antonym)
/// - `indoor`/`outdoor` disjoint only inside `photo` (contextual antonym)
fn corpus() -> Arc<TagIndex> {
    let mut objects = Vec::new();
    repeat(&mut objects, 60, &["sofa", "couch", "room"]);
    repeat(&mut objects, 40, &["kitten", "cat", "pet"]);
    repeat(&mut objects, 30, &["cat", "pet"]);
    repeat(&mut objects, 70, &["day", "sky", "street"]);
    repeat(&mut objects, 70, &["night", "sky", "street"]);
    repeat(&mut objects, 600, &["photo", "indoor"]);
    repeat(&mut objects, 600, &["photo", "outdoor"]);
    repeat(&mut objects, 200, &["indoor", "outdoor"]);
    Arc::new(TagIndex::build(objects))
}

fn engine(source: Arc<SharedRelations>, config: EngineConfig) -> RelationInferenceEngine {
    RelationInferenceEngine::new(corpus(), source, config).unwrap()
}

fn find<'a>(page: &'a [CandidateSuggestion], tag1: &str, tag2: &str) -> Option<&'a CandidateSuggestion> {
    page.iter().find(|s| s.tag1 == tag1 && s.tag2 == tag2)
}

#[test]
fn infer_finds_every_kind_of_relation() {
    let engine = engine(Arc::default(), EngineConfig::default());
    let page = engine.infer(&InferRequest::new(100, 0)).unwrap();

    let sofa = find(&page, "sofa", "couch").or_else(|| find(&page, "couch", "sofa"));
    assert_eq!(sofa.map(|s| s.confidence), Some(100.0));

    let kitten = find(&page, "kitten", "cat").expect("kitten -> cat");
    assert_eq!(kitten.relation_type, RelationType::Synonym);

    let day = find(&page, "day", "night").or_else(|| find(&page, "night", "day"));
    assert_eq!(day.map(|s| s.relation_type), Some(RelationType::Antonym));

    let contextual = page
        .iter()
        .find(|s| s.context_tags == "photo")
        .expect("contextual antonym inside photo");
    assert_eq!(contextual.tag1, "photo indoor");
    assert_eq!(contextual.tag2, "outdoor");

    for w in page.windows(2) {
        assert!(
            w[0].confidence > w[1].confidence
                || (w[0].confidence == w[1].confidence && w[0].min_count() >= w[1].min_count())
        );
    }
}

#[test]
fn relation_type_filter_applies() {
    let engine = engine(Arc::default(), EngineConfig::default());
    let antonyms = engine
        .infer(&InferRequest::new(100, 0).with_type(RelationType::Antonym))
        .unwrap();
    assert!(!antonyms.is_empty());
    assert!(antonyms.iter().all(|s| s.relation_type == RelationType::Antonym));
}

#[test]
fn pagination_never_repeats_within_engine_lifetime() {
    let engine = engine(Arc::default(), EngineConfig::default());
    let first = engine.infer(&InferRequest::new(5, 0)).unwrap();
    let second = engine.infer(&InferRequest::new(5, 5)).unwrap();
    for s in &second {
        assert!(first.iter().all(|f| f.dedup_key() != s.dedup_key()));
    }
}

#[test]
fn cache_hit_ignores_store_changes_until_invalidated() {
    let source = Arc::new(SharedRelations::default());
    let engine = engine(Arc::clone(&source), EngineConfig::default());
    let request = InferRequest::new(50, 0).with_type(RelationType::Synonym);

    let first = engine.infer(&request).unwrap();
    assert!(find(&first, "kitten", "cat").is_some());
    source
        .0
        .write()
        .push(ConfirmedRelation::new("kitten", "cat", RelationType::Synonym));
    assert_eq!(engine.infer(&request).unwrap(), first);

    engine.invalidate();
    engine.clear_seen();
    let refreshed = engine.infer(&request).unwrap();
    assert!(find(&refreshed, "kitten", "cat").is_none());
}

#[test]
fn zero_ttl_disables_memoization() {
    let config = EngineConfig {
        cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let engine = engine(Arc::default(), config);
    let request = InferRequest::new(2, 0);
    let first = engine.infer(&request).unwrap();
    let second = engine.infer(&request).unwrap();
    assert!(second.iter().all(|s| !first.contains(s)));
}

#[test]
fn sequential_and_parallel_engines_agree() {
    let seq = engine(
        Arc::default(),
        EngineConfig {
            parallel: false,
            ..EngineConfig::default()
        },
    );
    let par = engine(
        Arc::default(),
        EngineConfig {
            parallel: true,
            worker_count: 3,
            ..EngineConfig::default()
        },
    );
    let request = InferRequest::new(100, 0);
    assert_eq!(seq.infer(&request).unwrap(), par.infer(&request).unwrap());
}

#[test]
fn review_queue_drops_stored_contextual_relations() {
    let source = Arc::new(SharedRelations::default());
    source.0.write().push(
        ConfirmedRelation::new("photo indoor", "outdoor", RelationType::Antonym).with_context("photo"),
    );
    let engine = engine(Arc::clone(&source), EngineConfig::default());
    let request = InferRequest::new(50, 0).with_type(RelationType::Antonym);

    let queue = engine.review_queue(&request).unwrap();
    assert!(queue.iter().all(|s| s.tag1 != "photo indoor"));
}

#[test]
fn context_graph_is_built_once_and_shared() {
    let engine = engine(Arc::default(), EngineConfig::default());
    let a = engine.context_graph();
    let b = engine.context_graph();
    assert!(Arc::ptr_eq(&a, &b));
    engine.invalidate();
    let c = engine.context_graph();
    assert!(!Arc::ptr_eq(&a, &c));
}

fn two_workers_uncached() -> EngineConfig {
    EngineConfig {
        parallel: true,
        worker_count: 2,
        cache_ttl_secs: 0,
        ..EngineConfig::default()
    }
}

#[test]
fn concurrent_first_access_shares_one_graph() {
    let engine = engine(Arc::default(), two_workers_uncached());

    let graphs: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| engine.context_graph()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(graphs.len(), 8);
    assert!(graphs.iter().all(|g| Arc::ptr_eq(g, &graphs[0])));
    assert!(Arc::ptr_eq(&graphs[0], &engine.context_graph()));
}

#[test]
fn concurrent_infer_hands_out_each_suggestion_once() {
    let engine = engine(Arc::default(), two_workers_uncached());
    let request = InferRequest::new(2, 0);

    let (pages, graphs) = std::thread::scope(|scope| {
        let inferring: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| engine.infer(&request).unwrap()))
            .collect();
        let building: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| engine.context_graph()))
            .collect();
        let pages: Vec<Vec<CandidateSuggestion>> =
            inferring.into_iter().map(|h| h.join().unwrap()).collect();
        let graphs: Vec<_> = building.into_iter().map(|h| h.join().unwrap()).collect();
        (pages, graphs)
    });

    assert!(Arc::ptr_eq(&graphs[0], &graphs[1]));
    assert!(Arc::ptr_eq(&graphs[0], &engine.context_graph()));

    let keys: Vec<_> = pages.iter().flatten().map(|s| s.dedup_key()).collect();
    let unique: std::collections::HashSet<_> = keys.iter().cloned().collect();
    assert_eq!(keys.len(), unique.len());
    assert!(pages.iter().all(|p| p.len() <= 2));
    assert_eq!(engine.seen_count(), keys.len());
}
