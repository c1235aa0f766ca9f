// Integration tests for matchx
use chrono::Utc;
use matchx::{
    Application, Cv, EmbedPipeline, EmbeddingProvider, EntityId, HybridRanker, IndexConfig,
    MatchStore, Posting, PostingFilter, PostingStatus, Query, RecommendationEngine, Vector,
    VectorIndex,
};
use std::sync::Arc;
use std::time::Duration;

fn posting(id: u64, title: &str, description: &str) -> Posting {
    Posting {
        id: EntityId(id),
        company: "Acme".to_string(),
        title: title.to_string(),
        description: description.to_string(),
        requirements: "motivated student".to_string(),
        location: "Berlin".to_string(),
        remote: false,
        paid: true,
        salary: Some(1500.0),
        status: PostingStatus::Published,
        created_at: Utc::now(),
        application_deadline: None,
    }
}

fn cv(id: u64, owner: u64, title: &str, skills: &[&str]) -> Cv {
    Cv {
        id: EntityId(id),
        owner: EntityId(owner),
        title: title.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        education: Vec::new(),
        experience: Vec::new(),
        is_default: true,
        created_at: Utc::now(),
    }
}

struct World {
    store: Arc<MatchStore>,
    provider: Arc<EmbeddingProvider>,
    pipeline: EmbedPipeline,
}

fn world() -> World {
    let store = MatchStore::with_defaults();
    let provider = Arc::new(EmbeddingProvider::hashing());
    let pipeline = EmbedPipeline::attach(&store, provider.clone());
    World {
        store,
        provider,
        pipeline,
    }
}

fn drain(w: &World) {
    assert!(w.pipeline.wait_idle(Duration::from_secs(10)));
}

// ==================== Embedding Lifecycle ====================

#[test]
fn test_create_embeds_in_background() {
    let w = world();
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust backend internship", "build services"));
            Ok(())
        })
        .unwrap();

    drain(&w);
    assert!(w.store.posting_index().contains(EntityId(1)));

    let expected = w
        .provider
        .embed(
            &posting(1, "rust backend internship", "build services").search_text(),
            None,
        )
        .unwrap();
    assert_eq!(w.store.posting_index().get(EntityId(1)), Some(expected));
}

#[test]
fn test_semantic_edit_changes_vector_metadata_edit_does_not() {
    let w = world();
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust internship", "build services"));
            Ok(())
        })
        .unwrap();
    drain(&w);
    let before = w.store.posting_index().get(EntityId(1)).unwrap();

    // Metadata-only edit: nothing gets marked stale
    let mut p = posting(1, "rust internship", "build services");
    p.location = "Munich".to_string();
    p.salary = Some(2500.0);
    w.store
        .transaction(|tx| {
            tx.upsert_posting(p);
            Ok(())
        })
        .unwrap();
    assert!(!w
        .store
        .is_reembed_pending((matchx::EntityKind::Posting, EntityId(1))));
    assert_eq!(w.store.posting_index().get(EntityId(1)), Some(before.clone()));

    // Semantic edit: vector changes
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust internship", "maintain data pipelines"));
            Ok(())
        })
        .unwrap();
    drain(&w);
    assert_ne!(w.store.posting_index().get(EntityId(1)), Some(before));
}

// ==================== Search ====================

#[test]
fn test_search_ranks_by_relevance() {
    let w = world();
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust backend internship", "rust services"));
            tx.upsert_posting(posting(2, "frontend react internship", "web interfaces"));
            tx.upsert_posting(posting(3, "marketing internship", "social campaigns"));
            Ok(())
        })
        .unwrap();
    drain(&w);

    let ranker = HybridRanker::new(w.provider.clone());
    let hits = ranker
        .search(
            &w.store,
            &PostingFilter::published(),
            Query::Text("rust backend services"),
            2,
            None,
        )
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entity_id, EntityId(1));
    assert!(hits[0].score >= hits[1].score);
    assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
}

#[test]
fn test_search_with_structured_filter() {
    let w = world();
    let mut remote = posting(1, "rust internship", "build services");
    remote.remote = true;
    let onsite = posting(2, "rust internship", "build services");
    w.store
        .transaction(|tx| {
            tx.upsert_posting(remote);
            tx.upsert_posting(onsite);
            Ok(())
        })
        .unwrap();
    drain(&w);

    let ranker = HybridRanker::new(w.provider.clone());
    let filter = PostingFilter {
        remote: Some(true),
        ..PostingFilter::published()
    };
    let hits = ranker
        .search(&w.store, &filter, Query::Text("rust"), 10, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity_id, EntityId(1));
}

#[test]
fn test_search_empty_store_is_empty_not_error() {
    let w = world();
    let ranker = HybridRanker::new(w.provider.clone());
    let hits = ranker
        .search(
            &w.store,
            &PostingFilter::published(),
            Query::Text("anything"),
            10,
            None,
        )
        .unwrap();
    assert!(hits.is_empty());
}

// ==================== Recommendations ====================

#[test]
fn test_student_recommendations_use_default_cv() {
    let w = world();
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust backend internship", "rust and sql"));
            tx.upsert_posting(posting(2, "marketing internship", "social campaigns"));
            tx.upsert_cv(cv(10, 100, "backend developer", &["rust", "sql"]));
            Ok(())
        })
        .unwrap();
    drain(&w);

    let engine = RecommendationEngine::new(w.store.clone());
    let recs = engine
        .recommend_for_student(EntityId(100), 10, None)
        .unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].posting.id, EntityId(1));

    // A student the engine has never seen is an error, not an empty list
    assert!(engine.recommend_for_student(EntityId(999), 10, None).is_err());
}

#[test]
fn test_candidate_pool_is_applicants_only() {
    let w = world();
    w.store
        .transaction(|tx| {
            tx.upsert_posting(posting(1, "rust backend internship", "rust services"));
            tx.upsert_cv(cv(10, 100, "java developer", &["java"]));
            tx.upsert_cv(cv(20, 200, "rust developer", &["rust"]));
            Ok(())
        })
        .unwrap();
    // Only student 100 applies, with the worse-matching CV
    w.store
        .transaction(|tx| {
            tx.upsert_application(Application {
                id: EntityId(500),
                posting: EntityId(1),
                cv: EntityId(10),
                applicant: EntityId(100),
                submitted_at: Utc::now(),
            })
        })
        .unwrap();
    drain(&w);

    let engine = RecommendationEngine::new(w.store.clone());
    let candidates = engine.recommend_candidates(EntityId(1), 10, None).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].applicant, EntityId(100));
    assert_eq!(candidates[0].cv, EntityId(10));
}

// ==================== Index Behavior ====================

#[test]
fn test_index_scales_past_exact_threshold() {
    let index = VectorIndex::new(IndexConfig {
        dim: 4,
        exact_threshold: 100,
        ..IndexConfig::default()
    });
    for i in 0..500u64 {
        let x = i as f32;
        index
            .upsert(EntityId(i), Vector::new(vec![x, x * 0.5, 0.0, 1.0]))
            .unwrap();
    }

    let results = index
        .nearest(&Vector::new(vec![42.0, 21.0, 0.0, 1.0]), 5, None, None)
        .unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].0, EntityId(42));
}

// ==================== Persistence ====================

#[test]
fn test_snapshot_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("matchx.snapshot");

    {
        let w = world();
        w.store
            .transaction(|tx| {
                tx.upsert_posting(posting(1, "rust backend internship", "rust services"));
                tx.upsert_cv(cv(10, 100, "backend developer", &["rust"]));
                Ok(())
            })
            .unwrap();
        drain(&w);
        matchx::snapshot::save(&w.store, &path).unwrap();
    }

    // Simulates restart
    let (store, pending) = matchx::snapshot::load(&path, IndexConfig::default()).unwrap();
    assert!(pending.is_empty());
    assert_eq!(store.posting_count(), 1);
    assert_eq!(store.cv_count(), 1);
    assert!(store.posting_index().contains(EntityId(1)));

    // The restored state answers queries without any re-embedding
    let engine = RecommendationEngine::new(store);
    let recs = engine
        .recommend_for_student(EntityId(100), 10, None)
        .unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].posting.id, EntityId(1));
}
