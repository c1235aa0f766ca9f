//! # matchx
//!
//! A semantic matching engine for an internship marketplace: deterministic
//! text embeddings, staleness-tracked re-embedding, HNSW similarity search
//! with exact-scan fallback, hybrid filter+vector ranking, and two-sided
//! recommendations (postings for students, candidates for postings).
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! matchx --http-port 8080 --data-dir ./data
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use matchx::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = MatchStore::with_defaults();
//! let provider = Arc::new(EmbeddingProvider::hashing());
//! let pipeline = EmbedPipeline::attach(&store, provider.clone());
//!
//! store
//!     .transaction(|tx| {
//!         tx.upsert_posting(Posting {
//!             id: EntityId(1),
//!             company: "Acme".to_string(),
//!             title: "Rust backend internship".to_string(),
//!             description: "Build network services".to_string(),
//!             requirements: "Rust, SQL".to_string(),
//!             location: "Berlin".to_string(),
//!             remote: false,
//!             paid: true,
//!             salary: Some(1500.0),
//!             status: PostingStatus::Published,
//!             created_at: chrono::Utc::now(),
//!             application_deadline: None,
//!         });
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! // Embedding runs in the background after the transaction commits
//! pipeline.wait_idle(Duration::from_secs(5));
//!
//! let ranker = HybridRanker::new(provider);
//! let hits = ranker
//!     .search(&store, &PostingFilter::published(), Query::Text("rust"), 10, None)
//!     .unwrap();
//! assert_eq!(hits[0].entity_id, EntityId(1));
//! ```
//!
//! ## Crate Structure
//!
//! - `matchx-core` - vectors, distance metrics, HNSW index with exact-scan
//!   fallback
//! - `matchx-embed` - embedding provider, fingerprints, staleness tracking,
//!   background job system
//! - `matchx-engine` - entity store, hybrid ranker, recommendations,
//!   snapshot persistence
//! - `matchx-api` - REST API

// Re-export core types
pub use matchx_core::{EntityId, Error, HnswIndex, IndexConfig, Metric, Result, Vector, VectorIndex};

// Re-export the embedding pipeline
pub use matchx_embed::{
    fingerprint, needs_reembed, BackgroundJob, EmbeddingProvider, HashingEncoder, JobSystem,
    PendingSet, TextEncoder, EMBEDDING_DIM,
};

// Re-export the engine
pub use matchx_engine::{
    relevance_score, snapshot, Application, CandidateMatch, Cv, Education, EmbedPipeline,
    EmbeddingStatus, EntityKind, Experience, HybridRanker, MatchStore, Posting, PostingFilter,
    PostingMatch, PostingStatus, Query, RankedResult, RecommendationEngine,
};

// Re-export API
pub use matchx_api::{AppState, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AppState, CandidateMatch, Cv, EmbedPipeline, EmbeddingProvider, EntityId, Error,
        HybridRanker, IndexConfig, MatchStore, Metric, Posting, PostingFilter, PostingMatch,
        PostingStatus, Query, RankedResult, RecommendationEngine, RestApi, Result, Vector,
        EMBEDDING_DIM,
    };
}
