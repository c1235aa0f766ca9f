//! # matchx Engine
//!
//! The matching engine: marketplace entities, transactional store with
//! deferred re-embedding, hybrid filter+similarity ranking, and the two
//! recommendation directions (postings for a student, candidates for a
//! posting). State persists through bincode snapshots.
//!
//! ## Example
//!
//! ```
//! use matchx_engine::{EmbedPipeline, HybridRanker, MatchStore, PostingFilter, Query};
//! use matchx_embed::EmbeddingProvider;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = MatchStore::with_defaults();
//! let provider = Arc::new(EmbeddingProvider::hashing());
//! let pipeline = EmbedPipeline::attach(&store, provider.clone());
//!
//! // ... write postings through store.transaction(..) ...
//! pipeline.wait_idle(Duration::from_secs(5));
//!
//! let ranker = HybridRanker::new(provider);
//! let hits = ranker
//!     .search(&store, &PostingFilter::published(), Query::Text("rust"), 10, None)
//!     .unwrap();
//! assert!(hits.is_empty());
//! ```

pub mod filter;
pub mod model;
pub mod pipeline;
pub mod ranker;
pub mod recommend;
pub mod snapshot;
pub mod store;

pub use filter::PostingFilter;
pub use model::{Application, Cv, Education, Experience, Posting, PostingStatus};
pub use pipeline::{EmbedPipeline, ReembedJob};
pub use ranker::{relevance_score, HybridRanker, Query, RankedResult};
pub use recommend::{CandidateMatch, PostingMatch, RecommendationEngine};
pub use store::{EmbeddingStatus, EntityKey, EntityKind, MatchStore, Transaction};
