//! Hybrid ranking: structured filtering first, vector similarity second.
//!
//! The filter runs before any embedding work so that an empty candidate
//! pool costs no model call. Entities without an embedding are excluded
//! from the pool rather than treated as errors.

use crate::filter::PostingFilter;
use crate::store::MatchStore;
use matchx_core::{EntityId, Result, Vector};
use matchx_embed::EmbeddingProvider;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// One ranked hit: raw metric distance plus the bounded relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub entity_id: EntityId,
    pub distance: f32,
    pub score: f32,
}

/// Map a non-negative distance to a relevance score in (0, 1].
///
/// Monotonically decreasing, so score order always agrees with distance
/// order. Distance 0 scores exactly 1.
#[inline]
pub fn relevance_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// The query text or a precomputed vector
pub enum Query<'a> {
    Text(&'a str),
    Vector(&'a Vector),
}

/// Ranks postings by combining the structured [`PostingFilter`] with
/// vector similarity against the posting index.
pub struct HybridRanker {
    provider: Arc<EmbeddingProvider>,
}

impl HybridRanker {
    pub fn new(provider: Arc<EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Rank the postings matching `filter` against the query, best first.
    ///
    /// Order: ascending distance, ties broken by ascending id. A filter
    /// matching nothing (or nothing with an embedding) yields `Ok(vec![])`
    /// without touching the model.
    pub fn search(
        &self,
        store: &MatchStore,
        filter: &PostingFilter,
        query: Query<'_>,
        top_k: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<RankedResult>> {
        let index = store.posting_index();
        let pool: HashSet<EntityId> = store
            .filter_postings(filter)
            .into_iter()
            .filter(|id| index.contains(*id))
            .collect();
        if pool.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedded;
        let query_vector = match query {
            Query::Vector(v) => v,
            Query::Text(text) => {
                embedded = self.provider.embed(text, deadline)?;
                &embedded
            }
        };

        let hits = index.nearest(query_vector, top_k, Some(&pool), deadline)?;
        Ok(hits
            .into_iter()
            .map(|(entity_id, distance)| RankedResult {
                entity_id,
                distance,
                score: relevance_score(distance),
            })
            .collect())
    }
}
