use crate::{Error, HnswIndex, Result, Vector};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Opaque stable identifier for an embeddable entity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId(id)
    }
}

/// Distance metric for nearest-neighbor queries
///
/// A query runs under exactly one metric; metrics are never mixed within
/// one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Metric {
    /// Squared Euclidean distance
    #[default]
    SquaredL2,
    /// Cosine-equivalent ranking: 1 - inner product over normalized vectors
    Dot,
}

impl Metric {
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::SquaredL2 => crate::vector::l2_distance_sq(a, b),
            Metric::Dot => 1.0 - crate::vector::dot(a, b),
        }
    }
}

/// Tuning knobs for a vector index
///
/// `m`, `ef_construction` and `ef_search` control the HNSW graph; higher
/// values increase recall at the cost of memory and CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dim: usize,
    pub metric: Metric,
    /// HNSW graph degree
    pub m: usize,
    /// Search width during graph construction
    pub ef_construction: usize,
    /// Search width at query time
    pub ef_search: usize,
    /// Collections at or below this size are scanned exactly instead of
    /// building a graph
    pub exact_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            metric: Metric::SquaredL2,
            m: 16,
            ef_construction: 64,
            ef_search: 40,
            exact_threshold: 2000,
        }
    }
}

struct IndexState {
    /// Authoritative id -> vector mapping. BTreeMap keeps scans in id
    /// order, which makes tie-breaking deterministic for free.
    vectors: BTreeMap<EntityId, Vector>,
    hnsw: Option<HnswIndex>,
}

/// Stores per-entity vectors and answers top-k nearest-neighbor queries.
///
/// Below `exact_threshold` queries use an exact O(n*d) scan; above it an
/// HNSW graph is built and maintained incrementally. Queries restricted to
/// a candidate pool always use the exact scan over the pool: the pool is
/// already materialized and post-filtering a graph search under-fills k.
pub struct VectorIndex {
    config: IndexConfig,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            state: RwLock::new(IndexState {
                vectors: BTreeMap::new(),
                hnsw: None,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(IndexConfig::default())
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.read().vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.read().vectors.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.state.read().vectors.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<Vector> {
        self.state.read().vectors.get(&id).cloned()
    }

    fn check_dim(&self, vector: &Vector) -> Result<()> {
        if vector.dim() != self.config.dim {
            return Err(Error::InvalidDimension {
                expected: self.config.dim,
                actual: vector.dim(),
            });
        }
        Ok(())
    }

    /// Insert or replace the vector for an entity.
    ///
    /// Replacement removes the previous graph entry first, so an updated
    /// entity never appears twice in query results.
    pub fn upsert(&self, id: EntityId, vector: Vector) -> Result<()> {
        self.check_dim(&vector)?;

        let vector = match self.config.metric {
            Metric::Dot => vector.normalized(),
            Metric::SquaredL2 => vector,
        };

        let mut state = self.state.write();
        if state.vectors.contains_key(&id) {
            if let Some(hnsw) = state.hnsw.as_mut() {
                hnsw.remove(id);
            }
        }
        if let Some(hnsw) = state.hnsw.as_mut() {
            hnsw.insert(id, &vector);
        }
        state.vectors.insert(id, vector);

        self.maybe_manage_graph(&mut state);
        Ok(())
    }

    /// Remove an entity's vector. Returns whether it was present.
    pub fn remove(&self, id: EntityId) -> bool {
        let mut state = self.state.write();
        let removed = state.vectors.remove(&id).is_some();
        if removed {
            if let Some(hnsw) = state.hnsw.as_mut() {
                hnsw.remove(id);
            }
            self.maybe_manage_graph(&mut state);
        }
        removed
    }

    /// Build the graph when the collection outgrows the exact-scan
    /// threshold, and rebuild it when tombstones dominate.
    fn maybe_manage_graph(&self, state: &mut IndexState) {
        let needs_build =
            state.hnsw.is_none() && state.vectors.len() > self.config.exact_threshold;
        let needs_rebuild = state
            .hnsw
            .as_ref()
            .map(|h| h.needs_compaction())
            .unwrap_or(false);

        if needs_build || needs_rebuild {
            let mut hnsw = HnswIndex::new(&self.config);
            for (id, vector) in &state.vectors {
                hnsw.insert(*id, vector);
            }
            state.hnsw = Some(hnsw);
        } else if state.hnsw.is_some() && state.vectors.len() <= self.config.exact_threshold / 2 {
            state.hnsw = None;
        }
    }

    /// Find the k nearest entities to `query`.
    ///
    /// `pool` restricts the search to a pre-filtered candidate set. An
    /// empty index or empty pool yields an empty result, not an error.
    /// Results are ordered by ascending distance, ties broken by ascending
    /// entity id. Exceeding `deadline` fails with [`Error::Timeout`].
    pub fn nearest(
        &self,
        query: &Vector,
        k: usize,
        pool: Option<&HashSet<EntityId>>,
        deadline: Option<Instant>,
    ) -> Result<Vec<(EntityId, f32)>> {
        self.check_dim(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = match self.config.metric {
            Metric::Dot => query.normalized(),
            Metric::SquaredL2 => query.clone(),
        };

        let state = self.state.read();
        if state.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pool) = pool {
            if pool.is_empty() {
                return Ok(Vec::new());
            }
        }

        let use_graph = pool.is_none()
            && state.hnsw.is_some()
            && state.vectors.len() > self.config.exact_threshold;

        if use_graph {
            let hnsw = state.hnsw.as_ref().unwrap();
            let ef = self.config.ef_search.max(k);
            return hnsw.search(&query, k, ef, deadline);
        }

        self.exact_scan(&state, &query, k, pool, deadline)
    }

    fn exact_scan(
        &self,
        state: &IndexState,
        query: &Vector,
        k: usize,
        pool: Option<&HashSet<EntityId>>,
        deadline: Option<Instant>,
    ) -> Result<Vec<(EntityId, f32)>> {
        let metric = self.config.metric;
        let mut results: Vec<(EntityId, f32)> = Vec::new();

        for (i, (id, vector)) in state.vectors.iter().enumerate() {
            // Deadline polling on a stride; per-entry clock reads are
            // measurable at scan sizes in the thousands.
            if i % 256 == 0 {
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        return Err(Error::Timeout);
                    }
                }
            }
            if let Some(pool) = pool {
                if !pool.contains(id) {
                    continue;
                }
            }
            let dist = metric.distance(query.as_slice(), vector.as_slice());
            results.push((*id, dist));
        }

        results.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(k);
        Ok(results)
    }
}
