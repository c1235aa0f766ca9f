use crate::index::{EntityId, IndexConfig, Metric};
use crate::{Error, Result, Vector};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

const MAX_LAYERS: usize = 3;

/// Fast bit vector for visited node tracking
/// Much faster than HashSet for dense integer sets
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns true if the index was not previously set
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word = idx / 64;
        let mask = 1u64 << (idx % 64);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let was_set = (self.bits[word] & mask) != 0;
        self.bits[word] |= mask;
        !was_set
    }
}

/// Candidate for search with distance
#[derive(Clone, Copy)]
struct Candidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smaller distance = higher priority
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reverse candidate for max-heap (furthest first)
#[derive(Clone, Copy)]
struct ReverseCandidate {
    idx: usize,
    dist: f32,
}

impl PartialEq for ReverseCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}

impl Eq for ReverseCandidate {}

impl Ord for ReverseCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: larger distance = higher priority
        self.dist.partial_cmp(&other.dist).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ReverseCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    id: EntityId,
    layers: Vec<Vec<usize>>,
}

/// HNSW index for approximate nearest neighbor search.
///
/// Supports incremental insertion and removal: removed nodes become
/// tombstones that stay in the graph for connectivity and are skipped in
/// results. [`needs_compaction`](HnswIndex::needs_compaction) signals when
/// tombstones have accumulated enough that the owner should rebuild.
pub struct HnswIndex {
    nodes: Vec<HnswNode>,
    /// Contiguous storage for all vectors (cache-friendly)
    vectors: Vec<f32>,
    deleted: Vec<bool>,
    tombstones: usize,
    dim: usize,
    metric: Metric,
    id_to_index: HashMap<EntityId, usize>,
    m: usize,
    ef_construction: usize,
}

impl HnswIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            nodes: Vec::new(),
            vectors: Vec::new(),
            deleted: Vec::new(),
            tombstones: 0,
            dim: config.dim,
            metric: config.metric,
            id_to_index: HashMap::new(),
            m: config.m,
            ef_construction: config.ef_construction,
        }
    }

    /// Get vector slice for a node (from contiguous storage)
    #[inline(always)]
    fn node_vector(&self, node_idx: usize) -> &[f32] {
        let start = node_idx * self.dim;
        &self.vectors[start..start + self.dim]
    }

    /// Select layer using exponential decay
    #[inline]
    fn select_layer(&self) -> usize {
        let mut layer = 0;
        while layer < MAX_LAYERS - 1 && rand::random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    #[inline(always)]
    fn distance_to_node(&self, query: &[f32], node_idx: usize) -> f32 {
        self.metric.distance(query, self.node_vector(node_idx))
    }

    /// Greedy best-first search within one layer
    fn search_layer(
        &self,
        query: &[f32],
        entry_point: usize,
        ef: usize,
        layer: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<(usize, f32)>> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<ReverseCandidate> = BinaryHeap::with_capacity(ef + 1);

        let entry_dist = self.distance_to_node(query, entry_point);
        candidates.push(Candidate {
            idx: entry_point,
            dist: entry_dist,
        });
        results.push(ReverseCandidate {
            idx: entry_point,
            dist: entry_dist,
        });
        visited.insert(entry_point);

        let mut worst_dist = entry_dist;
        let mut hops: u32 = 0;

        while let Some(Candidate {
            idx: current_idx,
            dist: current_dist,
        }) = candidates.pop()
        {
            hops += 1;
            if hops % 64 == 0 {
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        return Err(Error::Timeout);
                    }
                }
            }

            // Early termination: current candidate is worse than the worst
            // kept result
            if results.len() >= ef && current_dist > worst_dist {
                break;
            }

            let Some(neighbors) = self.nodes[current_idx].layers.get(layer) else {
                continue;
            };

            for &neighbor_idx in neighbors {
                if visited.insert(neighbor_idx) {
                    let dist = self.distance_to_node(query, neighbor_idx);

                    if results.len() < ef || dist < worst_dist {
                        candidates.push(Candidate {
                            idx: neighbor_idx,
                            dist,
                        });
                        results.push(ReverseCandidate {
                            idx: neighbor_idx,
                            dist,
                        });

                        if results.len() > ef {
                            results.pop();
                            if let Some(worst) = results.peek() {
                                worst_dist = worst.dist;
                            }
                        } else if dist > worst_dist {
                            worst_dist = dist;
                        }
                    }
                }
            }
        }

        let mut result_vec: Vec<(usize, f32)> = results
            .into_iter()
            .map(|c| (c.idx, c.dist))
            .collect();
        result_vec.sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        Ok(result_vec)
    }

    /// Insert a vector for an entity. Re-inserting an existing id replaces
    /// its previous entry.
    pub fn insert(&mut self, id: EntityId, vector: &Vector) {
        if self.dim == 0 {
            self.dim = vector.dim();
        }
        if let Some(&old_idx) = self.id_to_index.get(&id) {
            self.tombstone(old_idx);
        }

        let top_layer = self.select_layer();
        self.vectors.extend_from_slice(vector.as_slice());

        let mut node = HnswNode {
            id,
            layers: vec![Vec::new(); top_layer + 1],
        };

        if self.nodes.is_empty() {
            self.nodes.push(node);
            self.deleted.push(false);
            self.id_to_index.insert(id, 0);
            return;
        }

        let query = vector.as_slice();
        let mut entry_point = 0;

        // Descend through layers above the node's top layer with a narrow
        // beam
        for layer in ((top_layer + 1)..MAX_LAYERS).rev() {
            if let Ok(found) = self.search_layer(query, entry_point, 1, layer, None) {
                if let Some(&(idx, _)) = found.first() {
                    entry_point = idx;
                }
            }
        }

        // Connect at the node's layers, widest beam at the bottom
        let node_idx = self.nodes.len();
        for layer in (0..=top_layer).rev() {
            let candidates = self
                .search_layer(query, entry_point, self.ef_construction, layer, None)
                .unwrap_or_default();
            if let Some(&(idx, _)) = candidates.first() {
                entry_point = idx;
            }
            node.layers[layer] = candidates
                .iter()
                .take(self.m)
                .map(|&(idx, _)| idx)
                .collect();
        }

        let back_links: Vec<(usize, usize)> = node
            .layers
            .iter()
            .enumerate()
            .flat_map(|(layer, neighbors)| neighbors.iter().map(move |&n| (layer, n)))
            .collect();

        self.nodes.push(node);
        self.deleted.push(false);
        self.id_to_index.insert(id, node_idx);

        for (layer, neighbor_idx) in back_links {
            if layer < self.nodes[neighbor_idx].layers.len() {
                self.nodes[neighbor_idx].layers[layer].push(node_idx);
                if self.nodes[neighbor_idx].layers[layer].len() > self.m * 2 {
                    self.prune_neighbors(neighbor_idx, layer);
                }
            }
        }
    }

    /// Keep only the closest `m * 2` connections of a node at one layer
    fn prune_neighbors(&mut self, node_idx: usize, layer: usize) {
        let node_vec = self.node_vector(node_idx).to_vec();
        let mut connections = self.nodes[node_idx].layers[layer].clone();
        connections.sort_by(|&a, &b| {
            let dist_a = self.metric.distance(&node_vec, self.node_vector(a));
            let dist_b = self.metric.distance(&node_vec, self.node_vector(b));
            dist_a.partial_cmp(&dist_b).unwrap_or(Ordering::Equal)
        });
        connections.truncate(self.m * 2);
        self.nodes[node_idx].layers[layer] = connections;
    }

    fn tombstone(&mut self, node_idx: usize) {
        if !self.deleted[node_idx] {
            self.deleted[node_idx] = true;
            self.tombstones += 1;
        }
    }

    /// Remove an entity from the index. The node stays in the graph as a
    /// tombstone until the owner rebuilds.
    pub fn remove(&mut self, id: EntityId) -> bool {
        if let Some(idx) = self.id_to_index.remove(&id) {
            self.tombstone(idx);
            true
        } else {
            false
        }
    }

    /// Whether tombstones have accumulated enough to warrant a rebuild
    pub fn needs_compaction(&self) -> bool {
        self.tombstones * 4 > self.nodes.len() && self.nodes.len() >= 64
    }

    /// Search for the k nearest live entities.
    ///
    /// `ef` is the layer-0 search width; it is widened by the tombstone
    /// count so deletions do not starve the result set.
    pub fn search(
        &self,
        query: &Vector,
        k: usize,
        ef: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<(EntityId, f32)>> {
        if self.nodes.is_empty() || self.len() == 0 {
            return Ok(Vec::new());
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(Error::Timeout);
            }
        }

        let ef = (ef.max(k) + self.tombstones).min(self.nodes.len());
        let query_slice = query.as_slice();
        let mut entry_point = 0;

        for layer in (1..MAX_LAYERS).rev() {
            let found = self.search_layer(query_slice, entry_point, 1, layer, deadline)?;
            if let Some(&(idx, _)) = found.first() {
                entry_point = idx;
            }
        }

        let results = self.search_layer(query_slice, entry_point, ef, 0, deadline)?;

        let mut live: Vec<(EntityId, f32)> = results
            .into_iter()
            .filter(|&(idx, _)| !self.deleted[idx])
            .map(|(idx, dist)| (self.nodes[idx].id, dist))
            .collect();
        live.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        live.truncate(k);
        Ok(live)
    }

    /// Number of live entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - self.tombstones
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
