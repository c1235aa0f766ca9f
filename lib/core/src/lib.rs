//! # matchx Core
//!
//! Core library for the matchx semantic matching engine.
//!
//! This crate provides the fundamental data structures and algorithms:
//!
//! - [`Vector`] - Dense vector representation with distance operations
//! - [`EntityId`] - Opaque stable identifier for embeddable entities
//! - [`VectorIndex`] - Per-entity vector store with top-k nearest-neighbor
//!   queries, exact below a size threshold and HNSW-backed above it
//! - [`HnswIndex`] - The approximate graph index itself
//!
//! ## Example
//!
//! ```rust
//! use matchx_core::{EntityId, IndexConfig, Vector, VectorIndex};
//!
//! let index = VectorIndex::new(IndexConfig {
//!     dim: 3,
//!     ..IndexConfig::default()
//! });
//!
//! index.upsert(EntityId(1), Vector::new(vec![1.0, 0.0, 0.0])).unwrap();
//!
//! let query = Vector::new(vec![1.0, 0.0, 0.0]);
//! let results = index.nearest(&query, 10, None, None).unwrap();
//! assert_eq!(results[0].0, EntityId(1));
//! ```

pub mod error;
pub mod hnsw;
pub mod index;
pub mod vector;

pub use error::{Error, Result};
pub use hnsw::HnswIndex;
pub use index::{EntityId, IndexConfig, Metric, VectorIndex};
pub use vector::Vector;
