//! # matchx Embed
//!
//! Embedding pipeline for the matchx matching engine:
//!
//! - [`EmbeddingProvider`] - lazily initialized, construct-once handle to
//!   the text-encoding model (opaque behind [`TextEncoder`])
//! - [`fingerprint`] - SHA-256 digest of an entity's semantic text fields
//! - [`needs_reembed`] / [`PendingSet`] - staleness decisions and the set
//!   of entities awaiting recomputation
//! - [`JobSystem`] - FIFO background worker that runs re-embedding after
//!   the owning transaction commits

pub mod fingerprint;
pub mod provider;
pub mod staleness;
pub mod worker;

pub use fingerprint::fingerprint;
pub use provider::{EmbeddingProvider, HashingEncoder, TextEncoder, EMBEDDING_DIM};
pub use staleness::{needs_reembed, PendingSet};
pub use worker::{BackgroundJob, JobSystem};
