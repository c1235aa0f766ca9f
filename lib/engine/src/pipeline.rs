//! Wires the store's commit hook to the background job system.
//!
//! Every committed transaction that touched semantic text schedules one
//! [`ReembedJob`] per affected entity. Jobs re-read the entity at run
//! time, so a queue of stale jobs converges on the latest text; a job for
//! a deleted entity is a no-op. Model failures retry with bounded backoff
//! and otherwise leave the entity pending for the next write.

use crate::store::{EntityKey, MatchStore};
use matchx_core::Error;
use matchx_embed::{fingerprint, BackgroundJob, EmbeddingProvider, JobSystem};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(100);

/// Recompute one entity's embedding from its current text
pub struct ReembedJob {
    store: Weak<MatchStore>,
    provider: Arc<EmbeddingProvider>,
    key: EntityKey,
    attempt: u32,
}

impl BackgroundJob for ReembedJob {
    fn execute(self: Box<Self>, system: &JobSystem) {
        let store = match self.store.upgrade() {
            Some(store) => store,
            None => return,
        };
        // Re-read at execution time: the text may have changed again since
        // this job was scheduled, and embedding the current text satisfies
        // every queued job for this key at once.
        let fields = match store.semantic_fields(self.key) {
            Some(fields) => fields,
            None => return, // deleted since scheduling
        };
        let fp = fingerprint(&fields);
        let text = fields.join(" ");

        match self.provider.embed(&text, None) {
            Ok(vector) => {
                if let Err(e) = store.apply_embedding(self.key, vector, fp) {
                    tracing::warn!(entity = %self.key.1, error = %e, "failed to store embedding");
                }
            }
            Err(Error::ModelUnavailable(reason)) if self.attempt + 1 < MAX_ATTEMPTS => {
                let backoff = RETRY_BASE * 2u32.pow(self.attempt);
                tracing::warn!(
                    entity = %self.key.1,
                    attempt = self.attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    %reason,
                    "embedding model unavailable, retrying"
                );
                thread::sleep(backoff);
                system.submit(Box::new(ReembedJob {
                    store: self.store.clone(),
                    provider: self.provider.clone(),
                    key: self.key,
                    attempt: self.attempt + 1,
                }));
            }
            Err(e) => {
                // Entity stays pending; the next semantic write reschedules
                tracing::warn!(entity = %self.key.1, error = %e, "embedding failed, entity stays stale");
            }
        }
    }
}

/// The deferred-embedding pipeline: owns the worker queue and installs the
/// store's post-commit hook.
pub struct EmbedPipeline {
    provider: Arc<EmbeddingProvider>,
    jobs: JobSystem,
}

impl EmbedPipeline {
    /// Start the worker and hook `store` up to it. Holds only a weak store
    /// reference, so dropping the store does not leak through the hook.
    pub fn attach(store: &Arc<MatchStore>, provider: Arc<EmbeddingProvider>) -> Self {
        let jobs = JobSystem::new();
        let hook_store = Arc::downgrade(store);
        let hook_provider = provider.clone();
        let hook_jobs = jobs.clone();
        store.set_commit_hook(move |keys| {
            for key in keys {
                hook_jobs.submit(Box::new(ReembedJob {
                    store: hook_store.clone(),
                    provider: hook_provider.clone(),
                    key: *key,
                    attempt: 0,
                }));
            }
        });
        Self { provider, jobs }
    }

    /// Schedule a recompute outside the transaction path, e.g. after a
    /// snapshot load left entities pending.
    pub fn schedule(&self, store: &Arc<MatchStore>, key: EntityKey) {
        self.jobs.submit(Box::new(ReembedJob {
            store: Arc::downgrade(store),
            provider: self.provider.clone(),
            key,
            attempt: 0,
        }));
    }

    /// Block until all queued embedding work finishes
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.jobs.wait_idle(timeout)
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.pending_jobs()
    }

    pub fn shutdown(&self) {
        self.jobs.shutdown();
    }
}
