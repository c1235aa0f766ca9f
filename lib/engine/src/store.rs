//! Entity store with transactional writes and deferred re-embedding.
//!
//! Writes go through [`MatchStore::transaction`]: mutations buffer inside
//! the closure and apply only when it returns `Ok`. Staleness is decided
//! per mutation by field-level comparison against the committed state; the
//! affected entities are marked pending and handed to the commit hook
//! (which enqueues background re-embed jobs) strictly after the mutations
//! land. A closure returning `Err` applies nothing and schedules nothing.

use crate::filter::PostingFilter;
use crate::model::{Application, Cv, Posting};
use matchx_core::{EntityId, Error, IndexConfig, Result, Vector, VectorIndex};
use matchx_embed::{fingerprint, needs_reembed, PendingSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Which vector index an embeddable entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Posting,
    Cv,
}

pub type EntityKey = (EntityKind, EntityId);

/// Embedding state of an entity, as seen by ranking code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingStatus {
    /// Vector present and computed from the current text
    Current,
    /// Vector present but a recompute is pending (the stored vector
    /// reflects an older text and still participates in ranking)
    Stale,
    /// Never computed, or computation still outstanding - excluded from
    /// ranking
    Absent,
}

type CommitHook = Box<dyn Fn(&[EntityKey]) + Send + Sync>;

enum Mutation {
    UpsertPosting(Posting),
    UpsertCv(Cv),
    UpsertApplication(Application),
    DeletePosting(EntityId),
    DeleteCv(EntityId),
}

/// Buffered unit of work. Mutations and the re-embed schedule take effect
/// only at commit.
pub struct Transaction<'a> {
    store: &'a MatchStore,
    mutations: Vec<Mutation>,
    reembed: Vec<EntityKey>,
}

impl Transaction<'_> {
    pub fn upsert_posting(&mut self, posting: Posting) {
        let key = (EntityKind::Posting, posting.id);
        let old = self
            .store
            .postings
            .read()
            .get(&posting.id)
            .map(|p| p.semantic_fields());
        if needs_reembed(old.as_deref(), &posting.semantic_fields()) {
            self.reembed.push(key);
        }
        self.mutations.push(Mutation::UpsertPosting(posting));
    }

    pub fn upsert_cv(&mut self, cv: Cv) {
        let key = (EntityKind::Cv, cv.id);
        let old = self
            .store
            .cvs
            .read()
            .get(&cv.id)
            .map(|c| c.semantic_fields());
        if needs_reembed(old.as_deref(), &cv.semantic_fields()) {
            self.reembed.push(key);
        }
        self.mutations.push(Mutation::UpsertCv(cv));
    }

    pub fn upsert_application(&mut self, application: Application) -> Result<()> {
        if !self.store.postings.read().contains_key(&application.posting) {
            return Err(Error::EntityNotFound(format!(
                "posting {}",
                application.posting
            )));
        }
        if !self.store.cvs.read().contains_key(&application.cv) {
            return Err(Error::EntityNotFound(format!("cv {}", application.cv)));
        }
        self.mutations.push(Mutation::UpsertApplication(application));
        Ok(())
    }

    pub fn delete_posting(&mut self, id: EntityId) {
        self.mutations.push(Mutation::DeletePosting(id));
    }

    pub fn delete_cv(&mut self, id: EntityId) {
        self.mutations.push(Mutation::DeleteCv(id));
    }
}

/// In-memory entity store: the narrow interface the ranking core uses in
/// place of a relational persistence layer.
pub struct MatchStore {
    postings: RwLock<BTreeMap<EntityId, Posting>>,
    cvs: RwLock<BTreeMap<EntityId, Cv>>,
    applications: RwLock<BTreeMap<EntityId, Application>>,
    posting_index: VectorIndex,
    cv_index: VectorIndex,
    /// Fingerprint of the text each stored embedding was computed from
    fingerprints: RwLock<HashMap<EntityKey, String>>,
    pending: PendingSet<EntityKey>,
    commit_hook: RwLock<Option<CommitHook>>,
}

impl std::fmt::Debug for MatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchStore").finish_non_exhaustive()
    }
}

impl MatchStore {
    pub fn new(index_config: IndexConfig) -> Arc<Self> {
        Arc::new(Self {
            postings: RwLock::new(BTreeMap::new()),
            cvs: RwLock::new(BTreeMap::new()),
            applications: RwLock::new(BTreeMap::new()),
            posting_index: VectorIndex::new(index_config.clone()),
            cv_index: VectorIndex::new(index_config),
            fingerprints: RwLock::new(HashMap::new()),
            pending: PendingSet::new(),
            commit_hook: RwLock::new(None),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(IndexConfig::default())
    }

    /// Install the post-commit callback that schedules deferred re-embeds
    pub fn set_commit_hook<F>(&self, hook: F)
    where
        F: Fn(&[EntityKey]) + Send + Sync + 'static,
    {
        *self.commit_hook.write() = Some(Box::new(hook));
    }

    /// Run a unit of work. On `Ok` all buffered mutations apply, stale
    /// entities are marked pending, and the commit hook fires with them;
    /// on `Err` nothing happens.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut tx = Transaction {
            store: self,
            mutations: Vec::new(),
            reembed: Vec::new(),
        };
        let out = f(&mut tx)?;
        let Transaction {
            mutations, reembed, ..
        } = tx;

        for mutation in mutations {
            self.apply(mutation);
        }
        for key in &reembed {
            self.pending.mark(*key);
        }
        if !reembed.is_empty() {
            if let Some(hook) = self.commit_hook.read().as_ref() {
                hook(&reembed);
            }
        }
        Ok(out)
    }

    fn apply(&self, mutation: Mutation) {
        match mutation {
            Mutation::UpsertPosting(p) => {
                self.postings.write().insert(p.id, p);
            }
            Mutation::UpsertCv(c) => {
                self.cvs.write().insert(c.id, c);
            }
            Mutation::UpsertApplication(a) => {
                self.applications.write().insert(a.id, a);
            }
            Mutation::DeletePosting(id) => {
                self.postings.write().remove(&id);
                self.drop_embedding((EntityKind::Posting, id));
            }
            Mutation::DeleteCv(id) => {
                self.cvs.write().remove(&id);
                self.drop_embedding((EntityKind::Cv, id));
            }
        }
    }

    fn drop_embedding(&self, key: EntityKey) {
        self.index_for(key.0).remove(key.1);
        self.fingerprints.write().remove(&key);
        self.pending.clear(key);
    }

    #[inline]
    fn index_for(&self, kind: EntityKind) -> &VectorIndex {
        match kind {
            EntityKind::Posting => &self.posting_index,
            EntityKind::Cv => &self.cv_index,
        }
    }

    // ==================== Reads ====================

    pub fn get_posting(&self, id: EntityId) -> Option<Posting> {
        self.postings.read().get(&id).cloned()
    }

    pub fn get_cv(&self, id: EntityId) -> Option<Cv> {
        self.cvs.read().get(&id).cloned()
    }

    pub fn get_application(&self, id: EntityId) -> Option<Application> {
        self.applications.read().get(&id).cloned()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.read().len()
    }

    pub fn cv_count(&self) -> usize {
        self.cvs.read().len()
    }

    /// Ids of postings matching the structured predicate, in id order
    pub fn filter_postings(&self, filter: &PostingFilter) -> Vec<EntityId> {
        self.postings
            .read()
            .values()
            .filter(|p| filter.matches(p))
            .map(|p| p.id)
            .collect()
    }

    /// The student's default CV, if any
    pub fn default_cv_for(&self, owner: EntityId) -> Option<Cv> {
        self.cvs
            .read()
            .values()
            .find(|cv| cv.owner == owner && cv.is_default)
            .cloned()
    }

    pub fn cvs_for(&self, owner: EntityId) -> Vec<Cv> {
        self.cvs
            .read()
            .values()
            .filter(|cv| cv.owner == owner)
            .cloned()
            .collect()
    }

    /// Applications submitted to a posting, in id order
    pub fn applications_for_posting(&self, posting: EntityId) -> Vec<Application> {
        self.applications
            .read()
            .values()
            .filter(|a| a.posting == posting)
            .cloned()
            .collect()
    }

    #[inline]
    pub fn posting_index(&self) -> &VectorIndex {
        &self.posting_index
    }

    #[inline]
    pub fn cv_index(&self) -> &VectorIndex {
        &self.cv_index
    }

    /// Current semantic fields of an entity, `None` if it no longer exists
    pub fn semantic_fields(&self, key: EntityKey) -> Option<Vec<String>> {
        match key.0 {
            EntityKind::Posting => self.postings.read().get(&key.1).map(|p| p.semantic_fields()),
            EntityKind::Cv => self.cvs.read().get(&key.1).map(|c| c.semantic_fields()),
        }
    }

    pub fn embedding_status(&self, key: EntityKey) -> EmbeddingStatus {
        if !self.index_for(key.0).contains(key.1) {
            return EmbeddingStatus::Absent;
        }
        let current = match self.semantic_fields(key) {
            Some(fields) => fingerprint(&fields),
            None => return EmbeddingStatus::Absent,
        };
        let stored = self.fingerprints.read().get(&key).cloned();
        match stored {
            Some(stored) if stored == current => EmbeddingStatus::Current,
            _ => EmbeddingStatus::Stale,
        }
    }

    pub fn is_reembed_pending(&self, key: EntityKey) -> bool {
        self.pending.is_pending(key)
    }

    pub fn pending_reembeds(&self) -> Vec<EntityKey> {
        self.pending.snapshot()
    }

    // ==================== Embedding writes ====================

    /// Store a computed embedding. `text_fingerprint` is the fingerprint
    /// of the fields the vector was computed from; the pending mark clears
    /// only if that text is still current, so a write racing the compute
    /// keeps the entity pending for its own queued job.
    pub fn apply_embedding(
        &self,
        key: EntityKey,
        vector: Vector,
        text_fingerprint: String,
    ) -> Result<()> {
        if self.semantic_fields(key).is_none() {
            // Entity deleted between schedule and compute
            self.pending.clear(key);
            return Ok(());
        }

        self.index_for(key.0).upsert(key.1, vector)?;
        self.fingerprints
            .write()
            .insert(key, text_fingerprint.clone());

        let still_current = self
            .semantic_fields(key)
            .map(|fields| fingerprint(&fields) == text_fingerprint)
            .unwrap_or(false);
        if still_current {
            self.pending.clear(key);
        }
        Ok(())
    }

    // ==================== Snapshot restore ====================

    /// Direct insert without staleness bookkeeping; used when loading a
    /// snapshot.
    pub(crate) fn restore_posting(&self, posting: Posting) {
        self.postings.write().insert(posting.id, posting);
    }

    pub(crate) fn restore_cv(&self, cv: Cv) {
        self.cvs.write().insert(cv.id, cv);
    }

    pub(crate) fn restore_application(&self, application: Application) {
        self.applications.write().insert(application.id, application);
    }

    pub(crate) fn restore_embedding(
        &self,
        key: EntityKey,
        vector: Vector,
        text_fingerprint: String,
    ) -> Result<()> {
        self.index_for(key.0).upsert(key.1, vector)?;
        self.fingerprints.write().insert(key, text_fingerprint);
        Ok(())
    }

    pub(crate) fn mark_pending(&self, key: EntityKey) {
        self.pending.mark(key);
    }

    pub(crate) fn all_postings(&self) -> Vec<Posting> {
        self.postings.read().values().cloned().collect()
    }

    pub(crate) fn all_cvs(&self) -> Vec<Cv> {
        self.cvs.read().values().cloned().collect()
    }

    pub(crate) fn all_applications(&self) -> Vec<Application> {
        self.applications.read().values().cloned().collect()
    }

    pub(crate) fn all_fingerprints(&self) -> Vec<(EntityKey, String)> {
        self.fingerprints
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}
