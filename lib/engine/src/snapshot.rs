//! Snapshot persistence for the in-memory store.
//!
//! The full state - entities, vectors, fingerprints, pending marks -
//! serializes to a single bincode file, written atomically so a crash
//! mid-save never leaves a torn snapshot. Entities that were pending at
//! save time come back pending; callers reschedule them after loading.

use crate::model::{Application, Cv, Posting};
use crate::store::{EntityKey, MatchStore};
use matchx_core::{Error, IndexConfig, Result, Vector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    version: u32,
    postings: Vec<Posting>,
    cvs: Vec<Cv>,
    applications: Vec<Application>,
    posting_vectors: Vec<(u64, Vec<f32>)>,
    cv_vectors: Vec<(u64, Vec<f32>)>,
    fingerprints: Vec<(EntityKey, String)>,
    pending: Vec<EntityKey>,
}

/// Write the store's full state to `path` atomically
pub fn save(store: &MatchStore, path: &Path) -> Result<()> {
    use crate::store::EntityKind;
    use atomicwrites::{AtomicFile, OverwriteBehavior};

    let collect_vectors = |kind: EntityKind| -> Vec<(u64, Vec<f32>)> {
        let index = match kind {
            EntityKind::Posting => store.posting_index(),
            EntityKind::Cv => store.cv_index(),
        };
        store
            .all_fingerprints()
            .into_iter()
            .filter(|(key, _)| key.0 == kind)
            .filter_map(|(key, _)| index.get(key.1).map(|v| (key.1 .0, v.into_inner())))
            .collect()
    };

    let data = SnapshotData {
        version: SNAPSHOT_VERSION,
        postings: store.all_postings(),
        cvs: store.all_cvs(),
        applications: store.all_applications(),
        posting_vectors: collect_vectors(EntityKind::Posting),
        cv_vectors: collect_vectors(EntityKind::Cv),
        fingerprints: store.all_fingerprints(),
        pending: store.pending_reembeds(),
    };

    let bytes = bincode::serialize(&data).map_err(|e| Error::Serialization(e.to_string()))?;
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| std::io::Write::write_all(f, &bytes))
        .map_err(|e| Error::Persistence(e.to_string()))?;

    tracing::debug!(
        path = %path.display(),
        postings = data.postings.len(),
        cvs = data.cvs.len(),
        "snapshot saved"
    );
    Ok(())
}

/// Load a snapshot into a fresh store.
///
/// Returns the store plus the keys that were pending re-embedding at save
/// time, for the caller to reschedule.
pub fn load(path: &Path, config: IndexConfig) -> Result<(Arc<MatchStore>, Vec<EntityKey>)> {
    use crate::store::EntityKind;

    let bytes = std::fs::read(path)?;
    let data: SnapshotData =
        bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;
    if data.version != SNAPSHOT_VERSION {
        return Err(Error::Persistence(format!(
            "unsupported snapshot version {}",
            data.version
        )));
    }

    let store = MatchStore::new(config);
    for p in data.postings {
        store.restore_posting(p);
    }
    for c in data.cvs {
        store.restore_cv(c);
    }
    for a in data.applications {
        store.restore_application(a);
    }

    let fingerprints: std::collections::HashMap<EntityKey, String> =
        data.fingerprints.into_iter().collect();
    let restore = |kind: EntityKind, vectors: Vec<(u64, Vec<f32>)>| -> Result<()> {
        for (id, components) in vectors {
            let key = (kind, matchx_core::EntityId(id));
            let fp = fingerprints.get(&key).cloned().unwrap_or_default();
            store.restore_embedding(key, Vector::new(components), fp)?;
        }
        Ok(())
    };
    restore(EntityKind::Posting, data.posting_vectors)?;
    restore(EntityKind::Cv, data.cv_vectors)?;

    for key in &data.pending {
        store.mark_pending(*key);
    }

    tracing::info!(
        path = %path.display(),
        postings = store.posting_count(),
        cvs = store.cv_count(),
        pending = data.pending.len(),
        "snapshot loaded"
    );
    Ok((store, data.pending))
}

/// Periodically snapshot the store until it is dropped
pub fn spawn_background_save(
    store: &Arc<MatchStore>,
    path: PathBuf,
    interval: Duration,
) -> thread::JoinHandle<()> {
    let weak: Weak<MatchStore> = Arc::downgrade(store);
    thread::Builder::new()
        .name("snapshot-saver".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            let store = match weak.upgrade() {
                Some(store) => store,
                None => break,
            };
            if let Err(e) = save(&store, &path) {
                tracing::error!(error = %e, "periodic snapshot failed");
            }
        })
        .expect("Failed to spawn snapshot thread")
}
