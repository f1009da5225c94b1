//! Durable record of which saved items have been archived.
//!
//! Two JSON stores live in the data directory: `posts.json` for completed
//! entries and `failed.json` for entries whose last attempt failed. During a
//! run the coordinator checkpoints both into `_temp` overlays; the next load
//! merges any overlay left behind by a crash, so at most one checkpoint
//! interval of bookkeeping is ever lost.
//!
//! The registry is owned by the pipeline coordinator. Workers never touch it;
//! they hand their outcomes back to the coordinator, which is the only writer.

pub mod error;
pub mod store;
pub mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use error::RegistryError;
pub use store::{EntryMap, JsonStore};
pub use types::{Entry, EntryData};

/// File name of the completed store inside the data directory.
pub const COMPLETED_FILE: &str = "posts.json";
/// File name of the failed store inside the data directory.
pub const FAILED_FILE: &str = "failed.json";

#[derive(Debug)]
pub struct Registry {
    completed: EntryMap,
    failed: EntryMap,
    completed_store: JsonStore,
    failed_store: JsonStore,
}

impl Registry {
    /// Load both stores from `data_dir`, merging leftover temp overlays.
    ///
    /// With `debug` set, saves go to `_debug` files, but the production
    /// stores are still loaded so dedup reflects real state.
    pub async fn load(data_dir: &Path, debug: bool) -> Result<Self, RegistryError> {
        let completed_store = JsonStore::new(data_dir.join(COMPLETED_FILE), debug);
        let failed_store = JsonStore::new(data_dir.join(FAILED_FILE), debug);

        let completed = completed_store.load().await?;
        let mut failed = failed_store.load().await?;
        // An overlay can hold a completion for an id the main failed store
        // still lists; the completion is the newer fact.
        failed.retain(|id, _| !completed.contains_key(id));

        tracing::debug!(
            completed = completed.len(),
            failed = failed.len(),
            "Loaded registry from {}",
            data_dir.display()
        );

        Ok(Self {
            completed,
            failed,
            completed_store,
            failed_store,
        })
    }

    /// Snapshot of completed ids, used for dedup while the registry is
    /// being written to.
    pub fn completed_ids(&self) -> HashSet<String> {
        self.completed.keys().cloned().collect()
    }

    pub fn completed(&self) -> &EntryMap {
        &self.completed
    }

    pub fn failed(&self) -> &EntryMap {
        &self.failed
    }

    pub fn completed_path(&self) -> &Path {
        self.completed_store.path()
    }

    /// Temp overlay paths for both stores, in (completed, failed) order.
    pub fn temp_paths(&self) -> (PathBuf, PathBuf) {
        (self.completed_store.temp_path(), self.failed_store.temp_path())
    }

    /// Record a successful entry. Any earlier failure for the id is dropped.
    pub fn record_completed(&mut self, entry: Entry) {
        self.failed.remove(&entry.id);
        self.completed.insert(entry.id.clone(), entry);
    }

    /// Record a failed entry, replacing any earlier failure for the id.
    pub fn record_failed(&mut self, entry: Entry) {
        self.completed.remove(&entry.id);
        self.failed.insert(entry.id.clone(), entry);
    }

    /// Remove a completed entry so the next sync processes it again.
    pub fn forget_completed(&mut self, id: &str) -> Option<Entry> {
        self.completed.remove(id)
    }

    /// Write both maps to their temp overlays.
    pub async fn checkpoint(&self) -> Result<(), RegistryError> {
        self.completed_store.save(&self.completed, true).await?;
        self.failed_store.save(&self.failed, true).await
    }

    /// Write both maps to their main files and remove the temp overlays.
    pub async fn flush(&self) -> Result<(), RegistryError> {
        self.completed_store.save(&self.completed, false).await?;
        self.failed_store.save(&self.failed, false).await
    }
}
