//! Forgetting completed posts whose downloads were moved to the bin
//! directory, so the next sync fetches them again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::registry::{COMPLETED_FILE, EntryMap, Registry};

/// Bin directory name inside the data directory.
pub const BIN_DIR: &str = "_BIN";

/// Ids of completed entries matched by the names in the bin.
///
/// A name matches when its first space-delimited token is a completed id, or
/// when its stem equals a completed entry's title.
pub fn matching_ids(names: &[String], completed: &EntryMap) -> Vec<String> {
    let mut by_title: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, entry) in completed {
        if !entry.title.is_empty() {
            by_title.entry(entry.title.as_str()).or_default().push(id);
        }
    }

    let mut ids = Vec::new();
    for name in names {
        let token = name.split(' ').next().unwrap_or("");
        if completed.contains_key(token) {
            ids.push(token.to_string());
            continue;
        }
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        if let Some(matched) = by_title.get(stem) {
            ids.extend(matched.iter().map(|id| id.to_string()));
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

async fn bin_names(bin_dir: &Path) -> anyhow::Result<Vec<String>> {
    tokio::fs::create_dir_all(bin_dir)
        .await
        .with_context(|| format!("Failed to create {}", bin_dir.display()))?;
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(bin_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::debug!("Skipping non-UTF-8 name {:?}", raw),
        }
    }
    Ok(names)
}

/// Remove bin-matched entries from the completed store in `data_dir`,
/// keeping a copy of the previous store as `posts.old`.
///
/// Returns the removed ids.
pub async fn prune(data_dir: &Path, bin_dir: Option<PathBuf>) -> anyhow::Result<Vec<String>> {
    let bin_dir = bin_dir.unwrap_or_else(|| data_dir.join(BIN_DIR));
    let names = bin_names(&bin_dir).await?;

    let mut registry = Registry::load(data_dir, false).await?;
    let ids = matching_ids(&names, registry.completed());
    if ids.is_empty() {
        tracing::info!("Nothing in {} matches a completed post", bin_dir.display());
        return Ok(ids);
    }

    let store = data_dir.join(COMPLETED_FILE);
    if store.exists() {
        let backup = store.with_extension("old");
        tokio::fs::copy(&store, &backup)
            .await
            .with_context(|| format!("Failed to back up {}", store.display()))?;
        tracing::info!("Backed up {} to {}", store.display(), backup.display());
    }
    for id in &ids {
        if registry.forget_completed(id).is_some() {
            tracing::info!(%id, "Removed");
        }
    }
    registry.flush().await?;
    Ok(ids)
}
