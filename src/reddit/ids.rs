use std::path::Path;

use anyhow::Context;

/// Fullname prefix for link posts.
pub const LINK_PREFIX: &str = "t3_";

/// Read post ids from a saved-posts export.
///
/// The header row is discarded and ids come from the first column. Each id
/// is returned as a fullname (`t3_` prefixed). A missing file yields no ids.
pub fn load_id_list(path: &Path) -> anyhow::Result<Vec<String>> {
    if !path.exists() {
        tracing::warn!("No id list at {}, nothing to process", path.display());
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) else {
            continue;
        };
        ids.push(fullname(id));
    }
    tracing::debug!(count = ids.len(), "Loaded id list from {}", path.display());
    Ok(ids)
}

pub fn fullname(id: &str) -> String {
    if id.starts_with(LINK_PREFIX) {
        id.to_string()
    } else {
        format!("{LINK_PREFIX}{id}")
    }
}

pub fn strip_prefix(id: &str) -> &str {
    id.strip_prefix(LINK_PREFIX).unwrap_or(id)
}
