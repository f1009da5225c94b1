//! A single JSON store file with its temp overlay.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tokio::fs;

use super::error::RegistryError;
use super::types::Entry;

/// Entries keyed by item id. Ordered so repeated saves produce stable files.
pub type EntryMap = BTreeMap<String, Entry>;

/// Append a suffix to the final path component (`posts.json` → `posts.json_temp`).
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// One logical store: a main JSON object file plus an optional `_temp`
/// overlay written by checkpoints. Dry runs write to a `_debug` variant so
/// production state is never touched.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    debug: bool,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            path: path.into(),
            debug,
        }
    }

    /// The production path of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the next non-temp save writes to.
    pub fn save_path(&self) -> PathBuf {
        if self.debug {
            with_suffix(&self.path, "_debug")
        } else {
            self.path.clone()
        }
    }

    /// Path checkpoints write to.
    pub fn temp_path(&self) -> PathBuf {
        with_suffix(&self.save_path(), "_temp")
    }

    /// Load the production store and merge its leftover temp overlay on top.
    ///
    /// Overlay entries win on id collision. Missing files are treated as
    /// empty stores.
    pub async fn load(&self) -> Result<EntryMap, RegistryError> {
        let mut entries = read_map(&self.path).await?.unwrap_or_default();
        let overlay_path = with_suffix(&self.path, "_temp");
        if let Some(overlay) = read_map(&overlay_path).await? {
            tracing::info!(
                count = overlay.len(),
                path = %overlay_path.display(),
                "Merging entries from interrupted run"
            );
            entries.extend(overlay);
        }
        // Older files keyed entries by id without repeating it in the body.
        for (id, entry) in entries.iter_mut() {
            if entry.id.is_empty() {
                entry.id.clone_from(id);
            }
        }
        Ok(entries)
    }

    /// Write `entries` to the temp overlay (`temp == true`) or to the main
    /// file, in which case any temp overlay is removed afterwards.
    pub async fn save(&self, entries: &EntryMap, temp: bool) -> Result<(), RegistryError> {
        let target = if temp {
            self.temp_path()
        } else {
            self.save_path()
        };
        write_map(&target, entries).await?;

        if !temp {
            let temp_path = self.temp_path();
            match fs::remove_file(&temp_path).await {
                Ok(()) => tracing::debug!("Removed {}", temp_path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(RegistryError::Write {
                        path: temp_path,
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

async fn read_map(path: &Path) -> Result<Option<EntryMap>, RegistryError> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RegistryError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize with 4-space indentation and replace the target via a `.part`
/// file so a crash mid-write never truncates an existing store.
async fn write_map(path: &Path, entries: &EntryMap) -> Result<(), RegistryError> {
    let write_err = |source| RegistryError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    entries
        .serialize(&mut ser)
        .map_err(|e| write_err(std::io::Error::other(e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }
    let part = with_suffix(path, ".part");
    fs::write(&part, &buf).await.map_err(write_err)?;
    fs::rename(&part, path).await.map_err(write_err)?;
    Ok(())
}
