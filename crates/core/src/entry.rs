use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{Error, Result};

/// Where one payload is sent, plus the correlation data echoed back in its
/// outcome event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub uuid: String,
    pub metadata: BTreeMap<String, String>,
}

impl Destination {
    pub fn new(url: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            uuid: uuid.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One upload unit. Built by the caller and only read by the uploader.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub payload: Arc<[u8]>,
    pub destination: Destination,
}

impl Entry {
    pub fn new(
        id: impl Into<String>,
        payload: impl Into<Arc<[u8]>>,
        destination: Destination,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            destination,
        }
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub path: PathBuf,
    pub upload_url: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

pub fn parse_manifest(text: &str) -> Result<Manifest> {
    let manifest: Manifest = toml::from_str(text).map_err(|e| Error::InvalidConfig {
        message: format!("manifest invalid: {e}"),
    })?;

    let mut seen = HashSet::new();
    for (idx, entry) in manifest.entries.iter().enumerate() {
        if entry.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("entries[{idx}].path must not be empty"),
            });
        }
        if entry.upload_url.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("entries[{idx}].upload_url must not be empty"),
            });
        }
        if let Some(id) = entry.id.as_deref()
            && !seen.insert(id.to_string())
        {
            return Err(Error::InvalidConfig {
                message: format!("duplicate entry id: {id}"),
            });
        }
    }

    Ok(manifest)
}

/// Reads a TOML manifest and loads every listed file into an [`Entry`].
///
/// Relative paths resolve against the manifest's own directory. Entries
/// without an `id` get a fresh v4 UUID; entries without a `uuid` reuse the id.
pub fn load_manifest(path: &Path) -> Result<Vec<Entry>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
        message: format!("manifest read failed: {}: {e}", path.display()),
    })?;
    let manifest = parse_manifest(&text)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    manifest
        .entries
        .into_iter()
        .map(|item| {
            let file_path = base_dir.join(&item.path);
            let bytes = std::fs::read(&file_path).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("read {} failed: {e}", file_path.display()),
                ))
            })?;

            let id = item.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let uuid = item.uuid.unwrap_or_else(|| id.clone());
            let destination = Destination {
                url: item.upload_url,
                uuid,
                metadata: item.metadata,
            };
            Ok(Entry::new(id, bytes, destination))
        })
        .collect()
}
