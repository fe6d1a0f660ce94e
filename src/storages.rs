//! Saved parameter paths
//!
//! A small registry of frequently used Parameter Store prefixes, kept as a
//! pretty-printed JSON array in `parameter-storages.json` inside the data
//! directory.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name inside the data directory
pub const STORAGES_FILE: &str = "parameter-storages.json";

const DESCRIPTION_LEN: (usize, usize) = (2, 50);
const PATH_LEN: (usize, usize) = (2, 200);

/// A named Parameter Store prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterStorage {
    pub id: Uuid,
    pub description: String,
    pub path: String,
}

impl ParameterStorage {
    /// Check description and path lengths
    pub fn validate(&self) -> Result<()> {
        check_length("description", &self.description, DESCRIPTION_LEN)?;
        check_length("path", &self.path, PATH_LEN)?;
        Ok(())
    }
}

fn check_length(field: &str, value: &str, (min, max): (usize, usize)) -> Result<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        bail!("The {} must be between {} and {} characters", field, min, max);
    }
    Ok(())
}

/// JSON-file backed list of [`ParameterStorage`] records
#[derive(Debug, Clone)]
pub struct ParameterStorageRegistry {
    path: PathBuf,
}

impl ParameterStorageRegistry {
    /// Registry stored in `data_dir`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STORAGES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved storages in insertion order.
    ///
    /// A missing or unreadable file reads as an empty list.
    pub fn list(&self) -> Vec<ParameterStorage> {
        if !self.path.exists() {
            return Vec::new();
        }

        let parsed = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read parameter storages from {:?}", self.path))
            .and_then(|contents| {
                serde_json::from_str::<Vec<ParameterStorage>>(&contents)
                    .with_context(|| format!("Failed to parse parameter storages from {:?}", self.path))
            });

        match parsed {
            Ok(storages) => storages,
            Err(e) => {
                tracing::warn!("{:#}", e);
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<ParameterStorage> {
        self.list().into_iter().find(|s| s.id == id)
    }

    /// Save a new storage under a fresh id
    pub fn add(&self, description: &str, path: &str) -> Result<ParameterStorage> {
        let storage = ParameterStorage {
            id: Uuid::new_v4(),
            description: description.trim().to_string(),
            path: path.trim().to_string(),
        };
        storage.validate()?;

        let mut storages = self.list();
        storages.push(storage.clone());
        self.save(&storages)?;

        tracing::info!("Added parameter storage '{}' -> {}", storage.description, storage.path);
        Ok(storage)
    }

    /// Replace the storage with the same id. Returns `false` if there is none.
    pub fn update(&self, storage: &ParameterStorage) -> Result<bool> {
        storage.validate()?;

        let mut storages = self.list();
        let Some(existing) = storages.iter_mut().find(|s| s.id == storage.id) else {
            return Ok(false);
        };
        *existing = storage.clone();
        self.save(&storages)?;
        Ok(true)
    }

    /// Remove the storage with `id`. Returns `false` if there is none.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let mut storages = self.list();
        let before = storages.len();
        storages.retain(|s| s.id != id);
        if storages.len() == before {
            return Ok(false);
        }

        self.save(&storages)?;
        tracing::info!("Deleted parameter storage {}", id);
        Ok(true)
    }

    fn save(&self, storages: &[ParameterStorage]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(storages).context("Failed to serialize parameter storages")?;

        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write parameter storages to {:?}", self.path))?;

        tracing::debug!("Saved {} parameter storages to {:?}", storages.len(), self.path);
        Ok(())
    }
}
