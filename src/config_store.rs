//! Persisted provisioning record.
//!
//! A single JSON object holding the remote identifiers created on first
//! start. The file is read whole and overwritten whole; there is no locking
//! and no atomic rename, so only one process should own it.
//!
//! [`ConfigStore::ephemeral`] keeps the record in memory instead, for
//! providers whose ids are gone once the process exits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// The identifiers that make provisioning idempotent across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    /// Keys written by other tools; kept so a save does not drop them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigRecord {
    pub fn vector_store_id(&self) -> Option<&str> {
        non_empty(&self.vector_store_id)
    }

    pub fn assistant_id(&self) -> Option<&str> {
        non_empty(&self.assistant_id)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Where the record lives.
#[derive(Debug)]
enum Backing {
    File(PathBuf),
    /// Held for the life of the process only.
    Memory(Mutex<ConfigRecord>),
}

#[derive(Debug)]
pub struct ConfigStore {
    backing: Backing,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// A store that never touches disk. Pairs with providers whose remote
    /// ids do not outlive the process.
    pub fn ephemeral() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(ConfigRecord::default())),
        }
    }

    /// The backing file, or `None` for an ephemeral store.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Reads the record. A missing file is an empty record.
    pub fn load(&self) -> Result<ConfigRecord> {
        let path = match &self.backing {
            Backing::File(path) => path,
            Backing::Memory(record) => return Ok(record.lock().unwrap().clone()),
        };
        if !path.exists() {
            log::debug!("no config at {}, starting empty", path.display());
            return Ok(ConfigRecord::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigCorrupt {
            path: path.clone(),
            source,
        })
    }

    /// Overwrites the stored record with `record`.
    pub fn save(&self, record: &ConfigRecord) -> Result<()> {
        let path = match &self.backing {
            Backing::File(path) => path,
            Backing::Memory(stored) => {
                *stored.lock().unwrap() = record.clone();
                return Ok(());
            }
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(record).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
