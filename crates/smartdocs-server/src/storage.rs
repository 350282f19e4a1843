//! JSON persistence for the data directory
//!
//! Each store keeps its whole state in one JSON file under the data
//! directory. Writes go to a sibling temp file first and are renamed into
//! place, so a crash never leaves a half-written file behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// A JSON file owned by one store.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    /// `<data_dir>/<name>`; creates the directory if needed.
    pub fn in_dir(data_dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored value, or `None` if nothing was written yet.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            Error::StoreParse(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Some(value))
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let content =
            serde_json::to_string_pretty(value).map_err(|e| Error::StoreParse(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Saved");
        Ok(())
    }
}
