// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document settings, stored as RON.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings that shape how a document keeps history and reads files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// zstd level used for history snapshots
    pub compression_level: i32,
    /// Update items with a known UID in place when reading, instead of recreating everything
    pub deserialize_inplace: bool,
    /// Drop unreachable snapshots after every commit
    pub prune_on_commit: bool,
    /// Number of undo steps whose snapshots are kept; `None` keeps all
    pub history_limit: Option<usize>,
    /// Open documents read-only
    pub readonly: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            deserialize_inplace: true,
            prune_on_commit: false,
            history_limit: None,
            readonly: false,
        }
    }
}

impl DocumentConfig {
    /// Parse from RON text
    pub fn from_ron(text: &str) -> Result<Self, DocumentError> {
        ron::from_str(text).map_err(|e| DocumentError::Config(e.to_string()))
    }

    /// Render as pretty RON
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        ron::ser::to_string_pretty(self, config).map_err(|e| DocumentError::Config(e.to_string()))
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&content)?;
        tracing::debug!("loaded document config from {}", path.display());
        Ok(config)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let content = self.to_ron()?;
        std::fs::write(path, content).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builder: history limit
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Builder: read-only
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Builder: in-place deserialization
    pub fn with_deserialize_inplace(mut self, inplace: bool) -> Self {
        self.deserialize_inplace = inplace;
        self
    }
}
