//! Store configuration

use crate::error::{StoreError, StoreResult};
use crate::schema::TableKind;
use std::path::{Path, PathBuf};

const MEMORY_PATH: &str = ":memory:";

/// Where a collection lives: its table name and backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Collection name, used verbatim as the table name
    pub name: String,
    /// Path to the backing database file
    pub path: PathBuf,
}

impl StoreConfig {
    /// Create a config with an explicit backing file
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Private in-memory database, gone when the store closes
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, MEMORY_PATH)
    }

    /// Backing file `<dir>/<name><suffix>` for the given store variant
    pub fn in_directory(name: impl Into<String>, dir: impl AsRef<Path>, kind: TableKind) -> Self {
        let name = name.into();
        let path = dir
            .as_ref()
            .join(format!("{}{}", name, kind.file_suffix()));
        Self { name, path }
    }

    /// Backing file in the platform data directory
    pub fn default_location(name: impl Into<String>, kind: TableKind) -> StoreResult<Self> {
        let name = name.into();
        let dir = dirs::data_dir().ok_or_else(|| StoreError::Open {
            path: PathBuf::from(format!("{}{}", name, kind.file_suffix())),
            reason: "no data directory for this platform".to_string(),
        })?;
        Ok(Self::in_directory(name, dir, kind))
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}
