//! Backend selection for the document store, cache and vector index.

use serde::{Deserialize, Serialize};

use super::common::ConfigError;

/// Which implementation of the store accessors to wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local maps. Nothing survives a restart.
    #[default]
    Memory,
    /// One redb file shared by the three stores.
    Redb,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoresConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// redb file for the `redb` backend. May equal
    /// `workflow.checkpoint_path`, in which case one database is shared.
    #[serde(default = "default_stores_path")]
    pub path: String,
}

fn default_stores_path() -> String {
    "data/stores.redb".to_string()
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_stores_path(),
        }
    }
}

impl StoresConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Redb && self.path.is_empty() {
            return Err(ConfigError::validation(
                "stores.path",
                "required when stores.backend is redb",
            ));
        }
        Ok(())
    }
}
