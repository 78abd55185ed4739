// SPDX-License-Identifier: GPL-3.0-only

//! Device cache configuration
//!
//! Read from the `[dev-mgr]` table of a TOML file:
//!
//! ```toml
//! [dev-mgr]
//! base_dir = "/dev"
//! registry = "/proc/devices"
//! table_size_hint = 128
//! ```
//!
//! Every key is optional; a missing file section yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

pub const DEFAULT_BASE_DIR: &str = "/dev";
pub const DEFAULT_REGISTRY: &str = "/proc/devices";
pub const DEFAULT_TABLE_SIZE_HINT: u32 = 128;

const SECTION: &str = "dev-mgr";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory scanned for device nodes
    pub base_dir: PathBuf,

    /// Kernel device registry listing driver majors
    pub registry: PathBuf,

    /// Expected number of device nodes; fixes the hash table size
    pub table_size_hint: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            registry: PathBuf::from(DEFAULT_REGISTRY),
            table_size_hint: DEFAULT_TABLE_SIZE_HINT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "dev-mgr", default)]
    dev_mgr: CacheConfig,
}

impl CacheConfig {
    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(raw)?;
        Ok(file.dev_mgr)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| CacheError::Config {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        Self::from_toml_str(&raw).map_err(|error| CacheError::Config {
            path: path.to_path_buf(),
            reason: format!("[{SECTION}] {error}"),
        })
    }

    /// Roots scanned by a full scan, in scan order.
    pub fn base_dirs(&self) -> Vec<PathBuf> {
        vec![self.base_dir.clone()]
    }
}
