// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for device cache operations
///
/// Lookups never fail: a device that cannot be found is a miss, not an error.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("device handle does not belong to this cache")]
    StaleHandle,

    #[error("device cache has not been scanned yet")]
    NotScanned,
}

/// Result type alias for device cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
