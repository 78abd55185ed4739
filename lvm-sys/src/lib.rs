// SPDX-License-Identifier: GPL-3.0-only

//! Block device discovery for the volume manager
//!
//! This crate resolves device identifiers to filesystem paths and back:
//! - Parsing the kernel device registry (`/proc/devices`) into the set of
//!   block-device majors worth looking at
//! - Scanning device directories (`/dev` by default) for block nodes
//! - Indexing discovered nodes by path and by device number
//!
//! All filesystem access goes through the [`DeviceProbe`] trait, so the
//! cache can run against the host or against an in-memory tree.

pub mod cache;
pub mod config;
pub mod error;
pub mod probe;
pub mod registry;
pub mod table;

pub use cache::{DeviceCache, Devices};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use probe::{DeviceProbe, HostProbe, MemoryProbe, NodeInfo, NodeKind};
pub use registry::{VALID_DEVICE_NAMES, ValidMajors, parse_valid_majors, read_valid_majors};
pub use table::{DeviceHandle, DeviceTable};
