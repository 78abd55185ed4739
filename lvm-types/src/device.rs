// SPDX-License-Identifier: GPL-3.0-only

//! Block device identity

use std::fmt;
use std::path::{Path, PathBuf};

use nix::sys::stat::{major, makedev, minor};
use serde::{Deserialize, Serialize};

/// Kernel device number (`dev_t`) identifying a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceNumber(pub u64);

impl DeviceNumber {
    pub fn new(major_number: u32, minor_number: u32) -> Self {
        Self(makedev(u64::from(major_number), u64::from(minor_number)) as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Driver class of the device.
    pub fn major(self) -> u32 {
        major(self.0 as _) as u32
    }

    pub fn minor(self) -> u32 {
        minor(self.0 as _) as u32
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// A discovered device node: one path alias of a device number.
///
/// Several `Device` records may share a device number (symlinks, bind
/// mounts); each path appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Filesystem path of the node (e.g., "/dev/sda1")
    pub name: PathBuf,

    /// Device number the path resolved to when last seen
    pub dev: DeviceNumber,
}

impl Device {
    pub fn new(name: impl Into<PathBuf>, dev: DeviceNumber) -> Self {
        Self {
            name: name.into(),
            dev,
        }
    }

    pub fn path(&self) -> &Path {
        &self.name
    }
}
