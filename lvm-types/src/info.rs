// SPDX-License-Identifier: GPL-3.0-only

//! Read-only summaries of VG entities
//!
//! Sizes are reported in bytes so they can be shown or serialized without
//! knowing the VG's extent size.

use serde::{Deserialize, Serialize};

use crate::lvm::{LogicalVolume, PhysicalVolume, PvHandle, VolumeGroup};

/// Bytes per sector; extent sizes are expressed in sectors.
pub const SECTOR_SIZE: u64 = 512;

/// Volume group information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupInfo {
    /// Volume group name
    pub name: String,

    /// Total size in bytes
    pub size: u64,

    /// Free space in bytes
    pub free: u64,

    /// Number of physical volumes
    pub pv_count: u32,

    /// Number of logical volumes
    pub lv_count: u32,

    /// Maximum number of logical volumes
    pub max_lv: u32,
}

impl VolumeGroupInfo {
    /// Get used space in bytes
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }

    /// Get usage percentage (0-100)
    pub fn usage_percent(&self) -> u32 {
        if self.size == 0 {
            0
        } else {
            ((self.used() as f64 / self.size as f64) * 100.0) as u32
        }
    }
}

/// Logical volume information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumeInfo {
    /// Logical volume name
    pub name: String,

    /// Parent volume group name
    pub vg_name: String,

    /// Logical volume UUID, empty until assigned
    pub uuid: String,

    /// Size in bytes
    pub size: u64,

    pub extent_count: u32,

    /// Number of distinct PVs backing the volume
    pub pv_count: u32,
}

impl LogicalVolumeInfo {
    /// Short form: vg/lv
    pub fn display_name(&self) -> String {
        if self.vg_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.vg_name, self.name)
        }
    }
}

/// Physical volume information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolumeInfo {
    /// Device path (e.g., "/dev/sda1")
    pub device: String,

    /// Total size in bytes
    pub size: u64,

    /// Free space in bytes
    pub free: u64,
}

impl PhysicalVolumeInfo {
    /// Get used space in bytes
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }
}

fn extents_to_bytes(extents: u64, extent_size: u32) -> u64 {
    extents * u64::from(extent_size) * SECTOR_SIZE
}

impl VolumeGroup {
    pub fn info(&self) -> VolumeGroupInfo {
        VolumeGroupInfo {
            name: self.name.clone(),
            size: extents_to_bytes(u64::from(self.extent_count), self.extent_size),
            free: extents_to_bytes(u64::from(self.free_count), self.extent_size),
            pv_count: self.pvs.len() as u32,
            lv_count: self.lv_count,
            max_lv: self.max_lv,
        }
    }

    pub fn pv_info(&self, handle: PvHandle) -> Option<PhysicalVolumeInfo> {
        let pv = self.pv(handle)?;
        let used = self.used_extents(handle).iter().filter(|used| **used).count() as u64;
        Some(pv.info(self.extent_size, used))
    }
}

impl PhysicalVolume {
    pub fn info(&self, extent_size: u32, used_extents: u64) -> PhysicalVolumeInfo {
        let total = u64::from(self.pe_count);
        PhysicalVolumeInfo {
            device: self.name.clone(),
            size: extents_to_bytes(total, extent_size),
            free: extents_to_bytes(total.saturating_sub(used_extents), extent_size),
        }
    }
}

impl LogicalVolume {
    pub fn info(&self, vg: &VolumeGroup) -> LogicalVolumeInfo {
        let mut pvs: Vec<PvHandle> = self.map.iter().map(|mapping| mapping.pv).collect();
        pvs.sort();
        pvs.dedup();

        LogicalVolumeInfo {
            name: self.name.clone(),
            vg_name: vg.name.clone(),
            uuid: self.id.map(|id| id.to_string()).unwrap_or_default(),
            size: self.size * SECTOR_SIZE,
            extent_count: self.extent_count,
            pv_count: pvs.len() as u32,
        }
    }
}
