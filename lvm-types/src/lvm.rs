// SPDX-License-Identifier: GPL-3.0-only

//! Volume group, physical volume and logical volume entities
//!
//! A [`VolumeGroup`] owns its PVs and LVs. Extent maps refer to PVs through
//! [`PvHandle`], which is only meaningful for the VG that issued it.

use enumflags2::{BitFlags, bitflags};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceNumber;

/// Logical volume status and allocation flags.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LvStatus {
    Read = 1 << 0,
    Write = 1 << 1,
    Active = 1 << 2,
    /// Request a single uninterrupted run of physical extents
    AllocContiguous = 1 << 3,
    AllocStrict = 1 << 4,
    Snapshot = 1 << 5,
}

/// Index of a physical volume inside its volume group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PvHandle(pub u32);

impl PvHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a logical volume inside its volume group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LvHandle(pub u32);

impl LvHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Physical volume contributing extents to a volume group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolume {
    /// Device path (e.g., "/dev/sda2")
    pub name: String,

    /// Backing device, once resolved through the device cache
    pub device: Option<DeviceNumber>,

    /// Sector offset of the first physical extent
    pub pe_start: u64,

    /// Number of physical extents on this PV
    pub pe_count: u32,

    /// Whether new extents may be allocated here
    pub allocatable: bool,
}

impl PhysicalVolume {
    pub fn new(name: impl Into<String>, pe_count: u32) -> Self {
        Self {
            name: name.into(),
            device: None,
            pe_start: 0,
            pe_count,
            allocatable: true,
        }
    }
}

/// One logical extent's placement: which PV and which physical extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentMapping {
    pub pv: PvHandle,
    pub pe: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub name: String,

    /// Unset until an identity generator assigns one
    pub id: Option<Uuid>,

    pub status: BitFlags<LvStatus>,
    pub read_ahead: u32,
    pub stripes: u32,
    pub stripe_size: u32,

    /// Size in sectors
    pub size: u64,

    pub extent_count: u32,

    /// Entry `i` places logical extent `i`
    pub map: Vec<ExtentMapping>,
}

impl LogicalVolume {
    /// Build an unmapped LV of `extent_count` extents of `extent_size` sectors.
    pub fn new(
        name: impl Into<String>,
        status: BitFlags<LvStatus>,
        stripes: u32,
        stripe_size: u32,
        extent_count: u32,
        extent_size: u32,
    ) -> Self {
        Self {
            name: name.into(),
            id: None,
            status,
            read_ahead: 0,
            stripes,
            stripe_size,
            size: u64::from(extent_count) * u64::from(extent_size),
            extent_count,
            map: Vec::new(),
        }
    }

    pub fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    /// Assign a fresh random identity and return it.
    pub fn generate_id(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.id = Some(id);
        id
    }

    pub fn is_fully_mapped(&self) -> bool {
        self.map.len() == self.extent_count as usize
    }

    pub fn is_contiguous_requested(&self) -> bool {
        self.status.contains(LvStatus::AllocContiguous)
    }

    /// Number of logical extents placed on `pv`.
    pub fn extents_on(&self, pv: PvHandle) -> usize {
        self.map.iter().filter(|mapping| mapping.pv == pv).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub name: String,

    /// Extent size in sectors
    pub extent_size: u32,

    pub extent_count: u32,
    pub free_count: u32,
    pub lv_count: u32,
    pub max_lv: u32,

    pub pvs: Vec<PhysicalVolume>,
    pub lvs: Vec<LogicalVolume>,
}

impl VolumeGroup {
    pub fn new(name: impl Into<String>, extent_size: u32, max_lv: u32) -> Self {
        Self {
            name: name.into(),
            extent_size,
            extent_count: 0,
            free_count: 0,
            lv_count: 0,
            max_lv,
            pvs: Vec::new(),
            lvs: Vec::new(),
        }
    }

    /// Add an empty PV, growing the VG's total and free extent counts.
    pub fn add_pv(&mut self, pv: PhysicalVolume) -> PvHandle {
        let handle = PvHandle(self.pvs.len() as u32);
        self.extent_count += pv.pe_count;
        self.free_count += pv.pe_count;
        self.pvs.push(pv);
        handle
    }

    pub fn pv(&self, handle: PvHandle) -> Option<&PhysicalVolume> {
        self.pvs.get(handle.index())
    }

    pub fn pv_handles(&self) -> impl Iterator<Item = PvHandle> + '_ {
        (0..self.pvs.len()).map(|index| PvHandle(index as u32))
    }

    pub fn lv(&self, handle: LvHandle) -> Option<&LogicalVolume> {
        self.lvs.get(handle.index())
    }

    pub fn lv_mut(&mut self, handle: LvHandle) -> Option<&mut LogicalVolume> {
        self.lvs.get_mut(handle.index())
    }

    pub fn find_lv(&self, name: &str) -> Option<LvHandle> {
        self.lvs
            .iter()
            .position(|lv| lv.name == name)
            .map(|index| LvHandle(index as u32))
    }

    /// Link a fully mapped LV into the group and charge its extents.
    ///
    /// This is the only place `lv_count` and `free_count` change.
    pub fn commit_lv(&mut self, lv: LogicalVolume) -> LvHandle {
        debug_assert!(lv.is_fully_mapped());
        debug_assert!(self.free_count >= lv.extent_count);

        let handle = LvHandle(self.lvs.len() as u32);
        self.lv_count += 1;
        self.free_count -= lv.extent_count;
        self.lvs.push(lv);
        handle
    }

    pub fn is_at_lv_limit(&self) -> bool {
        self.lv_count >= self.max_lv
    }

    /// Per-PV bitmap of physical extents already claimed by LV maps.
    pub fn used_extents(&self, handle: PvHandle) -> Vec<bool> {
        let Some(pv) = self.pv(handle) else {
            return Vec::new();
        };

        let mut used = vec![false; pv.pe_count as usize];
        for mapping in self.lvs.iter().flat_map(|lv| lv.map.iter()) {
            if mapping.pv == handle
                && let Some(slot) = used.get_mut(mapping.pe as usize)
            {
                *slot = true;
            }
        }
        used
    }
}
