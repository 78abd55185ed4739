// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the LVM identification and allocation core
//!
//! These models are shared by both halves of the stack:
//!
//! - **lvm-sys**: the device cache hands out [`Device`] records keyed by
//!   path and by [`DeviceNumber`]
//! - **lvm-metadata**: the extent allocator mutates [`VolumeGroup`] and
//!   builds [`LogicalVolume`] extent maps
//!
//! ## Handles
//!
//! Entities owned by a volume group are referenced through index handles
//! ([`PvHandle`], [`LvHandle`]) rather than references, so a whole VG can be
//! moved, cloned or dropped as a unit.

pub mod device;
pub mod info;
pub mod lvm;

pub use device::{Device, DeviceNumber};
pub use info::{LogicalVolumeInfo, PhysicalVolumeInfo, SECTOR_SIZE, VolumeGroupInfo};
pub use lvm::{
    ExtentMapping, LogicalVolume, LvHandle, LvStatus, PhysicalVolume, PvHandle, VolumeGroup,
};
