// SPDX-License-Identifier: GPL-3.0-only

//! Logical volume creation and extent allocation
//!
//! [`create_logical_volume`] maps a requested number of logical extents onto
//! free physical extents of a [`VolumeGroup`](lvm_types::VolumeGroup):
//!
//! 1. an [`AreaMapper`] reports the free runs of each acceptable PV
//! 2. an [`AllocPolicy`] chosen from the request places the extents
//! 3. on success the new LV is committed to the VG's accounting
//!
//! A failed request leaves the VG and the caller's area maps untouched.

pub mod error;
pub mod lv_create;
pub mod policy;
pub mod pv_map;

pub use error::{AllocError, AllocErrorKind, Result};
pub use lv_create::{LvRequest, allocate_with_maps, create_logical_volume};
pub use policy::AllocPolicy;
pub use pv_map::{AreaMapper, FreeAreaMapper, PvArea, PvMap, StaticAreaMapper, total_free};
