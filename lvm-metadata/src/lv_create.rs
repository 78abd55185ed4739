// SPDX-License-Identifier: GPL-3.0-only

//! Logical volume creation

use enumflags2::BitFlags;
use lvm_types::{LogicalVolume, LvHandle, LvStatus, PvHandle, VolumeGroup};
use tracing::{error, info};

use crate::error::{AllocError, Result};
use crate::policy::AllocPolicy;
use crate::pv_map::{AreaMapper, PvMap, acceptable_positions};

/// Parameters of a new logical volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvRequest {
    pub name: String,
    pub status: BitFlags<LvStatus>,
    pub stripes: u32,
    /// Stripe size in sectors
    pub stripe_size: u32,
    pub extent_count: u32,
    /// PVs the volume may be placed on; empty means any PV of the VG
    pub acceptable_pvs: Vec<PvHandle>,
}

impl LvRequest {
    /// Linear read-write volume that may use any PV.
    pub fn new(name: impl Into<String>, extent_count: u32) -> Self {
        Self {
            name: name.into(),
            status: LvStatus::Read | LvStatus::Write,
            stripes: 1,
            stripe_size: 0,
            extent_count,
            acceptable_pvs: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: BitFlags<LvStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn striped(mut self, stripes: u32, stripe_size: u32) -> Self {
        self.stripes = stripes;
        self.stripe_size = stripe_size;
        self
    }

    pub fn on_pvs(mut self, pvs: impl IntoIterator<Item = PvHandle>) -> Self {
        self.acceptable_pvs = pvs.into_iter().collect();
        self
    }

    pub fn policy(&self) -> AllocPolicy {
        AllocPolicy::select(self.stripes, self.stripe_size, self.status)
    }
}

fn check_request(vg: &VolumeGroup, request: &LvRequest) -> Result<()> {
    if request.extent_count == 0 {
        return Err(AllocError::ZeroExtents);
    }

    if vg.free_count < request.extent_count {
        return Err(AllocError::InsufficientFreeExtents {
            requested: request.extent_count,
            free: vg.free_count,
        });
    }

    if vg.is_at_lv_limit() {
        return Err(AllocError::MaxLvReached { max_lv: vg.max_lv });
    }

    if request.name.is_empty() {
        return Err(AllocError::InvalidName);
    }

    if vg.find_lv(&request.name).is_some() {
        return Err(AllocError::DuplicateName(request.name.clone()));
    }

    Ok(())
}

fn place(vg: &mut VolumeGroup, request: &LvRequest, maps: &mut Vec<PvMap>) -> Result<LvHandle> {
    let mut lv = LogicalVolume::new(
        request.name.clone(),
        request.status,
        request.stripes,
        request.stripe_size,
        request.extent_count,
        vg.extent_size,
    );

    let policy = request.policy();
    policy.allocate(&mut lv, maps)?;

    let handle = vg.commit_lv(lv);
    info!(
        "created logical volume {}/{} ({} extents, {} policy)",
        vg.name, request.name, request.extent_count, policy
    );
    Ok(handle)
}

fn log_failure(vg: &VolumeGroup, request: &LvRequest, failure: &AllocError) {
    error!(
        "cannot create logical volume {}/{}: {failure}",
        vg.name, request.name
    );
}

/// Create an LV in `vg`, asking `mapper` for the free areas to use.
///
/// On success the LV is linked into the VG, `lv_count` grows by one and
/// `free_count` drops by the requested extents. On failure nothing changes.
pub fn create_logical_volume(
    vg: &mut VolumeGroup,
    request: &LvRequest,
    mapper: &dyn AreaMapper,
) -> Result<LvHandle> {
    let result = check_request(vg, request).and_then(|()| {
        let mut maps = mapper
            .create_pv_maps(vg, &request.acceptable_pvs)
            .map_err(|failure| match failure {
                failure @ AllocError::AreaMap(_) => failure,
                other => AllocError::AreaMap(other.to_string()),
            })?;
        place(vg, request, &mut maps)
    });

    if let Err(failure) = &result {
        log_failure(vg, request, failure);
    }
    result
}

/// Create an LV from area maps the caller keeps across allocations.
///
/// The maps are consumed only when the allocation succeeds. The acceptable
/// PV list of `request` picks which maps are tried and in what order, with
/// the same rules as [`AreaMapper`] implementations.
pub fn allocate_with_maps(
    vg: &mut VolumeGroup,
    request: &LvRequest,
    maps: &mut Vec<PvMap>,
) -> Result<LvHandle> {
    let result = check_request(vg, request).and_then(|()| {
        if request.acceptable_pvs.is_empty() {
            return place(vg, request, maps);
        }

        let positions = acceptable_positions(vg, maps, &request.acceptable_pvs)?;
        let mut selected: Vec<PvMap> = positions.iter().map(|&p| maps[p].clone()).collect();

        let handle = place(vg, request, &mut selected)?;
        for (position, map) in positions.into_iter().zip(selected) {
            maps[position] = map;
        }
        Ok(handle)
    });

    if let Err(failure) = &result {
        log_failure(vg, request, failure);
    }
    result
}
