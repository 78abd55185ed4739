// SPDX-License-Identifier: GPL-3.0-only

//! Free-extent maps of physical volumes
//!
//! A [`PvMap`] lists the free runs ([`PvArea`]) of one PV for a single
//! allocation attempt. Policies consume areas by shrinking or removing them.

use lvm_types::{PvHandle, VolumeGroup};
use serde::{Deserialize, Serialize};

use crate::error::{AllocError, Result};

/// Contiguous run of free physical extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvArea {
    pub start: u32,
    pub count: u32,
}

impl PvArea {
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvMap {
    pub pv: PvHandle,
    pub areas: Vec<PvArea>,
}

impl PvMap {
    pub fn free_extents(&self) -> u64 {
        self.areas.iter().map(|area| u64::from(area.count)).sum()
    }
}

/// Free extents across all maps.
pub fn total_free(maps: &[PvMap]) -> u64 {
    maps.iter().map(PvMap::free_extents).sum()
}

/// Source of per-PV free-area maps for an allocation.
pub trait AreaMapper {
    /// Build maps for the PVs of `vg`, restricted to `acceptable` unless it
    /// is empty. PVs are returned in the order allocation should try them.
    fn create_pv_maps(&self, vg: &VolumeGroup, acceptable: &[PvHandle]) -> Result<Vec<PvMap>>;
}

/// Derives free areas from the extents already used by the VG's LVs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeAreaMapper;

fn free_runs(used: &[bool]) -> Vec<PvArea> {
    let mut areas = Vec::new();
    let mut run_start = None;

    for (pe, &is_used) in used.iter().enumerate() {
        match (is_used, run_start) {
            (false, None) => run_start = Some(pe),
            (true, Some(start)) => {
                areas.push(PvArea::new(start as u32, (pe - start) as u32));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        areas.push(PvArea::new(start as u32, (used.len() - start) as u32));
    }

    areas
}

/// Validate `acceptable` against `vg` and drop repeats, keeping the caller's order.
fn acceptable_order(vg: &VolumeGroup, acceptable: &[PvHandle]) -> Result<Vec<PvHandle>> {
    let mut ordered = Vec::with_capacity(acceptable.len());
    for &handle in acceptable {
        if vg.pv(handle).is_none() {
            return Err(AllocError::AreaMap(format!(
                "physical volume #{} is not part of volume group {}",
                handle.0, vg.name
            )));
        }
        if !ordered.contains(&handle) {
            ordered.push(handle);
        }
    }
    Ok(ordered)
}

/// Positions in `maps` allocation should try, in acceptable-list order.
///
/// An empty `acceptable` keeps every map in its current order.
pub(crate) fn acceptable_positions(
    vg: &VolumeGroup,
    maps: &[PvMap],
    acceptable: &[PvHandle],
) -> Result<Vec<usize>> {
    if acceptable.is_empty() {
        return Ok((0..maps.len()).collect());
    }

    Ok(acceptable_order(vg, acceptable)?
        .into_iter()
        .filter_map(|handle| maps.iter().position(|map| map.pv == handle))
        .collect())
}

impl AreaMapper for FreeAreaMapper {
    fn create_pv_maps(&self, vg: &VolumeGroup, acceptable: &[PvHandle]) -> Result<Vec<PvMap>> {
        let candidates: Vec<PvHandle> = if acceptable.is_empty() {
            vg.pv_handles().collect()
        } else {
            acceptable_order(vg, acceptable)?
        };

        let mut maps = Vec::new();
        for handle in candidates {
            let Some(pv) = vg.pv(handle) else { continue };
            if !pv.allocatable {
                continue;
            }

            let areas = free_runs(&vg.used_extents(handle));
            if !areas.is_empty() {
                maps.push(PvMap { pv: handle, areas });
            }
        }

        Ok(maps)
    }
}

/// Hands out a fixed set of maps, filtered and ordered by the acceptable PVs.
#[derive(Debug, Clone, Default)]
pub struct StaticAreaMapper {
    maps: Vec<PvMap>,
}

impl StaticAreaMapper {
    pub fn new(maps: Vec<PvMap>) -> Self {
        Self { maps }
    }
}

impl AreaMapper for StaticAreaMapper {
    fn create_pv_maps(&self, vg: &VolumeGroup, acceptable: &[PvHandle]) -> Result<Vec<PvMap>> {
        Ok(acceptable_positions(vg, &self.maps, acceptable)?
            .into_iter()
            .map(|position| self.maps[position].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use enumflags2::BitFlags;
    use lvm_types::{ExtentMapping, LogicalVolume, PhysicalVolume};

    use super::*;

    fn vg_with_used(pe_count: u32, used: &[u32]) -> (VolumeGroup, PvHandle) {
        let mut vg = VolumeGroup::new("vg0", 8, 8);
        let pv = vg.add_pv(PhysicalVolume::new("/dev/sda2", pe_count));
        if !used.is_empty() {
            let mut lv = LogicalVolume::new("used", BitFlags::empty(), 1, 0, used.len() as u32, 8);
            lv.map = used.iter().map(|&pe| ExtentMapping { pv, pe }).collect();
            vg.commit_lv(lv);
        }
        (vg, pv)
    }

    #[test]
    fn free_runs_split_around_used_extents() {
        let used = [true, false, false, true, false];
        assert_eq!(
            free_runs(&used),
            vec![PvArea::new(1, 2), PvArea::new(4, 1)]
        );
        assert!(free_runs(&[true, true]).is_empty());
        assert_eq!(free_runs(&[false; 3]), vec![PvArea::new(0, 3)]);
    }

    #[test]
    fn empty_pv_maps_to_a_single_area() {
        let (vg, pv) = vg_with_used(10, &[]);
        let maps = FreeAreaMapper.create_pv_maps(&vg, &[]).expect("maps");
        assert_eq!(
            maps,
            vec![PvMap {
                pv,
                areas: vec![PvArea::new(0, 10)]
            }]
        );
        assert_eq!(total_free(&maps), 10);
    }

    #[test]
    fn full_and_unallocatable_pvs_are_left_out() {
        let (mut vg, _) = vg_with_used(2, &[0, 1]);
        let mut spare = PhysicalVolume::new("/dev/sdc1", 4);
        spare.allocatable = false;
        vg.add_pv(spare);

        assert!(FreeAreaMapper.create_pv_maps(&vg, &[]).expect("maps").is_empty());
    }

    #[test]
    fn acceptable_list_orders_and_filters_pvs() {
        let mut vg = VolumeGroup::new("vg0", 8, 8);
        let a = vg.add_pv(PhysicalVolume::new("/dev/sda2", 4));
        let b = vg.add_pv(PhysicalVolume::new("/dev/sdb1", 4));
        vg.add_pv(PhysicalVolume::new("/dev/sdc1", 4));

        let maps = FreeAreaMapper.create_pv_maps(&vg, &[b, a, b]).expect("maps");
        let order: Vec<PvHandle> = maps.iter().map(|map| map.pv).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn foreign_pv_handle_is_rejected() {
        let (vg, _) = vg_with_used(4, &[]);
        let error = FreeAreaMapper
            .create_pv_maps(&vg, &[PvHandle(7)])
            .expect_err("unknown pv");
        assert!(matches!(error, AllocError::AreaMap(_)));
    }

    #[test]
    fn static_maps_follow_the_same_acceptable_rules() {
        let mut vg = VolumeGroup::new("vg0", 8, 8);
        let a = vg.add_pv(PhysicalVolume::new("/dev/sda2", 4));
        let b = vg.add_pv(PhysicalVolume::new("/dev/sdb1", 4));
        let mapper = StaticAreaMapper::new(
            [a, b]
                .into_iter()
                .map(|pv| PvMap {
                    pv,
                    areas: vec![PvArea::new(0, 4)],
                })
                .collect(),
        );

        let maps = mapper.create_pv_maps(&vg, &[b, a, b]).expect("maps");
        let order: Vec<PvHandle> = maps.iter().map(|map| map.pv).collect();
        assert_eq!(order, vec![b, a]);

        let error = mapper
            .create_pv_maps(&vg, &[a, PvHandle(7)])
            .expect_err("unknown pv");
        assert!(matches!(error, AllocError::AreaMap(_)));
    }
}
