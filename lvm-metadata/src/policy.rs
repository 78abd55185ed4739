// SPDX-License-Identifier: GPL-3.0-only

//! Extent placement policies
//!
//! Every policy works on a copy of the area maps. The caller's maps and the
//! LV's extent map are only replaced once the whole request is placed.

use std::fmt;

use enumflags2::BitFlags;
use lvm_types::{ExtentMapping, LogicalVolume, LvStatus};

use crate::error::{AllocError, Result};
use crate::pv_map::{PvMap, total_free};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    /// First fit over PVs and their areas, splitting the last area used
    Simple,
    /// Round-robin interleave across `stripes` PVs
    Striped { stripes: u32, stripe_size: u32 },
    /// One uninterrupted run of physical extents
    Contiguous,
}

impl AllocPolicy {
    pub fn select(stripes: u32, stripe_size: u32, status: BitFlags<LvStatus>) -> Self {
        if stripes > 1 {
            Self::Striped {
                stripes,
                stripe_size,
            }
        } else if status.contains(LvStatus::AllocContiguous) {
            Self::Contiguous
        } else {
            Self::Simple
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Striped { .. } => "striped",
            Self::Contiguous => "contiguous",
        }
    }

    /// Fill `lv.map` from `maps`, consuming the areas used.
    pub fn allocate(self, lv: &mut LogicalVolume, maps: &mut Vec<PvMap>) -> Result<()> {
        match self {
            Self::Simple => alloc_simple(lv, maps),
            Self::Striped { .. } | Self::Contiguous => {
                Err(AllocError::PolicyUnimplemented { policy: self.name() })
            }
        }
    }
}

impl fmt::Display for AllocPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn alloc_simple(lv: &mut LogicalVolume, maps: &mut Vec<PvMap>) -> Result<()> {
    let requested = lv.extent_count;
    let available = total_free(maps);
    if available < u64::from(requested) {
        return Err(AllocError::InsufficientSpace {
            requested,
            allocated: available as u32,
        });
    }

    let mut working = maps.clone();
    let mut placed: Vec<ExtentMapping> = Vec::with_capacity(requested as usize);
    let mut allocated = 0u32;

    for pvm in working.iter_mut() {
        if allocated == requested {
            break;
        }

        let pv = pvm.pv;
        pvm.areas.retain_mut(|area| {
            if allocated == requested {
                return true;
            }

            let count = area.count.min(requested - allocated);
            placed.extend((0..count).map(|offset| ExtentMapping {
                pv,
                pe: area.start + offset,
            }));
            allocated += count;

            // Split the area, or drop it once fully consumed.
            area.start += count;
            area.count -= count;
            area.count > 0
        });
    }

    if allocated != requested {
        return Err(AllocError::InsufficientSpace {
            requested,
            allocated,
        });
    }

    lv.map = placed;
    *maps = working;
    Ok(())
}

#[cfg(test)]
mod tests {
    use lvm_types::PvHandle;

    use super::*;
    use crate::pv_map::PvArea;

    fn lv(extents: u32) -> LogicalVolume {
        LogicalVolume::new("lv", BitFlags::empty(), 1, 0, extents, 8)
    }

    fn map(pv: u32, areas: &[(u32, u32)]) -> PvMap {
        PvMap {
            pv: PvHandle(pv),
            areas: areas
                .iter()
                .map(|&(start, count)| PvArea::new(start, count))
                .collect(),
        }
    }

    #[test]
    fn selection_prefers_stripes_then_contiguous() {
        assert_eq!(
            AllocPolicy::select(2, 64, LvStatus::AllocContiguous.into()),
            AllocPolicy::Striped {
                stripes: 2,
                stripe_size: 64
            }
        );
        assert_eq!(
            AllocPolicy::select(1, 0, LvStatus::Read | LvStatus::AllocContiguous),
            AllocPolicy::Contiguous
        );
        assert_eq!(AllocPolicy::select(1, 0, LvStatus::Read.into()), AllocPolicy::Simple);
        assert_eq!(AllocPolicy::select(0, 0, BitFlags::empty()), AllocPolicy::Simple);
    }

    #[test]
    fn partial_area_is_split_in_place() {
        let mut maps = vec![map(0, &[(0, 10)])];
        let mut volume = lv(4);

        AllocPolicy::Simple
            .allocate(&mut volume, &mut maps)
            .expect("allocation fits");

        let pes: Vec<u32> = volume.map.iter().map(|m| m.pe).collect();
        assert_eq!(pes, vec![0, 1, 2, 3]);
        assert!(volume.map.iter().all(|m| m.pv == PvHandle(0)));
        assert_eq!(maps[0].areas, vec![PvArea::new(4, 6)]);
    }

    #[test]
    fn consumed_areas_are_removed_and_allocation_spans_pvs() {
        let mut maps = vec![map(0, &[(2, 2), (8, 1)]), map(1, &[(0, 5)])];
        let mut volume = lv(5);

        AllocPolicy::Simple
            .allocate(&mut volume, &mut maps)
            .expect("allocation fits");

        let placed: Vec<(u32, u32)> = volume.map.iter().map(|m| (m.pv.0, m.pe)).collect();
        assert_eq!(placed, vec![(0, 2), (0, 3), (0, 8), (1, 0), (1, 1)]);
        assert!(maps[0].areas.is_empty());
        assert_eq!(maps[1].areas, vec![PvArea::new(2, 3)]);
    }

    #[test]
    fn exact_fit_stops_before_later_areas() {
        let mut maps = vec![map(0, &[(0, 3), (5, 5)])];
        let mut volume = lv(3);

        AllocPolicy::Simple
            .allocate(&mut volume, &mut maps)
            .expect("allocation fits");

        assert_eq!(maps[0].areas, vec![PvArea::new(5, 5)]);
    }

    #[test]
    fn shortfall_leaves_maps_and_lv_untouched() {
        let original = vec![map(0, &[(0, 2)]), map(1, &[(3, 1)])];
        let mut maps = original.clone();
        let mut volume = lv(4);

        let error = AllocPolicy::Simple
            .allocate(&mut volume, &mut maps)
            .expect_err("not enough space");

        assert_eq!(
            error,
            AllocError::InsufficientSpace {
                requested: 4,
                allocated: 3
            }
        );
        assert_eq!(maps, original);
        assert!(volume.map.is_empty());
    }

    #[test]
    fn striped_and_contiguous_are_unimplemented() {
        let mut maps = vec![map(0, &[(0, 10)])];
        for policy in [
            AllocPolicy::Striped {
                stripes: 2,
                stripe_size: 64,
            },
            AllocPolicy::Contiguous,
        ] {
            let error = policy
                .allocate(&mut lv(2), &mut maps)
                .expect_err("unimplemented");
            assert!(matches!(error, AllocError::PolicyUnimplemented { .. }));
        }
        assert_eq!(maps[0].areas, vec![PvArea::new(0, 10)]);
    }
}
