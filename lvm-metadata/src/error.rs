// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad class of an allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocErrorKind {
    /// The request itself is malformed
    Parameter,
    /// Not enough free extents, by accounting or in the area maps
    Capacity,
    /// The VG cannot hold another LV
    Limit,
    PolicyUnimplemented,
    /// Free areas could not be mapped
    Allocation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("attempt to create a logical volume with zero extents")]
    ZeroExtents,

    #[error("logical volume name must not be empty")]
    InvalidName,

    #[error("logical volume \"{0}\" already exists in volume group")]
    DuplicateName(String),

    #[error("insufficient free extents in volume group: {requested} requested, {free} free")]
    InsufficientFreeExtents { requested: u32, free: u32 },

    #[error(
        "insufficient free extents to allocate logical volume: {allocated} of {requested} found"
    )]
    InsufficientSpace { requested: u32, allocated: u32 },

    #[error("maximum logical volumes ({max_lv}) already reached for this volume group")]
    MaxLvReached { max_lv: u32 },

    #[error("{policy} allocation not implemented yet")]
    PolicyUnimplemented { policy: &'static str },

    #[error("couldn't create extent mappings: {0}")]
    AreaMap(String),
}

impl AllocError {
    pub fn kind(&self) -> AllocErrorKind {
        match self {
            Self::ZeroExtents | Self::InvalidName | Self::DuplicateName(_) => {
                AllocErrorKind::Parameter
            }
            Self::InsufficientFreeExtents { .. } | Self::InsufficientSpace { .. } => {
                AllocErrorKind::Capacity
            }
            Self::MaxLvReached { .. } => AllocErrorKind::Limit,
            Self::PolicyUnimplemented { .. } => AllocErrorKind::PolicyUnimplemented,
            Self::AreaMap(_) => AllocErrorKind::Allocation,
        }
    }
}

pub type Result<T> = std::result::Result<T, AllocError>;
