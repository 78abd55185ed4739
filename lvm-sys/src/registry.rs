// SPDX-License-Identifier: GPL-3.0-only

//! Kernel device registry parsing
//!
//! `/proc/devices` lists driver majors in sections:
//!
//! ```text
//! Character devices:
//!   1 mem
//!
//! Block devices:
//!   8 sd
//!   9 md
//! ```
//!
//! Only majors from the block section whose driver name starts with a known
//! disk driver prefix are considered when filtering device nodes.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

/// Driver name prefixes of block devices that can carry physical volumes.
pub const VALID_DEVICE_NAMES: &[&str] = &[
    "ide",    // IDE disk
    "sd",     // SCSI disk
    "md",     // Multiple Disk driver (SoftRAID)
    "loop",   // Loop device
    "dasd",   // DASD disk (IBM S/390, zSeries)
    "dac960", // DAC960
    "nbd",    // Network Block Device
    "ida",    // Compaq SMART2
    "cciss",  // Compaq CCISS array
    "ubd",    // User-mode virtual block device
];

/// Set of block-device majors accepted by the device cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidMajors(BTreeSet<u32>);

impl ValidMajors {
    pub fn contains(&self, major: u32) -> bool {
        self.0.contains(&major)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for ValidMajors {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Leading decimal number of `text`, or 0 when there is none.
///
/// Digit runs beyond `u32::MAX` saturate, so only a missing number reads as 0.
fn leading_number(text: &str) -> u32 {
    text.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |value, digit| {
            value.saturating_mul(10).saturating_add(u32::from(digit - b'0'))
        })
}

fn is_valid_device_name(name: &str) -> bool {
    VALID_DEVICE_NAMES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub fn parse_valid_majors(text: &str) -> ValidMajors {
    let mut majors = BTreeSet::new();
    let mut in_block_section = false;

    for line in text.lines() {
        let line = line.trim_start_matches(' ');

        // A line without a leading number names a section.
        let major = leading_number(line);
        if major == 0 {
            in_block_section = line.starts_with('B');
            continue;
        }

        if !in_block_section {
            continue;
        }

        let name = line
            .trim_start_matches(|c: char| c != ' ')
            .trim_start_matches(' ');

        if is_valid_device_name(name) {
            majors.insert(major);
        }
    }

    ValidMajors(majors)
}

/// Read and parse the registry at `path`.
///
/// An unreadable registry leaves the cache with no valid majors, which makes
/// every device node ineligible rather than failing initialization.
pub fn read_valid_majors(path: &Path) -> ValidMajors {
    match fs::read_to_string(path) {
        Ok(text) => {
            let majors = parse_valid_majors(&text);
            debug!(
                "registry {} lists {} usable block majors",
                path.display(),
                majors.len()
            );
            majors
        }
        Err(error) => {
            warn!("cannot read device registry {}: {error}", path.display());
            ValidMajors::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_DEVICES: &str = "Character devices:\n  1 mem\n  4 /dev/vc/0\n  8 sdchar\n\nBlock devices:\n  7 loop\n  8 sd\n  9 md\n 11 sr\n 65 sd\n253 device-mapper\n259 blkext\n";

    #[test]
    fn keeps_only_whitelisted_block_majors() {
        let majors = parse_valid_majors(PROC_DEVICES);
        assert_eq!(majors.iter().collect::<Vec<_>>(), vec![7, 8, 9, 65]);
    }

    #[test]
    fn character_section_never_contributes() {
        let majors = parse_valid_majors("Character devices:\n  1 mem\n\nBlock devices:\n  8 sd\n  9 md\n");
        assert_eq!(majors.iter().collect::<Vec<_>>(), vec![8, 9]);
        assert!(!majors.contains(1));
    }

    #[test]
    fn any_non_block_header_closes_the_block_section() {
        let majors = parse_valid_majors("Block devices:\n  8 sd\nOther:\n  9 md\n");
        assert_eq!(majors.iter().collect::<Vec<_>>(), vec![8]);
    }

    #[test]
    fn names_match_by_prefix() {
        // "sdx" starts with "sd"; "s" is too short for any entry.
        let majors = parse_valid_majors("Block devices:\n 10 sdx\n 12 s\n 13 mdp\n");
        assert_eq!(majors.iter().collect::<Vec<_>>(), vec![10, 13]);
    }

    #[test]
    fn duplicate_majors_are_tolerated() {
        let majors = parse_valid_majors("Block devices:\n  8 sd\n  8 sd\n");
        assert_eq!(majors.len(), 1);
    }

    #[test]
    fn leading_number_behaves_like_atoi() {
        assert_eq!(leading_number("259 blkext"), 259);
        assert_eq!(leading_number("Block devices:"), 0);
        assert_eq!(leading_number(""), 0);
        assert_eq!(leading_number("99999999999 sd"), u32::MAX);
    }

    #[test]
    fn oversized_major_does_not_close_the_block_section() {
        let majors = parse_valid_majors("Block devices:\n 99999999999 blkext\n  8 sd\n  9 md\n");
        assert_eq!(majors.iter().collect::<Vec<_>>(), vec![8, 9]);
    }

    #[test]
    fn unreadable_registry_yields_empty_set() {
        assert!(read_valid_majors(Path::new("/nonexistent/devices")).is_empty());
    }
}
