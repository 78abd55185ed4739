// SPDX-License-Identifier: GPL-3.0-only

//! Device cache manager
//!
//! Discovery happens at most once per cache: the first [`DeviceCache::begin_scan`]
//! walks every base directory. Before that, `dev_by_name` may add single
//! paths on demand; after it, lookups are pure queries that never touch the
//! filesystem.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::iter::{FusedIterator, Rev};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Component, Path, PathBuf};
use std::slice;

use lvm_types::{Device, DeviceNumber};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::probe::{DeviceProbe, HostProbe, NodeInfo, NodeKind};
use crate::registry::{ValidMajors, parse_valid_majors, read_valid_majors};
use crate::table::{DeviceHandle, DeviceTable};

/// Directories entered during one scan, by (filesystem, inode).
type Visited = HashSet<(u64, u64)>;

pub struct DeviceCache<P: DeviceProbe = HostProbe> {
    probe: P,
    base_dirs: Vec<PathBuf>,
    valid_majors: ValidMajors,
    table: DeviceTable,
    has_scanned: bool,
}

impl DeviceCache<HostProbe> {
    /// Cache over the host filesystem, reading majors from `config.registry`.
    pub fn from_host(config: &CacheConfig) -> Self {
        let valid_majors = read_valid_majors(&config.registry);
        Self::with_valid_majors(config, valid_majors, HostProbe)
    }
}

impl<P: DeviceProbe> DeviceCache<P> {
    /// Build a cache from registry text already read by the caller.
    pub fn new(config: &CacheConfig, registry: &str, probe: P) -> Self {
        Self::with_valid_majors(config, parse_valid_majors(registry), probe)
    }

    pub fn with_valid_majors(config: &CacheConfig, valid_majors: ValidMajors, probe: P) -> Self {
        info!(
            "device cache over {:?} with {} valid majors",
            config.base_dirs(),
            valid_majors.len()
        );

        Self {
            probe,
            base_dirs: config.base_dirs(),
            valid_majors,
            table: DeviceTable::with_size_hint(config.table_size_hint as usize),
            has_scanned: false,
        }
    }

    pub fn has_scanned(&self) -> bool {
        self.has_scanned
    }

    pub fn valid_majors(&self) -> &ValidMajors {
        &self.valid_majors
    }

    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.base_dirs
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Number of distinct device numbers discovered.
    pub fn len(&self) -> usize {
        self.table.dev_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Look up a device by path.
    ///
    /// Until the full scan has run, an unknown path is probed (and, if it is
    /// a directory, scanned). Afterwards an unknown path is simply a miss.
    pub fn dev_by_name(&mut self, path: impl AsRef<Path>) -> Option<&Device> {
        let path = path.as_ref();
        let handle = match self.table.find_name(path) {
            Some(handle) => Some(handle),
            None if !self.has_scanned => self.add_named_device(path, &mut Visited::new()),
            None => None,
        };

        handle.and_then(|handle| self.table.get(handle).ok())
    }

    /// Look up the canonical device record for a device number.
    pub fn dev_by_dev(&self, dev: DeviceNumber) -> Option<&Device> {
        self.table
            .find_dev(dev)
            .and_then(|handle| self.table.get(handle).ok())
    }

    pub fn handle_by_name(&self, path: impl AsRef<Path>) -> Option<DeviceHandle> {
        self.table.find_name(path.as_ref())
    }

    pub fn get(&self, handle: DeviceHandle) -> Result<&Device> {
        self.table.get(handle)
    }

    /// Run the full scan if it has not run yet and iterate the devices.
    pub fn begin_scan(&mut self) -> Devices<'_> {
        if !self.has_scanned {
            self.full_scan();
        }
        Devices::new(&self.table)
    }

    /// Iterate devices of an already scanned cache.
    pub fn devices(&self) -> Result<Devices<'_>> {
        if !self.has_scanned {
            return Err(CacheError::NotScanned);
        }
        Ok(Devices::new(&self.table))
    }

    /// Scan every base directory; returns the number of distinct devices known.
    ///
    /// Only the first call walks the filesystem. Later calls report the
    /// current count until [`DeviceCache::teardown`] resets the cache.
    pub fn full_scan(&mut self) -> usize {
        if self.has_scanned {
            return self.table.dev_count();
        }

        let mut visited = Visited::new();
        for dir in self.base_dirs.clone() {
            match self.probe.stat(&dir) {
                Ok(node) if node.kind == NodeKind::Directory => {
                    self.dir_scan(&dir, node, &mut visited);
                }
                Ok(_) => warn!("device directory {} is not a directory", dir.display()),
                Err(error) => warn!("cannot scan device directory {}: {error}", dir.display()),
            }
        }

        self.has_scanned = true;
        info!(
            "device scan found {} devices under {} paths",
            self.table.dev_count(),
            self.table.name_count()
        );
        self.table.dev_count()
    }

    /// Forget every device and allow discovery to run again.
    ///
    /// Handles issued before the teardown are rejected afterwards.
    pub fn teardown(&mut self) {
        self.table.clear();
        self.has_scanned = false;
    }

    fn dir_scan(&mut self, dir: &Path, node: NodeInfo, visited: &mut Visited) {
        if !visited.insert((node.dev, node.ino)) {
            debug!("skipping already visited directory {}", dir.display());
            return;
        }

        let mut names = match self.probe.read_dir(dir) {
            Ok(names) => names,
            Err(error) => {
                warn!("cannot read directory {}: {error}", dir.display());
                return;
            }
        };
        names.sort();

        for name in names {
            let path = join_collapsed(dir, &name);
            self.add_named_device(&path, visited);
        }
    }

    fn add_named_device(&mut self, path: &Path, visited: &mut Visited) -> Option<DeviceHandle> {
        let node = match self.probe.stat(path) {
            Ok(node) => node,
            Err(error) => {
                debug!("failed to add '{}': {error}", path.display());
                return None;
            }
        };

        match node.kind {
            NodeKind::Directory => {
                if !is_hidden(path) {
                    self.dir_scan(path, node, visited);
                }
                None
            }
            NodeKind::BlockDevice if self.valid_majors.contains(node.rdev.major()) => {
                let handle = self.table.insert(path.to_path_buf(), node.rdev);
                debug!("added '{}' ({})", path.display(), node.rdev);
                Some(handle)
            }
            NodeKind::BlockDevice => {
                debug!(
                    "skipping '{}': major {} is not a known disk driver",
                    path.display(),
                    node.rdev.major()
                );
                None
            }
            NodeKind::Other => None,
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    match path.components().next_back() {
        Some(Component::Normal(name)) => name.as_bytes().first() == Some(&b'.'),
        Some(Component::CurDir | Component::ParentDir) => true,
        _ => false,
    }
}

/// Join `dir` and `name` with `/`, collapsing repeated slashes.
fn join_collapsed(dir: &Path, name: &OsStr) -> PathBuf {
    let mut joined = dir.as_os_str().as_bytes().to_vec();
    joined.push(b'/');
    joined.extend_from_slice(name.as_bytes());
    PathBuf::from(OsString::from_vec(collapse_slashes(&joined)))
}

fn collapse_slashes(path: &[u8]) -> Vec<u8> {
    let mut collapsed = Vec::with_capacity(path.len());
    for &byte in path {
        if byte == b'/' && collapsed.last() == Some(&b'/') {
            continue;
        }
        collapsed.push(byte);
    }
    collapsed
}

/// Discovered devices, most recently discovered first.
///
/// Forward-only: a fresh iterator comes from another `begin_scan` or
/// `devices` call.
pub struct Devices<'a> {
    table: &'a DeviceTable,
    order: Rev<slice::Iter<'a, u32>>,
}

impl<'a> Devices<'a> {
    fn new(table: &'a DeviceTable) -> Self {
        Self {
            table,
            order: table.canonical().iter().rev(),
        }
    }
}

impl<'a> Iterator for Devices<'a> {
    type Item = &'a Device;

    fn next(&mut self) -> Option<Self::Item> {
        self.order.next().map(|&index| self.table.record(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl ExactSizeIterator for Devices<'_> {}

impl FusedIterator for Devices<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MemoryProbe;

    const REGISTRY: &str = "Character devices:\n  1 mem\n\nBlock devices:\n  7 loop\n  8 sd\n  9 md\n 11 sr\n";

    fn config(base_dir: &str) -> CacheConfig {
        CacheConfig {
            base_dir: PathBuf::from(base_dir),
            ..CacheConfig::default()
        }
    }

    fn sample_tree() -> MemoryProbe {
        let mut probe = MemoryProbe::new();
        probe
            .add_block("/dev/sda", DeviceNumber::new(8, 0))
            .add_block("/dev/sda1", DeviceNumber::new(8, 1))
            .add_block("/dev/md0", DeviceNumber::new(9, 0))
            .add_block("/dev/sr0", DeviceNumber::new(11, 0))
            .add_file("/dev/null")
            .add_symlink("/dev/disk/by-id/ata-disk", "/dev/sda")
            .add_block("/dev/.udev/sdz", DeviceNumber::new(8, 240));
        probe
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(collapse_slashes(b"//dev///sda"), b"/dev/sda".to_vec());
        assert_eq!(
            join_collapsed(Path::new("/dev/"), OsStr::new("sda")),
            PathBuf::from("/dev/sda")
        );
    }

    #[test]
    fn full_scan_indexes_valid_block_devices_once_per_number() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());

        let devices: Vec<DeviceNumber> = cache.begin_scan().map(|device| device.dev).collect();

        let mut sorted = devices.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                DeviceNumber::new(8, 0),
                DeviceNumber::new(8, 1),
                DeviceNumber::new(9, 0)
            ]
        );
        assert!(cache.has_scanned());
        // The alias under /dev/disk is indexed by name but is not canonical.
        assert!(cache.dev_by_name("/dev/disk/by-id/ata-disk").is_some());
        assert_eq!(
            cache
                .dev_by_dev(DeviceNumber::new(8, 0))
                .map(|device| device.name.clone()),
            Some(PathBuf::from("/dev/disk/by-id/ata-disk"))
        );
    }

    #[test]
    fn enumeration_reverses_alphabetical_discovery() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        let names: Vec<PathBuf> = cache
            .begin_scan()
            .map(|device| device.name.clone())
            .collect();

        // Alphabetical walk: disk/by-id/ata-disk, md0, sda (alias), sda1
        assert_eq!(
            names,
            vec![
                PathBuf::from("/dev/sda1"),
                PathBuf::from("/dev/md0"),
                PathBuf::from("/dev/disk/by-id/ata-disk"),
            ]
        );
    }

    #[test]
    fn hidden_directories_are_not_entered() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        cache.full_scan();
        assert!(cache.dev_by_dev(DeviceNumber::new(8, 240)).is_none());
    }

    #[test]
    fn lookups_after_scan_never_touch_the_filesystem() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        cache.full_scan();
        let before = cache.probe().accesses();

        assert!(cache.dev_by_name("/dev/sdq").is_none());
        assert!(cache.dev_by_name("/dev/.udev/sdz").is_none());
        assert!(cache.dev_by_name("/dev/sda1").is_some());
        assert_eq!(cache.begin_scan().count(), 3);

        assert_eq!(cache.probe().accesses(), before);
    }

    #[test]
    fn lookup_before_scan_adds_the_path_on_demand() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());

        let device = cache.dev_by_name("/dev/sda1").cloned();
        assert_eq!(device.map(|d| d.dev), Some(DeviceNumber::new(8, 1)));
        assert!(!cache.has_scanned());
        assert_eq!(cache.len(), 1);

        // Invalid major and non-device paths are misses.
        assert!(cache.dev_by_name("/dev/sr0").is_none());
        assert!(cache.dev_by_name("/dev/null").is_none());
        assert!(cache.dev_by_name("/dev/missing").is_none());
    }

    #[test]
    fn lookup_of_a_directory_before_scan_scans_it() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());

        assert!(cache.dev_by_name("/dev/disk").is_none());
        assert!(cache.dev_by_dev(DeviceNumber::new(8, 0)).is_some());
        assert!(!cache.has_scanned());
    }

    #[test]
    fn devices_requires_a_completed_scan() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        assert!(matches!(cache.devices(), Err(CacheError::NotScanned)));

        cache.full_scan();
        assert_eq!(cache.devices().map(|devices| devices.count()).ok(), Some(3));
    }

    #[test]
    fn second_begin_scan_does_not_rescan() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        let _ = cache.begin_scan().count();
        let after_first = cache.probe().accesses();

        let _ = cache.begin_scan().count();
        assert_eq!(cache.probe().accesses(), after_first);
    }

    #[test]
    fn repeated_full_scan_is_a_query() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        assert_eq!(cache.begin_scan().len(), 3);
        let before = cache.probe().accesses();

        assert_eq!(cache.full_scan(), 3);
        assert_eq!(cache.probe().accesses(), before);
    }

    #[test]
    fn relative_dot_directories_count_as_hidden() {
        assert!(is_hidden(Path::new("..")));
        assert!(is_hidden(Path::new(".")));
        assert!(is_hidden(Path::new("/dev/.udev")));
        assert!(!is_hidden(Path::new("/dev/disk")));
        assert!(!is_hidden(Path::new("/")));
    }

    #[test]
    fn dot_dot_lookup_before_scan_does_not_walk_the_parent() {
        let mut probe = sample_tree();
        probe.add_block("/sdx", DeviceNumber::new(8, 32));
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, probe);

        assert!(cache.dev_by_name("/dev/..").is_none());
        assert!(cache.dev_by_dev(DeviceNumber::new(8, 32)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn symlink_loops_between_directories_terminate() {
        let mut probe = MemoryProbe::new();
        probe
            .add_block("/dev/a/sdb", DeviceNumber::new(8, 16))
            .add_symlink("/dev/a/up", "/dev");
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, probe);

        assert_eq!(cache.full_scan(), 1);
    }

    #[test]
    fn teardown_invalidates_handles_and_allows_rescan() {
        let mut cache = DeviceCache::new(&config("/dev"), REGISTRY, sample_tree());
        cache.full_scan();
        let handle = cache.handle_by_name("/dev/sda1").expect("known path");

        cache.teardown();

        assert!(matches!(cache.get(handle), Err(CacheError::StaleHandle)));
        assert!(!cache.has_scanned());
        assert_eq!(cache.begin_scan().count(), 3);
    }

    #[test]
    fn missing_base_dir_completes_an_empty_scan() {
        let mut cache = DeviceCache::new(&config("/nowhere"), REGISTRY, sample_tree());
        assert_eq!(cache.begin_scan().count(), 0);
        assert!(cache.has_scanned());
    }
}
