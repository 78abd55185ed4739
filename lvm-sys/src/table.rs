// SPDX-License-Identifier: GPL-3.0-only

//! Dual-indexed device table
//!
//! Records live in one arena owned by the table. Two fixed-size bucket
//! arrays index them by path and by device number, and an enumeration list
//! holds the canonical record of each device number.
//!
//! Invariants:
//! - a path appears at most once in the name index
//! - a device number appears at most once in the number index and the
//!   enumeration list, and the first record discovered for it is canonical

use std::collections::hash_map::DefaultHasher;
use std::ffi::OsStr;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lvm_types::{Device, DeviceNumber};

use crate::error::{CacheError, Result};

const MIN_SLOTS: usize = 16;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

fn next_context() -> u64 {
    NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

/// Stable reference to a record of one particular table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    context: u64,
    index: u32,
}

#[derive(Debug)]
pub struct DeviceTable {
    context: u64,
    mask: usize,
    records: Vec<Device>,
    name_slots: Vec<Vec<u32>>,
    dev_slots: Vec<Vec<u32>>,
    /// Canonical records in insertion order; enumerated back to front
    all: Vec<u32>,
}

fn hash_name(name: &OsStr) -> usize {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish() as usize
}

fn hash_dev(dev: DeviceNumber) -> usize {
    dev.raw() as usize
}

impl DeviceTable {
    /// Create a table with the next power of two >= `size_hint` slots.
    pub fn with_size_hint(size_hint: usize) -> Self {
        let slots = size_hint.max(MIN_SLOTS).next_power_of_two();

        Self {
            context: next_context(),
            mask: slots - 1,
            records: Vec::new(),
            name_slots: vec![Vec::new(); slots],
            dev_slots: vec![Vec::new(); slots],
            all: Vec::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.mask + 1
    }

    fn handle(&self, index: u32) -> DeviceHandle {
        DeviceHandle {
            context: self.context,
            index,
        }
    }

    fn name_index(&self, name: &OsStr) -> Option<u32> {
        self.name_slots[hash_name(name) & self.mask]
            .iter()
            .copied()
            .find(|&index| self.records[index as usize].name.as_os_str() == name)
    }

    fn dev_index(&self, dev: DeviceNumber) -> Option<u32> {
        self.dev_slots[hash_dev(dev) & self.mask]
            .iter()
            .copied()
            .find(|&index| self.records[index as usize].dev == dev)
    }

    pub fn find_name(&self, name: &Path) -> Option<DeviceHandle> {
        self.name_index(name.as_os_str())
            .map(|index| self.handle(index))
    }

    pub fn find_dev(&self, dev: DeviceNumber) -> Option<DeviceHandle> {
        self.dev_index(dev).map(|index| self.handle(index))
    }

    pub fn get(&self, handle: DeviceHandle) -> Result<&Device> {
        if handle.context != self.context {
            return Err(CacheError::StaleHandle);
        }
        self.records
            .get(handle.index as usize)
            .ok_or(CacheError::StaleHandle)
    }

    /// Record that `name` resolves to `dev`.
    ///
    /// A known path only has its device number updated. A new path is
    /// always indexed by name, and becomes the canonical record for `dev`
    /// only if no record holds that number yet.
    pub fn insert(&mut self, name: PathBuf, dev: DeviceNumber) -> DeviceHandle {
        if let Some(index) = self.name_index(name.as_os_str()) {
            self.update_dev(index, dev);
            return self.handle(index);
        }

        let index = self.records.len() as u32;
        let name_slot = hash_name(name.as_os_str()) & self.mask;
        self.records.push(Device::new(name, dev));
        self.name_slots[name_slot].push(index);

        if self.dev_index(dev).is_none() {
            self.link_canonical(index);
        }

        self.handle(index)
    }

    fn link_canonical(&mut self, index: u32) {
        let dev = self.records[index as usize].dev;
        self.dev_slots[hash_dev(dev) & self.mask].push(index);
        self.all.push(index);
    }

    fn unlink_canonical(&mut self, index: u32, dev: DeviceNumber) {
        self.dev_slots[hash_dev(dev) & self.mask].retain(|&candidate| candidate != index);
        self.all.retain(|&candidate| candidate != index);
    }

    fn update_dev(&mut self, index: u32, dev: DeviceNumber) {
        let old = self.records[index as usize].dev;
        if old == dev {
            return;
        }

        let was_canonical = self.dev_index(old) == Some(index);
        self.records[index as usize].dev = dev;

        // Keep both numbers represented by the oldest path still naming them.
        if was_canonical {
            self.unlink_canonical(index, old);
            if let Some(alias) = self.oldest_with_dev(old) {
                self.link_canonical(alias);
            }
        }
        if self.dev_index(dev).is_none() {
            self.link_canonical(index);
        }
    }

    fn oldest_with_dev(&self, dev: DeviceNumber) -> Option<u32> {
        self.records
            .iter()
            .position(|record| record.dev == dev)
            .map(|index| index as u32)
    }

    /// Number of distinct paths.
    pub fn name_count(&self) -> usize {
        self.records.len()
    }

    /// Number of distinct device numbers.
    pub fn dev_count(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Canonical records, most recently inserted first.
    pub fn iter(&self) -> impl Iterator<Item = &Device> + '_ {
        self.canonical().iter().rev().map(|&index| self.record(index))
    }

    /// Arena indices of canonical records in insertion order.
    pub(crate) fn canonical(&self) -> &[u32] {
        &self.all
    }

    pub(crate) fn record(&self, index: u32) -> &Device {
        &self.records[index as usize]
    }

    /// Drop every record and invalidate all handles issued so far.
    pub fn clear(&mut self) {
        self.context = next_context();
        self.records.clear();
        self.all.clear();
        for slot in self.name_slots.iter_mut().chain(self.dev_slots.iter_mut()) {
            slot.clear();
        }
    }
}
