// SPDX-License-Identifier: GPL-3.0-only

//! Scan device directories and print the block devices the cache accepts.

mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lvm_sys::{CacheConfig, DeviceCache};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "lvm-devscan")]
#[command(about = "List block devices eligible for physical volumes")]
struct Args {
    /// TOML file with a [dev-mgr] section
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to scan, overriding the config
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Device registry to read majors from, overriding the config
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Resolve these paths before scanning instead of listing everything
    #[arg(long)]
    lookup: Vec<PathBuf>,

    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Also write logs to daily files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DeviceRow {
    name: PathBuf,
    major: u32,
    minor: u32,
}

#[derive(Debug, Serialize)]
struct Report {
    base_dirs: Vec<PathBuf>,
    valid_majors: Vec<u32>,
    devices: Vec<DeviceRow>,
    unresolved: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.verbose, args.log_dir.as_deref())?;

    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    if let Some(base_dir) = args.base_dir {
        config.base_dir = base_dir;
    }
    if let Some(registry) = args.registry {
        config.registry = registry;
    }

    let mut cache = DeviceCache::from_host(&config);
    let mut devices = Vec::new();
    let mut unresolved = Vec::new();

    if args.lookup.is_empty() {
        for device in cache.begin_scan() {
            devices.push(DeviceRow {
                name: device.name.clone(),
                major: device.dev.major(),
                minor: device.dev.minor(),
            });
        }
    } else {
        for path in args.lookup {
            match cache.dev_by_name(&path) {
                Some(device) => devices.push(DeviceRow {
                    name: device.name.clone(),
                    major: device.dev.major(),
                    minor: device.dev.minor(),
                }),
                None => unresolved.push(path),
            }
        }
    }

    let report = Report {
        base_dirs: cache.base_dirs().to_vec(),
        valid_majors: cache.valid_majors().iter().collect(),
        devices,
        unresolved,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("MAJOR:MINOR   DEVICE");
    println!("----------------------------------------");
    for row in &report.devices {
        println!(
            "{:>5}:{:<6} {}",
            row.major,
            row.minor,
            row.name.display()
        );
    }
    for path in &report.unresolved {
        println!("    -:-      {} (not a usable block device)", path.display());
    }

    println!();
    println!(
        "devices={} valid_majors={:?}",
        report.devices.len(),
        report.valid_majors
    );

    Ok(())
}
