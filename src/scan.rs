use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::addon::AddonRecord;
use crate::descriptor::{self, Kind};
use crate::error::Result;

/// Something the scan skipped or could not reconcile. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Descriptor could not be read or parsed.
    Unparseable { path: PathBuf, reason: String },
    /// Compendium lists a descriptor that is not an unowned raw manifest on
    /// disk.
    MisconfiguredDescriptor { compendium: PathBuf, descriptor: PathBuf },
    /// Directory could not be listed.
    Unreadable { path: PathBuf, reason: String },
    /// A later record with the same key replaced an earlier one.
    DuplicateAddon { key: String },
    /// A package id that does not map to a deletable directory.
    UnmappablePackage { manifest: PathBuf, package: String },
    /// A descriptor entry pointing outside the addon root.
    OutsideRoot { compendium: PathBuf, descriptor: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::Unparseable { path, reason } => {
                write!(f, "{} could not be parsed: {}", path.display(), reason)
            }
            Warning::MisconfiguredDescriptor {
                compendium,
                descriptor,
            } => write!(
                f,
                "{} has misconfigured descriptors ({})",
                compendium.display(),
                descriptor.display()
            ),
            Warning::Unreadable { path, reason } => {
                write!(f, "{} could not be read: {}", path.display(), reason)
            }
            Warning::DuplicateAddon { key } => write!(f, "duplicate addon {}", key),
            Warning::UnmappablePackage { manifest, package } => write!(
                f,
                "{} declares package '{}' with no directory",
                manifest.display(),
                package
            ),
            Warning::OutsideRoot {
                compendium,
                descriptor,
            } => write!(
                f,
                "{} lists {} outside the addon directory",
                compendium.display(),
                descriptor.display()
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub records: Vec<AddonRecord>,
    pub warnings: Vec<Warning>,
}

impl ScanReport {
    fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Descriptor files found under a root, before parsing.
#[derive(Debug, Default)]
struct Candidates {
    compendiums: Vec<PathBuf>,
    manifests: Vec<PathBuf>,
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }

    entries.sort();

    Ok(entries)
}

fn discover(root: &Path, report: &mut ScanReport) -> Result<Candidates> {
    let mut candidates = Candidates::default();

    for folder in sorted_entries(root)? {
        if !folder.is_dir() {
            continue;
        }

        let files = match sorted_entries(&folder) {
            Ok(f) => f,
            Err(e) => {
                report.warn(Warning::Unreadable {
                    path: folder,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for file in files {
            if !file.is_file() {
                continue;
            }

            match descriptor::classify(&file) {
                Some(Kind::Compendium) => candidates.compendiums.push(file),
                Some(Kind::Manifest) => candidates.manifests.push(file),
                None => {}
            }
        }
    }

    Ok(candidates)
}

/// Scans an addon root: `<root>/<folder>/*.plugincompendium` are managed
/// addons, `<root>/<folder>/*.plugin` not owned by any compendium are
/// unmanaged ones. The root is created when missing.
///
/// Compendiums come first, then unmanaged manifests, each in path order.
pub fn scan(root: &Path) -> Result<ScanReport> {
    info!("scanning '{}'", root.display());

    let start_instant = Instant::now();

    fs::create_dir_all(root)?;

    let mut report = ScanReport::default();

    let Candidates {
        compendiums,
        mut manifests,
    } = discover(root, &mut report)?;

    let mut managed = Vec::new();

    for path in compendiums {
        let compendium = match descriptor::read_compendium(&path) {
            Ok(c) => c,
            Err(e) => {
                report.warn(Warning::Unparseable {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for owned in &compendium.descriptors {
            let owned_path = root.join(owned);

            match manifests.iter().position(|m| m == &owned_path) {
                Some(pos) => {
                    manifests.remove(pos);
                }
                None => report.warn(Warning::MisconfiguredDescriptor {
                    compendium: path.clone(),
                    descriptor: owned.clone(),
                }),
            }
        }

        managed.push(compendium.record);
    }

    report.records.extend(managed);

    for path in manifests {
        match descriptor::read_manifest(&path) {
            Ok(m) => report.records.push(m.record),
            Err(e) => report.warn(Warning::Unparseable {
                path,
                reason: e.to_string(),
            }),
        }
    }

    info!(
        "done in {}ms: {} addons, {} warnings",
        start_instant.elapsed().as_millis(),
        report.records.len(),
        report.warnings.len()
    );

    Ok(report)
}
