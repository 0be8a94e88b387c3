use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::addon::{Category, Selection};
use crate::deps::DependencyResolver;
use crate::descriptor::{self, Kind};
use crate::error::Result;
use crate::scan::Warning;
use crate::store::Store;

/// Asks the collaborator to approve a step. Nothing proceeds past a
/// confirmation until it returns.
pub trait Confirm {
    fn confirm(&mut self, summary: &str, detail: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str, &str) -> bool,
{
    fn confirm(&mut self, summary: &str, detail: &str) -> bool {
        self(summary, detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    File(PathBuf),
    Directory(PathBuf),
}

impl Target {
    pub fn path(&self) -> &Path {
        match self {
            Target::File(p) | Target::Directory(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub addon: Selection,
    pub targets: Vec<Target>,
}

/// A managed addon other installed addons depend on. Removed only if the
/// collaborator confirms.
#[derive(Debug, Clone)]
pub struct Blocked {
    pub addon: Selection,
    pub dependents: Vec<String>,
}

impl Blocked {
    pub fn summary(&self) -> String {
        let n = self.dependents.len();

        format!(
            "{} {} on {}. Are you sure you want to remove it?",
            n,
            if n == 1 { "addon depends" } else { "addons depend" },
            self.addon.name
        )
    }

    pub fn detail(&self) -> String {
        self.dependents.join("\n")
    }
}

#[derive(Debug, Default)]
pub struct UninstallPlan {
    pub immediate: Vec<Removal>,
    pub blocked: Vec<Blocked>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    /// Targets that were already gone.
    pub absent: Vec<PathBuf>,
    /// Blocked addons the collaborator chose to keep.
    pub skipped: Vec<Selection>,
    pub failed: Vec<(PathBuf, String)>,
    pub warnings: Vec<Warning>,
}

pub struct UninstallPlanner<'a> {
    store: &'a Store,
    category: Category,
    root: PathBuf,
}

/// Deletes one target. `Ok(false)` means it did not exist.
pub fn remove_target(target: &Target) -> std::io::Result<bool> {
    let result = match target {
        Target::File(p) => fs::remove_file(p),
        Target::Directory(p) => fs::remove_dir_all(p),
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl<'a> UninstallPlanner<'a> {
    /// `root` is the addon directory descriptor paths and packages are
    /// relative to.
    pub fn new(store: &'a Store, category: Category, root: &Path) -> UninstallPlanner<'a> {
        UninstallPlanner {
            store,
            category,
            root: root.to_path_buf(),
        }
    }

    /// Splits the selection into addons that can go right away and managed
    /// addons with dependents. Touches nothing on disk.
    pub fn plan_uninstall(&self, selection: &[Selection]) -> Result<UninstallPlan> {
        let resolver = DependencyResolver::new(self.store);
        let mut plan = UninstallPlan::default();

        for addon in selection {
            if descriptor::classify(&addon.file_path) != Some(Kind::Compendium) {
                plan.immediate.push(Removal {
                    addon: addon.clone(),
                    targets: vec![Target::File(addon.file_path.clone())],
                });
                continue;
            }

            let dependents = resolver.find_dependents(self.category, &addon.interface_id)?;

            if dependents.is_empty() {
                let targets = self.managed_targets(addon, &mut plan.warnings);
                plan.immediate.push(Removal {
                    addon: addon.clone(),
                    targets,
                });
            } else {
                info!(
                    "'{}' is needed by {}",
                    addon.name,
                    dependents.join(", ")
                );
                plan.blocked.push(Blocked {
                    addon: addon.clone(),
                    dependents,
                });
            }
        }

        Ok(plan)
    }

    /// Everything a managed addon owns: for each descriptor the package
    /// directory and the manifest, then the compendium itself.
    fn managed_targets(&self, addon: &Selection, warnings: &mut Vec<Warning>) -> Vec<Target> {
        let mut targets = Vec::new();

        let compendium = match descriptor::read_compendium(&addon.file_path) {
            Ok(c) => c,
            Err(e) => {
                push_warning(
                    warnings,
                    Warning::Unparseable {
                        path: addon.file_path.clone(),
                        reason: e.to_string(),
                    },
                );
                return vec![Target::File(addon.file_path.clone())];
            }
        };

        for owned in &compendium.descriptors {
            if !descriptor::stays_inside(owned) {
                push_warning(
                    warnings,
                    Warning::OutsideRoot {
                        compendium: addon.file_path.clone(),
                        descriptor: owned.clone(),
                    },
                );
                continue;
            }

            let manifest_path = self.root.join(owned);

            match descriptor::read_manifest(&manifest_path) {
                Ok(manifest) => {
                    if let Some(package) = manifest.package {
                        match descriptor::package_dir(&package) {
                            Some(dir) => targets.push(Target::Directory(self.root.join(dir))),
                            None => push_warning(
                                warnings,
                                Warning::UnmappablePackage {
                                    manifest: manifest_path.clone(),
                                    package,
                                },
                            ),
                        }
                    }
                }
                // Already gone; the manifest target below is a no-op then
                Err(descriptor::Error::IoError(ref e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => push_warning(
                    warnings,
                    Warning::Unparseable {
                        path: manifest_path.clone(),
                        reason: e.to_string(),
                    },
                ),
            }

            targets.push(Target::File(manifest_path));
        }

        targets.push(Target::File(addon.file_path.clone()));

        targets
    }

    /// Asks about every blocked addon, then deletes everything approved.
    /// Missing files count as deleted; other failures are recorded and the
    /// remaining targets are still processed.
    pub fn confirm_and_execute(
        &self,
        plan: UninstallPlan,
        confirm: &mut dyn Confirm,
    ) -> UninstallReport {
        let UninstallPlan {
            mut immediate,
            blocked,
            warnings,
        } = plan;

        let mut report = UninstallReport {
            warnings,
            ..Default::default()
        };

        for b in blocked {
            if confirm.confirm(&b.summary(), &b.detail()) {
                let targets = self.managed_targets(&b.addon, &mut report.warnings);
                immediate.push(Removal {
                    addon: b.addon,
                    targets,
                });
            } else {
                info!("keeping '{}'", b.addon.name);
                report.skipped.push(b.addon);
            }
        }

        for removal in immediate {
            info!("removing '{}'", removal.addon.name);

            for target in removal.targets {
                let path = target.path().to_path_buf();

                match remove_target(&target) {
                    Ok(true) => {
                        debug!("removed '{}'", path.display());
                        report.removed.push(path);
                    }
                    Ok(false) => {
                        trace!("'{}' already gone", path.display());
                        report.absent.push(path);
                    }
                    Err(e) => {
                        error!("can't remove '{}': {}", path.display(), e);
                        report.failed.push((path, e.to_string()));
                    }
                }
            }
        }

        report
    }
}

fn push_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{}", warning);
    warnings.push(warning);
}
