//! Install/update cycle orchestration.
//!
//! One [`PatchDriver`] serves one cycle: before the host installs/updates
//! packages it uninstalls those whose patch set changed since the last cycle
//! (so they come back clean and get re-patched), and afterwards it applies
//! the pending patches and persists the applied-patch bookkeeping.

use crate::collection::PatchCollection;
use crate::collector::PatchCollector;
use crate::error::PatchError;
use crate::executor::{Platform, ProcessRunner};
use crate::host::{
    AppliedPatch, AppliedPatches, EventSink, InstallationManager, JsonReader, MetadataSink,
    Package, RemoteFetch,
};
use crate::io::Io;
use crate::patcher::Patcher;
use crate::resolver::PathResolver;
use crate::scratch::ScratchDir;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The injected services a cycle runs against.
pub struct HostServices {
    pub io: Rc<dyn Io>,
    pub installs: Rc<dyn InstallationManager>,
    pub events: Rc<dyn EventSink>,
    pub runner: Rc<dyn ProcessRunner>,
    pub platform: Rc<dyn Platform>,
    pub fetcher: Rc<dyn RemoteFetch>,
    pub json: Rc<dyn JsonReader>,
    pub metadata: Rc<dyn MetadataSink>,
}

pub struct PatchDriver {
    services: HostServices,
    scratch: RefCell<Option<Rc<ScratchDir>>>,
    resolver: RefCell<Option<Rc<PathResolver>>>,
    patcher: RefCell<Option<Rc<Patcher>>>,
    collection: RefCell<Option<Rc<PatchCollection>>>,
    errors_as_warnings: Cell<Option<bool>>,
}

impl PatchDriver {
    pub fn new(services: HostServices) -> Self {
        PatchDriver {
            services,
            scratch: RefCell::new(None),
            resolver: RefCell::new(None),
            patcher: RefCell::new(None),
            collection: RefCell::new(None),
            errors_as_warnings: Cell::new(None),
        }
    }

    /// Before install/update: uninstall packages whose patch set changed, so
    /// the host reinstalls them and `post_install` re-patches from scratch.
    pub fn pre_install(&self, root: &Package, packages: &[Package]) -> Result<(), PatchError> {
        let collection = self.collection(root, packages)?;
        if collection.is_empty() {
            return Ok(());
        }
        for package in packages {
            if self.must_reinstall(package, &collection)? {
                self.services.io.write(&format!(
                    "Removing package {} so that it can be re-installed and re-patched.",
                    package.name()
                ));
                self.services.installs.uninstall(package)?;
            }
        }
        Ok(())
    }

    /// After install/update: apply pending patches and record bookkeeping.
    pub fn post_install(&self, root: &Package, packages: &[Package]) -> Result<(), PatchError> {
        // packages may have been reinstalled since pre_install; re-collect
        self.refresh_collection();
        let collection = self.collection(root, packages)?;
        if collection.is_empty() {
            self.services.io.write("No patches supplied.");
            return Ok(());
        }
        for package in std::iter::once(root).chain(packages.iter()) {
            let package_patches = collection.patches_for(package);
            if package_patches.is_empty() {
                if self.services.io.is_verbose() {
                    self.services
                        .io
                        .write(&format!("No patches found for {}.", package.name()));
                }
                continue;
            }
            self.install_patches_for(root, package, &package_patches)?;
        }
        Ok(())
    }

    /// Drop the memoized collection so the next access re-collects.
    pub fn refresh_collection(&self) {
        *self.collection.borrow_mut() = None;
    }

    /// The names of the packages `pre_install` would uninstall, without
    /// touching anything.
    pub fn packages_needing_reinstall(
        &self,
        root: &Package,
        packages: &[Package],
    ) -> Result<Vec<String>, PatchError> {
        let collection = self.collection(root, packages)?;
        let mut stale = Vec::new();
        for package in packages {
            if self.must_reinstall(package, &collection)? {
                stale.push(package.name().to_string());
            }
        }
        Ok(stale)
    }

    /// The memoized patch collection for this cycle.
    pub fn patch_collection(
        &self,
        root: &Package,
        packages: &[Package],
    ) -> Result<Rc<PatchCollection>, PatchError> {
        self.collection(root, packages)
    }

    /// A package must be reinstalled when it both carries applied-patch
    /// bookkeeping and has patches in the current collection, and the
    /// recorded hash is missing or no longer matches.
    fn must_reinstall(
        &self,
        package: &Package,
        collection: &PatchCollection,
    ) -> Result<bool, PatchError> {
        let applied = match package.applied_patches() {
            Some(applied) => applied,
            None => return Ok(false),
        };
        let package_patches = collection.patches_for(package);
        if package_patches.is_empty() {
            return Ok(false);
        }
        if applied.hash.is_empty() {
            return Ok(true);
        }
        Ok(applied.hash != package_patches.hash()?)
    }

    /// Apply a package's patches; all-or-nothing bookkeeping: any hard error
    /// discards the whole `patches_applied` update for this package.
    fn install_patches_for(
        &self,
        root: &Package,
        package: &Package,
        package_patches: &PatchCollection,
    ) -> Result<(), PatchError> {
        let errors_as_warnings = self.errors_as_warnings(root);
        let patcher = self.patcher(root)?;
        let mut applied: Option<Vec<AppliedPatch>> = Some(Vec::new());
        for patch in package_patches.iter() {
            match patcher.apply_patch(patch, package) {
                Ok(()) => {
                    if let Some(list) = applied.as_mut() {
                        list.push(AppliedPatch::for_patch(patch));
                    }
                }
                Err(err) => {
                    applied = None;
                    if !errors_as_warnings {
                        return Err(err);
                    }
                    self.services.io.write_error(&err.to_string());
                }
            }
        }
        if let Some(list) = applied {
            match package_patches.hash() {
                Ok(hash) => {
                    let record = AppliedPatches { hash, list };
                    self.services.metadata.write_applied(package, &record)?;
                }
                Err(err) => {
                    if !errors_as_warnings {
                        return Err(err);
                    }
                    self.services.io.write_error(&err.to_string());
                }
            }
        }
        Ok(())
    }

    fn collection(
        &self,
        root: &Package,
        packages: &[Package],
    ) -> Result<Rc<PatchCollection>, PatchError> {
        if let Some(collection) = self.collection.borrow().as_ref() {
            return Ok(collection.clone());
        }
        let collector = PatchCollector::new(
            self.resolver(root),
            self.services.io.clone(),
            self.services.installs.clone(),
            self.services.json.clone(),
            self.errors_as_warnings(root),
        );
        let collection = Rc::new(collector.collect(root, packages)?);
        *self.collection.borrow_mut() = Some(collection.clone());
        Ok(collection)
    }

    fn patcher(&self, root: &Package) -> Result<Rc<Patcher>, PatchError> {
        let mut slot = self.patcher.borrow_mut();
        let patcher = match slot.as_ref() {
            Some(patcher) => patcher.clone(),
            None => {
                let patcher = Rc::new(Patcher::new(
                    self.services.io.clone(),
                    self.services.installs.clone(),
                    self.services.events.clone(),
                    self.services.runner.clone(),
                    self.services.platform.clone(),
                    self.scratch(root),
                ));
                *slot = Some(patcher.clone());
                patcher
            }
        };
        Ok(patcher)
    }

    /// The shared path resolver. Outlives `refresh_collection` so the per-URL
    /// download cache spans the whole cycle: a remote patch is fetched once
    /// even though `pre_install` and `post_install` each collect.
    fn resolver(&self, root: &Package) -> Rc<PathResolver> {
        if let Some(resolver) = self.resolver.borrow().as_ref() {
            return resolver.clone();
        }
        let resolver = Rc::new(PathResolver::new(
            self.scratch(root),
            self.services.fetcher.clone(),
        ));
        *self.resolver.borrow_mut() = Some(resolver.clone());
        resolver
    }

    /// Process-wide strict/permissive toggle, read once per cycle from the
    /// root package (`patch-errors-as-warnings`, default true).
    fn errors_as_warnings(&self, root: &Package) -> bool {
        if let Some(cached) = self.errors_as_warnings.get() {
            return cached;
        }
        let value = match root.extra().get("patch-errors-as-warnings") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_i64() != Some(0),
            _ => true,
        };
        self.errors_as_warnings.set(Some(value));
        value
    }

    /// The shared scratch directory, honoring `patch-temporary-folder` when
    /// it names an existing writable directory.
    fn scratch(&self, root: &Package) -> Rc<ScratchDir> {
        if let Some(scratch) = self.scratch.borrow().as_ref() {
            return scratch.clone();
        }
        let scratch = Rc::new(match self.patch_temporary_folder(root) {
            Some(parent) => ScratchDir::in_dir(parent),
            None => ScratchDir::system(),
        });
        *self.scratch.borrow_mut() = Some(scratch.clone());
        scratch
    }

    fn patch_temporary_folder(&self, root: &Package) -> Option<String> {
        let io = &self.services.io;
        let value = root.extra().get("patch-temporary-folder")?;
        let Some(folder) = value.as_str().filter(|folder| !folder.is_empty()) else {
            if !value.is_null() {
                io.write_error(
                    "The value of extra.patch-temporary-folder must be a string: \
                     we'll use the system temporary folder.",
                );
            }
            return None;
        };
        let folder = crate::resolver::normalize_path(folder);
        if !std::path::Path::new(&folder).is_dir() {
            io.write_error(&format!(
                "The value of extra.patch-temporary-folder '{folder}' does not exist: \
                 we'll use the system temporary folder."
            ));
            return None;
        }
        if tempfile::tempfile_in(&folder).is_err() {
            io.write_error(&format!(
                "The value of extra.patch-temporary-folder '{folder}' is not writable: \
                 we'll use the system temporary folder."
            ));
            return None;
        }
        Some(folder)
    }
}
