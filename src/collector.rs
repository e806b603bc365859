//! Builds the patch collection from package configuration.
//!
//! Patches are declared in a package's extra bag, either inline under
//! `patches` (target handle -> description -> path-or-object) or in an
//! external JSON file referenced by `patches-file`. The root package may
//! additionally allow collection from its dependencies via
//! `allow-subpatches`.

use crate::collection::PatchCollection;
use crate::error::PatchError;
use crate::host::{InstallationManager, JsonReader, Package};
use crate::io::Io;
use crate::patch::Patch;
use crate::resolver::{normalize_path, PathResolver};
use serde_json::Value;
use std::env;
use std::rc::Rc;

/// Levels tried when a patch entry does not override them.
pub const DEFAULT_PATCH_LEVELS: [&str; 4] = ["-p1", "-p0", "-p2", "-p4"];

pub struct PatchCollector {
    resolver: Rc<PathResolver>,
    io: Rc<dyn Io>,
    installs: Rc<dyn InstallationManager>,
    json: Rc<dyn JsonReader>,
    errors_as_warnings: bool,
}

enum Allowlist {
    All,
    Nothing,
    Names(Vec<String>),
}

impl Allowlist {
    fn allows(&self, package_name: &str) -> bool {
        match self {
            Allowlist::All => true,
            Allowlist::Nothing => false,
            Allowlist::Names(names) => names.iter().any(|name| name == package_name),
        }
    }
}

impl PatchCollector {
    pub fn new(
        resolver: Rc<PathResolver>,
        io: Rc<dyn Io>,
        installs: Rc<dyn InstallationManager>,
        json: Rc<dyn JsonReader>,
        errors_as_warnings: bool,
    ) -> Self {
        PatchCollector {
            resolver,
            io,
            installs,
            json,
            errors_as_warnings,
        }
    }

    /// Collect from the root package and, when allowed, from sub-packages in
    /// the given order.
    pub fn collect(
        &self,
        root: &Package,
        sub_packages: &[Package],
    ) -> Result<PatchCollection, PatchError> {
        let mut collected = self.collect_from_package(root)?;
        if let Some(allowed) = root.extra().get("allow-subpatches") {
            if let Some(allowlist) = self.parse_allowlist(root, allowed)? {
                for package in sub_packages {
                    if allowlist.allows(package.name()) {
                        collected.merge(self.collect_from_package(package)?);
                    }
                }
            }
        }
        Ok(collected)
    }

    fn parse_allowlist(
        &self,
        root: &Package,
        value: &Value,
    ) -> Result<Option<Allowlist>, PatchError> {
        match value {
            Value::Bool(true) => Ok(Some(Allowlist::All)),
            Value::Bool(false) => Ok(Some(Allowlist::Nothing)),
            Value::Array(entries) => {
                let mut names = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry.as_str() {
                        Some(name) => names.push(name.to_string()),
                        None => {
                            self.handle_error(PatchError::invalid_config(
                                root,
                                "extra.allow-subpatches",
                                "the extra.allow-subpatches entries must be strings",
                            ))?;
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(Allowlist::Names(names)))
            }
            _ => {
                self.handle_error(PatchError::invalid_config(
                    root,
                    "extra.allow-subpatches",
                    "the extra.allow-subpatches value must be a boolean or an array of strings",
                ))?;
                Ok(None)
            }
        }
    }

    fn collect_from_package(&self, package: &Package) -> Result<PatchCollection, PatchError> {
        let mut collected = PatchCollection::new();
        if let Some(patches) = package.extra().get("patches") {
            self.io.write(&format!(
                "Gathering patches from {} (extra.patches).",
                package.name()
            ));
            collected.merge(self.collect_inline(package, patches)?);
        }
        if let Some(patches_file) = package.extra().get("patches-file") {
            self.io.write(&format!(
                "Gathering patches from {} (extra.patches-file).",
                package.name()
            ));
            collected.merge(self.collect_from_file(package, patches_file)?);
        }
        Ok(collected)
    }

    fn collect_inline(
        &self,
        package: &Package,
        patches: &Value,
    ) -> Result<PatchCollection, PatchError> {
        let mut collected = PatchCollection::new();
        let Some(targets) = patches.as_object() else {
            self.handle_error(PatchError::invalid_config(
                package,
                "extra.patches",
                "the extra.patches configuration must be an object",
            ))?;
            return Ok(collected);
        };
        let package_dir = self.package_dir(package)?;
        for (target_handle, patch_list) in targets {
            let Some(patch_list) = patch_list.as_object() else {
                self.handle_error(PatchError::invalid_config(
                    package,
                    "extra.patches",
                    format!("the \"{target_handle}\" value must be an object"),
                ))?;
                continue;
            };
            for (description, entry) in patch_list {
                let result = self.collect_entry(
                    package,
                    &package_dir,
                    target_handle,
                    description,
                    entry,
                );
                match result {
                    Ok(Some(patch)) => collected.add(patch),
                    Ok(None) => {}
                    Err(err) => self.handle_error(err)?,
                }
            }
        }
        Ok(collected)
    }

    /// Resolve one declared patch entry. `Ok(None)` means the entry was
    /// reported as invalid in permissive mode.
    fn collect_entry(
        &self,
        package: &Package,
        package_dir: &str,
        target_handle: &str,
        description: &str,
        entry: &Value,
    ) -> Result<Option<Patch>, PatchError> {
        let (path, levels) = extract_patch_entry(package, entry)?;
        let local_path = self.resolver.resolve(&path, package_dir)?;
        if local_path.is_empty() {
            return Err(PatchError::invalid_config(
                package,
                "extra.patches",
                format!("the path of the \"{description}\" patch is empty or is not a string"),
            ));
        }
        Ok(Some(Patch::new(
            package.name(),
            target_handle,
            path,
            local_path,
            description,
            levels,
        )))
    }

    fn collect_from_file(
        &self,
        package: &Package,
        patches_file: &Value,
    ) -> Result<PatchCollection, PatchError> {
        let collected = PatchCollection::new();
        let path = match patches_file.as_str() {
            Some(path) if !path.is_empty() => path,
            _ => {
                self.handle_error(PatchError::invalid_config(
                    package,
                    "extra.patches-file",
                    "the extra.patches-file configuration must be a non-empty string",
                ))?;
                return Ok(collected);
            }
        };
        let package_dir = self.package_dir(package)?;
        let full_path = self.resolver.resolve(path, &package_dir)?;
        let data = match self.json.read(&full_path) {
            Ok(data) => data,
            Err(err) => {
                self.handle_error(err)?;
                return Ok(collected);
            }
        };
        let Some(object) = data.as_object() else {
            self.handle_error(PatchError::invalid_config(
                package,
                "extra.patches-file",
                format!("the JSON file at \"{path}\" must contain an object"),
            ))?;
            return Ok(collected);
        };
        let Some(patches) = object.get("patches") else {
            self.handle_error(PatchError::invalid_config(
                package,
                "extra.patches-file",
                format!("the JSON file at \"{path}\" must contain an object with a \"patches\" key"),
            ))?;
            return Ok(collected);
        };
        self.collect_inline(package, patches)
    }

    /// Base directory against which a package's relative patch paths resolve.
    fn package_dir(&self, package: &Package) -> Result<String, PatchError> {
        if package.is_root() {
            let cwd = env::current_dir().map_err(|source| PatchError::Io {
                path: ".".to_string(),
                source,
            })?;
            Ok(normalize_path(&cwd.to_string_lossy()))
        } else {
            let path = self.installs.install_path(package)?;
            Ok(normalize_path(&path.to_string_lossy()))
        }
    }

    /// In permissive mode the error is logged and collection continues;
    /// in strict mode it aborts the collection.
    fn handle_error(&self, err: PatchError) -> Result<(), PatchError> {
        if self.errors_as_warnings {
            self.io.write_error(&err.to_string());
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// A patch entry is either a bare path string or an object with `path` and an
/// optional non-empty `levels` override.
fn extract_patch_entry(
    package: &Package,
    entry: &Value,
) -> Result<(String, Vec<String>), PatchError> {
    if let Some(path) = entry.as_str() {
        return Ok((path.to_string(), default_levels()));
    }
    let object = entry.as_object().ok_or_else(|| {
        PatchError::invalid_config(
            package,
            "extra.patches.[...]",
            "the value of a patch must be a string or an object with a \"path\" key",
        )
    })?;
    let path = object
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PatchError::invalid_config(
                package,
                "extra.patches.[...]",
                "the value of a patch must be a string or an object with a \"path\" key",
            )
        })?
        .to_string();
    let levels = match object.get("levels") {
        None => default_levels(),
        Some(levels) => {
            let entries = levels.as_array().filter(|entries| !entries.is_empty());
            let entries = entries.ok_or_else(|| {
                PatchError::invalid_config(
                    package,
                    "extra.patches.[...].levels",
                    "the patch levels must be a non-empty array of strings",
                )
            })?;
            let mut parsed = Vec::with_capacity(entries.len());
            for level in entries {
                let level = level.as_str().ok_or_else(|| {
                    PatchError::invalid_config(
                        package,
                        "extra.patches.[...].levels",
                        "the patch levels must be a non-empty array of strings",
                    )
                })?;
                parsed.push(level.to_string());
            }
            parsed
        }
    };
    Ok((path, levels))
}

fn default_levels() -> Vec<String> {
    DEFAULT_PATCH_LEVELS.iter().map(|s| s.to_string()).collect()
}
