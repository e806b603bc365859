//! The patch descriptor.

use crate::error::PatchError;
use crate::host::Package;
use sha1::{Digest, Sha1};
use std::fs;
use std::sync::OnceLock;

/// A single patch declared by a package, immutable after construction.
///
/// The target is an exact package name plus an optional exact-version
/// constraint; `levels` is the ordered list of strip-level arguments the
/// executors try until one succeeds.
#[derive(Debug)]
pub struct Patch {
    from_package: String,
    for_package: String,
    for_version: Option<String>,
    original_path: String,
    local_path: String,
    description: String,
    levels: Vec<String>,
    hash: OnceLock<String>,
}

impl Patch {
    /// `for_package_handle` is the declared target handle, optionally
    /// carrying a version after a colon (`"acme/lib:1.2.3"`).
    pub fn new(
        from_package: impl Into<String>,
        for_package_handle: &str,
        original_path: impl Into<String>,
        local_path: impl Into<String>,
        description: impl Into<String>,
        levels: Vec<String>,
    ) -> Self {
        let (for_package, for_version) = parse_target_handle(for_package_handle);
        Patch {
            from_package: from_package.into(),
            for_package,
            for_version,
            original_path: original_path.into(),
            local_path: local_path.into(),
            description: description.into(),
            levels,
            hash: OnceLock::new(),
        }
    }

    /// Name of the package that supplied this patch.
    pub fn from_package(&self) -> &str {
        &self.from_package
    }

    /// Name of the package this patch is for.
    pub fn for_package(&self) -> &str {
        &self.for_package
    }

    /// Exact-version constraint on the target, if any.
    pub fn for_version(&self) -> Option<&str> {
        self.for_version.as_deref()
    }

    /// The path/URL exactly as declared (kept for display and persistence).
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    /// Resolved absolute path of the local patch file.
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Does this patch target the given package?
    pub fn is_for(&self, package: &Package) -> bool {
        if self.for_package != package.name() {
            return false;
        }
        match &self.for_version {
            Some(version) => version == package.version(),
            None => true,
        }
    }

    /// SHA-1 of the patch file contents, computed lazily and cached on first
    /// read. Later changes to the file are deliberately not reflected.
    pub fn hash(&self) -> Result<&str, PatchError> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash);
        }
        let contents = fs::read(&self.local_path).map_err(|_| PatchError::PathNotReadable {
            path: self.local_path.clone(),
        })?;
        let digest = hex::encode(Sha1::digest(&contents));
        Ok(self.hash.get_or_init(|| digest))
    }
}

/// Split a target handle on the first colon; a trimmed-empty or `*` version
/// part means "any version".
fn parse_target_handle(handle: &str) -> (String, Option<String>) {
    match handle.split_once(':') {
        Some((name, version)) => {
            let version = version.trim();
            if version.is_empty() || version == "*" {
                (name.to_string(), None)
            } else {
                (name.to_string(), Some(version.to_string()))
            }
        }
        None => (handle.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn patch_for(handle: &str) -> Patch {
        Patch::new(
            "acme/patches",
            handle,
            "patches/fix.diff",
            "/somewhere/fix.diff",
            "Fix the thing",
            vec!["-p1".to_string()],
        )
    }

    fn package(name: &str, version: &str) -> Package {
        Package::new(name, version, Map::new())
    }

    #[test]
    fn handle_without_version_matches_any_version() {
        let patch = patch_for("acme/lib");
        assert_eq!(patch.for_package(), "acme/lib");
        assert_eq!(patch.for_version(), None);
        assert!(patch.is_for(&package("acme/lib", "1.0.0")));
        assert!(patch.is_for(&package("acme/lib", "9.9.9")));
        assert!(!patch.is_for(&package("acme/other", "1.0.0")));
    }

    #[test]
    fn handle_with_version_requires_exact_equality() {
        let patch = patch_for("acme/lib:1.2.3");
        assert_eq!(patch.for_version(), Some("1.2.3"));
        assert!(patch.is_for(&package("acme/lib", "1.2.3")));
        assert!(!patch.is_for(&package("acme/lib", "1.2.4")));
    }

    #[test]
    fn handle_version_part_is_trimmed_and_star_means_any() {
        assert_eq!(patch_for("acme/lib: 1.0 ").for_version(), Some("1.0"));
        assert_eq!(patch_for("acme/lib:*").for_version(), None);
        assert_eq!(patch_for("acme/lib:").for_version(), None);
    }

    #[test]
    fn hash_is_memoized_at_first_read() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"--- a\n+++ b\n").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let patch = Patch::new(
            "acme/patches",
            "acme/lib",
            "fix.diff",
            path,
            "Fix",
            vec!["-p1".to_string()],
        );
        let first = patch.hash().unwrap().to_string();
        // sha1 of the file contents above
        assert_eq!(first.len(), 40);
        file.write_all(b"more").unwrap();
        file.flush().unwrap();
        assert_eq!(patch.hash().unwrap(), first);
    }

    #[test]
    fn hash_of_missing_file_is_path_not_readable() {
        let patch = patch_for("acme/lib");
        match patch.hash() {
            Err(PatchError::PathNotReadable { path }) => {
                assert_eq!(path, "/somewhere/fix.diff");
            }
            other => panic!("expected PathNotReadable, got {other:?}"),
        }
    }
}
