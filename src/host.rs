//! Contracts the host package manager provides.
//!
//! The patching core is driven by an already-solved environment: dependency
//! resolution, package (un)installation, downloads and metadata persistence
//! all live behind the traits below. Filesystem/HTTP-backed defaults are
//! provided where a sensible standalone implementation exists.

use crate::error::PatchError;
use crate::patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Extra-bag key under which applied-patch bookkeeping is persisted.
pub const EXTRA_PATCHES_APPLIED: &str = "patches_applied";

/// A package as seen by the patcher: a name, a pinned version and the
/// free-form "extra" configuration bag from its manifest.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    version: String,
    is_root: bool,
    extra: Map<String, Value>,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        extra: Map<String, Value>,
    ) -> Self {
        Package {
            name: name.into(),
            version: version.into(),
            is_root: false,
            extra,
        }
    }

    /// The root/project package; patches target its own working directory.
    pub fn root(
        name: impl Into<String>,
        version: impl Into<String>,
        extra: Map<String, Value>,
    ) -> Self {
        Package {
            is_root: true,
            ..Package::new(name, version, extra)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// The bookkeeping written by a previous cycle, if any.
    ///
    /// Parsing is deliberately tolerant: a present-but-malformed record is
    /// returned with an empty hash, which forces a reinstall on the next
    /// cycle instead of failing it.
    pub fn applied_patches(&self) -> Option<AppliedPatches> {
        let value = self.extra.get(EXTRA_PATCHES_APPLIED)?;
        match value {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) => {
                let hash = map
                    .get("hash")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let list = map
                    .get("list")
                    .cloned()
                    .and_then(|list| serde_json::from_value(list).ok())
                    .unwrap_or_default();
                Some(AppliedPatches { hash, list })
            }
            _ => None,
        }
    }
}

/// One entry of the persisted applied-patch list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPatch {
    #[serde(rename = "from-package")]
    pub from_package: String,
    pub path: String,
    pub description: String,
}

impl AppliedPatch {
    pub fn for_patch(patch: &Patch) -> Self {
        AppliedPatch {
            from_package: patch.from_package().to_string(),
            path: patch.original_path().to_string(),
            description: patch.description().to_string(),
        }
    }
}

/// Applied-patch record persisted on a package's extra bag; its `hash` is
/// compared against the freshly collected patch set on the next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPatches {
    pub hash: String,
    pub list: Vec<AppliedPatch>,
}

/// Resolves installed package locations and performs uninstalls when a
/// changed patch set forces a reinstall.
pub trait InstallationManager {
    fn install_path(&self, package: &Package) -> Result<PathBuf, PatchError>;

    fn uninstall(&self, package: &Package) -> Result<(), PatchError>;
}

/// Downloads a remote patch file to a destination path.
pub trait RemoteFetch {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), PatchError>;
}

/// Reads and parses a JSON file (the `patches-file` declaration shape).
pub trait JsonReader {
    fn read(&self, path: &str) -> Result<Value, PatchError>;
}

pub const EVENT_PRE_APPLY_PATCH: &str = "pre-apply-patch";
pub const EVENT_POST_APPLY_PATCH: &str = "post-apply-patch";

/// A named patch event carrying the patch it concerns.
#[derive(Debug, Clone, Copy)]
pub struct PatchEvent<'a> {
    pub name: &'static str,
    pub patch: &'a Patch,
}

impl<'a> PatchEvent<'a> {
    pub fn pre_apply(patch: &'a Patch) -> Self {
        PatchEvent {
            name: EVENT_PRE_APPLY_PATCH,
            patch,
        }
    }

    pub fn post_apply(patch: &'a Patch) -> Self {
        PatchEvent {
            name: EVENT_POST_APPLY_PATCH,
            patch,
        }
    }
}

/// Receives patch lifecycle notifications; return values are not consumed.
pub trait EventSink {
    fn dispatch(&self, event: PatchEvent<'_>);
}

/// Persists updated applied-patch bookkeeping for the next cycle to read.
pub trait MetadataSink {
    fn write_applied(&self, package: &Package, record: &AppliedPatches)
        -> Result<(), PatchError>;
}

/// Event sink that discards everything.
pub struct NullEvents;

impl EventSink for NullEvents {
    fn dispatch(&self, _event: PatchEvent<'_>) {}
}

/// [`JsonReader`] over the local filesystem.
pub struct FsJsonReader;

impl JsonReader for FsJsonReader {
    fn read(&self, path: &str) -> Result<Value, PatchError> {
        let contents = fs::read_to_string(path).map_err(|source| PatchError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| PatchError::Json {
            path: path.to_string(),
            source,
        })
    }
}

/// [`RemoteFetch`] over HTTP(S) via a blocking client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

impl RemoteFetch for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), PatchError> {
        let failed = |detail: String| PatchError::path_not_found(url, Some(detail));
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| failed(format!("failed to download \"{url}\": {err}")))?;
        if !response.status().is_success() {
            return Err(failed(format!(
                "failed to download \"{url}\": HTTP status {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .map_err(|err| failed(format!("failed to download \"{url}\": {err}")))?;
        fs::write(destination, &body).map_err(|source| PatchError::Io {
            path: destination.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn package_with_applied(value: Value) -> Package {
        let mut extra = Map::new();
        extra.insert(EXTRA_PATCHES_APPLIED.to_string(), value);
        Package::new("acme/lib", "1.2.3", extra)
    }

    #[test]
    fn applied_patches_absent() {
        let package = Package::new("acme/lib", "1.2.3", Map::new());
        assert!(package.applied_patches().is_none());
    }

    #[test]
    fn applied_patches_empty_object_counts_as_absent() {
        assert!(package_with_applied(json!({})).applied_patches().is_none());
    }

    #[test]
    fn applied_patches_parsed() {
        let package = package_with_applied(json!({
            "hash": "abc",
            "list": [{"from-package": "acme/patches", "path": "p.diff", "description": "Fix"}],
        }));
        let applied = package.applied_patches().unwrap();
        assert_eq!(applied.hash, "abc");
        assert_eq!(applied.list.len(), 1);
        assert_eq!(applied.list[0].from_package, "acme/patches");
    }

    #[test]
    fn applied_patches_malformed_hash_yields_empty_hash() {
        let applied = package_with_applied(json!({"list": []}))
            .applied_patches()
            .unwrap();
        assert_eq!(applied.hash, "");
    }
}
