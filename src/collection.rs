//! Ordered collection of collected patches.

use crate::error::PatchError;
use crate::host::Package;
use crate::patch::Patch;
use sha1::{Digest, Sha1};
use std::rc::Rc;

/// Insertion-ordered list of patches. Descriptors are reference-counted so
/// per-package filtered views share the memoized content hashes of the
/// master collection.
#[derive(Debug, Default, Clone)]
pub struct PatchCollection {
    patches: Vec<Rc<Patch>>,
}

impl PatchCollection {
    pub fn new() -> Self {
        PatchCollection::default()
    }

    pub fn add(&mut self, patch: Patch) {
        self.patches.push(Rc::new(patch));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.patches.iter().map(|patch| patch.as_ref())
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Append another collection's patches, preserving both orders.
    pub fn merge(&mut self, other: PatchCollection) {
        self.patches.extend(other.patches);
    }

    pub fn contains_patches_for(&self, package: &Package) -> bool {
        self.iter().any(|patch| patch.is_for(package))
    }

    /// The patches targeting a package, in collection order.
    pub fn patches_for(&self, package: &Package) -> PatchCollection {
        PatchCollection {
            patches: self
                .patches
                .iter()
                .filter(|patch| patch.is_for(package))
                .cloned()
                .collect(),
        }
    }

    /// Aggregate content hash used for change detection.
    ///
    /// Member hashes are sorted before joining, so the result depends only on
    /// the multiset of patch contents, never on collection order.
    pub fn hash(&self) -> Result<String, PatchError> {
        let mut hashes = Vec::with_capacity(self.patches.len());
        for patch in self.iter() {
            hashes.push(patch.hash()?.to_string());
        }
        hashes.sort();
        Ok(hex::encode(Sha1::digest(hashes.join(" ").as_bytes())))
    }
}
