//! Vendor Patcher: source patches for installed dependency packages
//!
//! Applies unified-diff patch files to packages as part of a package
//! manager's install/update lifecycle, and tracks what was applied so the
//! next cycle only re-patches when the patch set actually changed.
//!
//! # Architecture
//!
//! Packages declare patches in their "extra" configuration bag (inline under
//! `patches`, or in a JSON file referenced by `patches-file`). Once per
//! cycle a [`collector::PatchCollector`] turns those declarations into a
//! [`collection::PatchCollection`], resolving each reference through
//! [`resolver::PathResolver`] (remote patches are downloaded into a
//! [`scratch::ScratchDir`]). The [`driver::PatchDriver`] compares the
//! collection's aggregate hash against the bookkeeping persisted on each
//! package to decide what needs a reinstall, then applies pending patches
//! through [`patcher::Patcher`], which picks a git-native or generic
//! `patch(1)` strategy per target directory.
//!
//! # Host integration
//!
//! Dependency resolution, package (un)installation, downloads and metadata
//! persistence are the host's problem: they are injected via the traits in
//! [`host`]. The external patch tools run through
//! [`executor::ProcessRunner`], also injectable.
//!
//! # Example
//!
//! ```no_run
//! use vendor_patcher::{Patch, PatchCollection};
//!
//! let mut collection = PatchCollection::new();
//! collection.add(Patch::new(
//!     "acme/patches",
//!     "acme/lib:1.2.3",
//!     "patches/fix-crash.diff",
//!     "/project/patches/fix-crash.diff",
//!     "Fix the startup crash",
//!     vec!["-p1".to_string()],
//! ));
//! println!("collected {} patches", collection.len());
//! ```

pub mod collection;
pub mod collector;
pub mod driver;
pub mod error;
pub mod executor;
pub mod host;
pub mod io;
pub mod patch;
pub mod patcher;
pub mod resolver;
pub mod scratch;

// Re-exports
pub use collection::PatchCollection;
pub use collector::{PatchCollector, DEFAULT_PATCH_LEVELS};
pub use driver::{HostServices, PatchDriver};
pub use error::PatchError;
pub use executor::{
    GitApplier, HostPlatform, PatchExecutor, PatchToolApplier, Platform, ProcessOutput,
    ProcessRunner, SystemRunner,
};
pub use host::{
    AppliedPatch, AppliedPatches, EventSink, FsJsonReader, HttpFetcher, InstallationManager,
    JsonReader, MetadataSink, NullEvents, Package, PatchEvent, RemoteFetch,
    EVENT_POST_APPLY_PATCH, EVENT_PRE_APPLY_PATCH,
};
pub use io::{BufferIo, ConsoleIo, Io};
pub use patch::Patch;
pub use patcher::Patcher;
pub use resolver::PathResolver;
pub use scratch::ScratchDir;
