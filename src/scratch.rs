//! Process-local scratch directory.
//!
//! Holds downloaded patches and reject files. The directory is created on
//! first use, hands out counter-based unique sub-paths, and is removed
//! (best effort) when the owning [`ScratchDir`] is dropped.

use crate::error::PatchError;
use std::cell::{Cell, RefCell};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct ScratchDir {
    parent: Option<PathBuf>,
    dir: RefCell<Option<TempDir>>,
    counter: Cell<u64>,
}

impl ScratchDir {
    /// Scratch space under the system temporary directory.
    pub fn system() -> Self {
        ScratchDir {
            parent: None,
            dir: RefCell::new(None),
            counter: Cell::new(0),
        }
    }

    /// Scratch space under a caller-chosen parent directory, which must
    /// already exist.
    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        ScratchDir {
            parent: Some(parent.into()),
            ..ScratchDir::system()
        }
    }

    /// The scratch directory itself, created on first call.
    pub fn path(&self) -> Result<PathBuf, PatchError> {
        if let Some(dir) = self.dir.borrow().as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let parent = match &self.parent {
            Some(parent) => parent.clone(),
            None => env::temp_dir(),
        };
        if !parent.is_dir() {
            return Err(PatchError::path_not_found(
                parent.display().to_string(),
                None,
            ));
        }
        let dir = tempfile::Builder::new()
            .prefix("pch")
            .tempdir_in(&parent)
            .map_err(|err| {
                let path = parent.display().to_string();
                if err.kind() == std::io::ErrorKind::PermissionDenied {
                    PatchError::PathNotWritable { path }
                } else {
                    PatchError::PathNotCreated { path }
                }
            })?;
        let path = dir.path().to_path_buf();
        *self.dir.borrow_mut() = Some(dir);
        Ok(path)
    }

    /// A unique path inside the scratch directory. Nothing is created at the
    /// returned path.
    pub fn new_path(&self, suffix: &str) -> Result<PathBuf, PatchError> {
        let counter = self.counter.get();
        self.counter.set(counter + 1);
        Ok(self.path()?.join(format!("{counter}{suffix}")))
    }
}
