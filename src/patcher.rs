//! Applies a single patch to a package.
//!
//! Picks the strategy matching the target directory (git checkout vs plain
//! tree), fires pre/post notifications around the attempt, and converts the
//! already-applied signal into a soft success.

use crate::error::PatchError;
use crate::executor::{
    GitApplier, PatchExecutor, PatchToolApplier, Platform, ProcessRunner,
};
use crate::host::{EventSink, InstallationManager, Package, PatchEvent};
use crate::io::Io;
use crate::patch::Patch;
use crate::scratch::ScratchDir;
use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct Patcher {
    io: Rc<dyn Io>,
    installs: Rc<dyn InstallationManager>,
    events: Rc<dyn EventSink>,
    runner: Rc<dyn ProcessRunner>,
    platform: Rc<dyn Platform>,
    scratch: Rc<ScratchDir>,
    // strategies are constructed lazily (construction probes the external
    // tool) and cached for the patcher's lifetime
    git: RefCell<Option<Rc<GitApplier>>>,
    patch_tool: RefCell<Option<Rc<PatchToolApplier>>>,
}

impl Patcher {
    pub fn new(
        io: Rc<dyn Io>,
        installs: Rc<dyn InstallationManager>,
        events: Rc<dyn EventSink>,
        runner: Rc<dyn ProcessRunner>,
        platform: Rc<dyn Platform>,
        scratch: Rc<ScratchDir>,
    ) -> Self {
        Patcher {
            io,
            installs,
            events,
            runner,
            platform,
            scratch,
            git: RefCell::new(None),
            patch_tool: RefCell::new(None),
        }
    }

    /// Apply one patch to a package's install root.
    ///
    /// The pre-apply event always precedes the attempt and the post-apply
    /// event always follows it, including when a hard error propagates.
    /// An already-applied outcome is reported and treated as success.
    pub fn apply_patch(&self, patch: &Patch, package: &Package) -> Result<(), PatchError> {
        self.io.write_partial(&format!(
            "Applying patch {}/{} to {}... ",
            patch.from_package(),
            patch.description(),
            package.name()
        ));
        let base_dir = self.base_dir(package)?;
        self.events.dispatch(PatchEvent::pre_apply(patch));
        let outcome = self
            .executor_for(&base_dir)
            .and_then(|executor| executor.apply_patch(patch, &base_dir));
        let outcome = match outcome {
            Ok(()) => {
                self.io.write("done.");
                Ok(())
            }
            Err(err) if err.is_already_applied() => {
                self.io.write("patch was already applied.");
                Ok(())
            }
            // a hard error leaves the progress line open; the propagating
            // error's message follows it
            Err(err) => Err(err),
        };
        self.events.dispatch(PatchEvent::post_apply(patch));
        outcome
    }

    fn base_dir(&self, package: &Package) -> Result<PathBuf, PatchError> {
        if package.is_root() {
            env::current_dir().map_err(|source| PatchError::Io {
                path: ".".to_string(),
                source,
            })
        } else {
            self.installs.install_path(package)
        }
    }

    fn executor_for(&self, base_dir: &Path) -> Result<Rc<dyn PatchExecutor>, PatchError> {
        if GitApplier::usable_for(base_dir) {
            Ok(self.git_applier()?)
        } else {
            Ok(self.patch_tool_applier()?)
        }
    }

    fn git_applier(&self) -> Result<Rc<dyn PatchExecutor>, PatchError> {
        let mut slot = self.git.borrow_mut();
        let applier = match slot.as_ref() {
            Some(applier) => applier.clone(),
            None => {
                let applier = Rc::new(GitApplier::new(self.runner.clone(), self.io.clone())?);
                *slot = Some(applier.clone());
                applier
            }
        };
        Ok(applier)
    }

    fn patch_tool_applier(&self) -> Result<Rc<dyn PatchExecutor>, PatchError> {
        let mut slot = self.patch_tool.borrow_mut();
        let applier = match slot.as_ref() {
            Some(applier) => applier.clone(),
            None => {
                let applier = Rc::new(PatchToolApplier::new(
                    self.runner.clone(),
                    self.io.clone(),
                    self.scratch.clone(),
                    self.platform.as_ref(),
                )?);
                *slot = Some(applier.clone());
                applier
            }
        };
        Ok(applier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProcessOutput;
    use crate::io::BufferIo;
    use serde_json::Map;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct FixedInstalls {
        path: PathBuf,
    }

    impl InstallationManager for FixedInstalls {
        fn install_path(&self, _package: &Package) -> Result<PathBuf, PatchError> {
            Ok(self.path.clone())
        }

        fn uninstall(&self, _package: &Package) -> Result<(), PatchError> {
            Ok(())
        }
    }

    struct RecordingEvents {
        names: RefCell<Vec<&'static str>>,
    }

    impl EventSink for RecordingEvents {
        fn dispatch(&self, event: PatchEvent<'_>) {
            self.names.borrow_mut().push(event.name);
        }
    }

    struct ScriptedRunner {
        outputs: RefCell<Vec<ProcessOutput>>,
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, _program: &str, _args: &[String]) -> Result<ProcessOutput, PatchError> {
            Ok(self.outputs.borrow_mut().remove(0))
        }
    }

    struct PosixPlatform;

    impl Platform for PosixPlatform {
        fn is_windows(&self) -> bool {
            false
        }

        fn is_file(&self, path: &str) -> bool {
            Path::new(path).is_file()
        }
    }

    fn patch() -> Patch {
        Patch::new(
            "acme/patches",
            "acme/lib",
            "fix.diff",
            "/tmp/fix.diff",
            "Fix",
            vec!["-p1".to_string()],
        )
    }

    fn harness(
        outputs: Vec<ProcessOutput>,
        install_dir: PathBuf,
    ) -> (Patcher, Rc<BufferIo>, Rc<RecordingEvents>) {
        let io = Rc::new(BufferIo::new(false));
        let events = Rc::new(RecordingEvents {
            names: RefCell::new(Vec::new()),
        });
        let patcher = Patcher::new(
            io.clone(),
            Rc::new(FixedInstalls { path: install_dir }),
            events.clone(),
            Rc::new(ScriptedRunner {
                outputs: RefCell::new(outputs),
            }),
            Rc::new(PosixPlatform),
            Rc::new(ScratchDir::system()),
        );
        (patcher, io, events)
    }

    #[test]
    fn git_strategy_selected_for_git_checkouts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        // git --version probe, check run, real run
        let (patcher, io, events) = harness(
            vec![
                ProcessOutput::default(),
                ProcessOutput::default(),
                ProcessOutput::default(),
            ],
            dir.path().to_path_buf(),
        );
        let package = Package::new("acme/lib", "1.0.0", Map::new());
        patcher.apply_patch(&patch(), &package).unwrap();
        assert!(io.contents().contains("done."));
        assert_eq!(
            *events.names.borrow(),
            ["pre-apply-patch", "post-apply-patch"]
        );
    }

    #[test]
    fn already_applied_is_soft_success_with_post_event() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let (patcher, io, events) = harness(
            vec![
                ProcessOutput::default(),
                ProcessOutput {
                    status: 0,
                    stdout: String::new(),
                    stderr: "Skipped patch 'a.txt'.".to_string(),
                },
            ],
            dir.path().to_path_buf(),
        );
        let package = Package::new("acme/lib", "1.0.0", Map::new());
        patcher.apply_patch(&patch(), &package).unwrap();
        assert!(io.contents().contains("patch was already applied."));
        assert_eq!(
            *events.names.borrow(),
            ["pre-apply-patch", "post-apply-patch"]
        );
    }

    #[test]
    fn post_event_fires_even_on_hard_failure() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let (patcher, io, events) = harness(
            vec![
                ProcessOutput::default(),
                ProcessOutput {
                    status: 1,
                    stdout: String::new(),
                    stderr: "error: corrupt patch".to_string(),
                },
            ],
            dir.path().to_path_buf(),
        );
        let package = Package::new("acme/lib", "1.0.0", Map::new());
        let err = patcher.apply_patch(&patch(), &package).unwrap_err();
        assert!(matches!(err, PatchError::NotApplied { .. }));
        assert_eq!(
            *events.names.borrow(),
            ["pre-apply-patch", "post-apply-patch"]
        );
        // the progress line stays open; the caller reports the error
        assert!(io
            .contents()
            .ends_with("Applying patch acme/patches/Fix to acme/lib... "));
    }
}
