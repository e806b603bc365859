//! Version-control-native strategy: `git apply`.

use crate::error::PatchError;
use crate::executor::{probe_command, shell, PatchExecutor, ProcessRunner};
use crate::io::Io;
use crate::patch::Patch;
use std::path::Path;
use std::rc::Rc;

pub struct GitApplier {
    runner: Rc<dyn ProcessRunner>,
    io: Rc<dyn Io>,
}

impl GitApplier {
    /// Fails with `CommandNotFound` when `git` is not runnable.
    pub fn new(runner: Rc<dyn ProcessRunner>, io: Rc<dyn Io>) -> Result<Self, PatchError> {
        probe_command(runner.as_ref(), "git", "--version")?;
        Ok(GitApplier { runner, io })
    }

    /// This strategy handles directories that are git checkouts.
    pub fn usable_for(base_dir: &Path) -> bool {
        base_dir.join(".git").is_dir()
    }

    fn build_args(
        patch_file: &str,
        base_dir: &Path,
        level: &str,
        check_only: bool,
    ) -> Vec<String> {
        let mut args = vec![
            // run git as if it was started in base_dir
            "-C".to_string(),
            base_dir.display().to_string(),
            "apply".to_string(),
            level.to_string(),
        ];
        if check_only {
            args.push("--check".to_string());
            args.push("-v".to_string());
        }
        args.push(patch_file.to_string());
        args
    }
}

impl PatchExecutor for GitApplier {
    /// Runs the check-only form first, then the for-real form with the same
    /// level. A dry run that passes is not a persisted change, so both
    /// invocations are required.
    fn apply_patch_level(
        &self,
        patch: &Patch,
        base_dir: &Path,
        level: &str,
    ) -> Result<(), PatchError> {
        for check_only in [true, false] {
            let args = Self::build_args(patch.local_path(), base_dir, level, check_only);
            if check_only && self.io.is_verbose() {
                self.io.write(&format!(
                    "Testing ability to patch with \"git apply\" using patch level {level} with the following command:\n{}",
                    shell::render_command("git", &args)
                ));
            }
            let output = self.runner.run("git", &args)?;
            if check_only && output.stderr.starts_with("Skipped") {
                return Err(PatchError::already_applied(patch));
            }
            if !output.success() {
                return Err(PatchError::not_applied(
                    patch,
                    &format!(
                        "failed to apply the patch with \"git apply\": {}",
                        output.stderr.trim_end()
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProcessOutput;
    use crate::io::BufferIo;
    use std::cell::RefCell;

    struct ScriptedRunner {
        outputs: RefCell<Vec<ProcessOutput>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<ProcessOutput>) -> Self {
            ScriptedRunner {
                outputs: RefCell::new(outputs),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, PatchError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.borrow_mut().push(call);
            Ok(self.outputs.borrow_mut().remove(0))
        }
    }

    fn ok() -> ProcessOutput {
        ProcessOutput::default()
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

    fn applier(outputs: Vec<ProcessOutput>) -> (GitApplier, Rc<ScriptedRunner>) {
        let mut with_probe = vec![ok()];
        with_probe.extend(outputs);
        let runner = Rc::new(ScriptedRunner::new(with_probe));
        let applier = GitApplier::new(runner.clone(), Rc::new(BufferIo::new(false))).unwrap();
        (applier, runner)
    }

    #[test]
    fn check_then_apply_both_run() {
        let (applier, runner) = applier(vec![ok(), ok()]);
        applier
            .apply_patch_level(&patch(), Path::new("/base"), "-p1")
            .unwrap();
        let calls = runner.calls.borrow();
        // probe + check + real
        assert_eq!(calls.len(), 3);
        assert!(calls[1].contains(&"--check".to_string()));
        assert!(!calls[2].contains(&"--check".to_string()));
        assert_eq!(calls[1][..4], calls[2][..4]);
    }

    #[test]
    fn skipped_diagnostic_is_already_applied() {
        let (applier, runner) = applier(vec![ProcessOutput {
            status: 0,
            stdout: String::new(),
            stderr: "Skipped patch 'file.txt'.\n".to_string(),
        }]);
        let err = applier
            .apply_patch_level(&patch(), Path::new("/base"), "-p1")
            .unwrap_err();
        assert!(err.is_already_applied());
        // the for-real run is never attempted
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn nonzero_check_exit_is_not_applied() {
        let (applier, _) = applier(vec![ProcessOutput {
            status: 1,
            stdout: String::new(),
            stderr: "error: patch failed".to_string(),
        }]);
        let err = applier
            .apply_patch_level(&patch(), Path::new("/base"), "-p1")
            .unwrap_err();
        assert!(matches!(err, PatchError::NotApplied { .. }));
        assert!(err.to_string().contains("git apply"));
    }

    #[test]
    fn probe_failure_is_command_not_found() {
        let runner = Rc::new(ScriptedRunner::new(vec![ProcessOutput {
            status: 127,
            stdout: String::new(),
            stderr: String::new(),
        }]));
        match GitApplier::new(runner, Rc::new(BufferIo::new(false))) {
            Err(PatchError::CommandNotFound { command, .. }) => assert_eq!(command, "git"),
            Ok(_) => panic!("expected CommandNotFound, got Ok"),
            Err(other) => panic!("expected CommandNotFound, got {other:?}"),
        }
    }
}
