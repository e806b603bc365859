//! Patch application strategies.
//!
//! Both strategies drive an external tool through [`ProcessRunner`] and share
//! the level-retry loop of [`PatchExecutor::apply_patch`]: each configured
//! patch level is tried in order until one succeeds, an already-applied
//! signal terminates the loop immediately, and if every level fails the first
//! tool-reported failure is surfaced.

pub mod git;
pub mod patch_tool;
pub mod shell;

use crate::error::PatchError;
use crate::patch::Patch;
use std::path::Path;
use std::process::Command;

pub use git::GitApplier;
pub use patch_tool::{HostPlatform, PatchToolApplier, Platform};

/// Exit code, stdout and stderr of a finished external command.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stderr, falling back to stdout when the tool wrote nothing there.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Runs one external command to completion, collecting its output streams.
///
/// Arguments are passed verbatim (no shell interpretation); a shell-backed
/// implementation must apply the escaping rules from [`shell`].
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, PatchError>;
}

/// [`ProcessRunner`] over `std::process::Command`. Blocks until the command
/// exits; there is no timeout layer.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, PatchError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| PatchError::Process {
                command: program.to_string(),
                source,
            })?;
        Ok(ProcessOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Check that a command is runnable by invoking it with a probe argument.
pub fn probe_command(
    runner: &dyn ProcessRunner,
    command: &str,
    argument: &str,
) -> Result<(), PatchError> {
    let args: Vec<String> = if argument.is_empty() {
        Vec::new()
    } else {
        vec![argument.to_string()]
    };
    match runner.run(command, &args) {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => {
            let stderr = output.stderr.trim();
            let detail = if stderr.is_empty() {
                None
            } else {
                Some(stderr.to_string())
            };
            Err(PatchError::command_not_found(command, detail))
        }
        Err(_) => Err(PatchError::command_not_found(command, None)),
    }
}

/// A strategy able to apply one patch to a base directory.
pub trait PatchExecutor {
    /// Apply the patch using one specific patch level.
    fn apply_patch_level(
        &self,
        patch: &Patch,
        base_dir: &Path,
        level: &str,
    ) -> Result<(), PatchError>;

    /// Try each configured level in order until one succeeds.
    ///
    /// An already-applied signal is authoritative and propagates immediately;
    /// tool-reported failures are retried at the next level, and the first
    /// one is raised if no level works.
    fn apply_patch(&self, patch: &Patch, base_dir: &Path) -> Result<(), PatchError> {
        let mut first_failure = None;
        for level in patch.levels() {
            match self.apply_patch_level(patch, base_dir, level) {
                Ok(()) => return Ok(()),
                Err(err @ PatchError::NotApplied { .. }) => {
                    first_failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(first_failure
            .unwrap_or_else(|| PatchError::not_applied(patch, "no patch levels configured")))
    }
}
