//! Generic strategy: the `patch(1)` utility.
//!
//! Fallback for target directories that are not version-control checkouts.
//! On Windows the tool is discovered next to a Git for Windows installation
//! before falling back to a bare `patch` on the search path.

use crate::error::PatchError;
use crate::executor::{probe_command, PatchExecutor, ProcessRunner};
use crate::io::Io;
use crate::patch::Patch;
use crate::scratch::ScratchDir;
use std::path::Path;
use std::rc::Rc;

const WINDOWS_PATCH_HELP: &str = "The patch command is currently not available.\n\
You have these options:\n\
1. Install Git for Windows, and add it to the PATH environment variable\n\
2. Find a Windows port of the \"patch\" GNU utility and add it to a directory in the current PATH";

/// Platform capabilities the discovery logic depends on, injected so the
/// Windows path can be exercised without a real shell.
pub trait Platform {
    fn is_windows(&self) -> bool;

    fn is_file(&self, path: &str) -> bool;
}

pub struct HostPlatform;

impl Platform for HostPlatform {
    fn is_windows(&self) -> bool {
        cfg!(windows)
    }

    fn is_file(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }
}

pub struct PatchToolApplier {
    runner: Rc<dyn ProcessRunner>,
    io: Rc<dyn Io>,
    scratch: Rc<ScratchDir>,
    command: String,
}

impl PatchToolApplier {
    /// Fails with `CommandNotFound` when no usable patch tool exists.
    pub fn new(
        runner: Rc<dyn ProcessRunner>,
        io: Rc<dyn Io>,
        scratch: Rc<ScratchDir>,
        platform: &dyn Platform,
    ) -> Result<Self, PatchError> {
        let command = if platform.is_windows() {
            discover_windows_patch(runner.as_ref(), platform)?
        } else {
            probe_command(runner.as_ref(), "patch", "--version")?;
            "patch".to_string()
        };
        Ok(PatchToolApplier {
            runner,
            io,
            scratch,
            command,
        })
    }

    /// The patch command in use (mainly informational).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Dry-run the patch and recognize the tool's full-ignore report.
    fn is_already_applied(
        &self,
        patch: &Patch,
        base_dir: &Path,
        level: &str,
    ) -> Result<bool, PatchError> {
        let args = self.build_args(patch, base_dir, level, true)?;
        let output = self.runner.run(&self.command, &args)?;
        let text = output.diagnostic();
        Ok(output.status == 1 && text.contains("Skipping patch.") && all_hunks_ignored(text))
    }

    fn build_args(
        &self,
        patch: &Patch,
        base_dir: &Path,
        level: &str,
        dry_run: bool,
    ) -> Result<Vec<String>, PatchError> {
        let reject_file = self.scratch.new_path(".rej")?;
        let mut args = vec![
            level.to_string(),
            // back up mismatches only if otherwise requested
            "--no-backup-if-mismatch".to_string(),
            // ignore patches already applied to the file (aka --forward)
            "-N".to_string(),
            // change the working directory (aka --directory)
            "-d".to_string(),
            base_dir.display().to_string(),
            // read patch from the file instead of stdin (aka --input)
            "-i".to_string(),
            patch.local_path().to_string(),
            // output rejects to a scratch file (aka --reject-file)
            "-r".to_string(),
            reject_file.display().to_string(),
        ];
        if dry_run {
            args.push("--dry-run".to_string());
        }
        Ok(args)
    }
}

impl PatchExecutor for PatchToolApplier {
    fn apply_patch_level(
        &self,
        patch: &Patch,
        base_dir: &Path,
        level: &str,
    ) -> Result<(), PatchError> {
        if self.is_already_applied(patch, base_dir, level)? {
            return Err(PatchError::already_applied(patch));
        }
        let args = self.build_args(patch, base_dir, level, false)?;
        if self.io.is_verbose() {
            self.io.write(&format!(
                "Patching with \"{}\" using patch level {level}.",
                self.command
            ));
        }
        let output = self.runner.run(&self.command, &args)?;
        if output.success() {
            return Ok(());
        }
        let text = output.diagnostic();
        // a full-ignore on the real run means the changes were already
        // present; treat the re-apply as a success
        if all_hunks_ignored(text) {
            return Ok(());
        }
        Err(PatchError::not_applied(
            patch,
            &format!(
                "failed to apply the patch with the patch command: {}",
                text.trim_end()
            ),
        ))
    }
}

fn discover_windows_patch(
    runner: &dyn ProcessRunner,
    platform: &dyn Platform,
) -> Result<String, PatchError> {
    if let Some(git_root) = find_windows_git_root(runner) {
        let candidate = format!("{git_root}/usr/bin/patch.exe");
        if platform.is_file(&candidate)
            && probe_command(runner, &candidate, "--version").is_ok()
        {
            return Ok(candidate);
        }
    }
    if probe_command(runner, "patch", "--version").is_ok() {
        return Ok("patch".to_string());
    }
    Err(PatchError::command_not_found(
        "patch",
        Some(WINDOWS_PATCH_HELP.to_string()),
    ))
}

/// Locate a Git for Windows installation root by probing `where git.exe` and
/// pattern-matching the reported paths for a `cmd`/`bin` parent segment.
fn find_windows_git_root(runner: &dyn ProcessRunner) -> Option<String> {
    let output = runner.run("where", &["git.exe".to_string()]).ok()?;
    if !output.success() {
        return None;
    }
    for line in output.stdout.lines() {
        let path = line.trim().replace('\\', "/");
        let lower = path.to_ascii_lowercase();
        for marker in ["/cmd/git.exe", "/bin/git.exe"] {
            if lower.ends_with(marker) && path.len() > marker.len() {
                return Some(path[..path.len() - marker.len()].to_string());
            }
        }
    }
    None
}

/// True when any line reports "<N> out of <N> hunks ignored" with the same
/// count on both sides (a full ignore, not a partial one).
pub(crate) fn all_hunks_ignored(text: &str) -> bool {
    text.lines().any(line_reports_full_ignore)
}

fn line_reports_full_ignore(line: &str) -> bool {
    fn leading_number(s: &str) -> Option<(&str, &str)> {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if end == 0 {
            None
        } else {
            Some((&s[..end], &s[end..]))
        }
    }

    let Some((first, rest)) = leading_number(line) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(" out of ") else {
        return false;
    };
    let Some((second, rest)) = leading_number(rest) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(" hunk") else {
        return false;
    };
    let rest = rest.strip_prefix('s').unwrap_or(rest);
    rest.starts_with(" ignored") && first == second
}
