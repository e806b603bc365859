//! Smoke tests against the real `patch(1)` and `git` binaries. Each test
//! probes for its tool and returns early when it is not installed.

use std::fs;
use std::rc::Rc;
use tempfile::TempDir;
use vendor_patcher::executor::{
    GitApplier, HostPlatform, PatchExecutor, PatchToolApplier, SystemRunner,
};
use vendor_patcher::{BufferIo, Patch, PatchError, ScratchDir};

const BEFORE: &str = "hello\nworld\n";
const AFTER: &str = "goodbye\nworld\n";
const DIFF: &str = "--- a/greeting.txt\n\
                    +++ b/greeting.txt\n\
                    @@ -1,2 +1,2 @@\n\
                    -hello\n\
                    +goodbye\n\
                    \x20world\n";

fn setup() -> (TempDir, Patch) {
    let dir = TempDir::new().unwrap();
    let target_dir = dir.path().join("target");
    fs::create_dir(&target_dir).unwrap();
    fs::write(target_dir.join("greeting.txt"), BEFORE).unwrap();
    let diff_path = dir.path().join("greeting.diff");
    fs::write(&diff_path, DIFF).unwrap();
    let patch = Patch::new(
        "acme/patches",
        "acme/lib",
        "greeting.diff",
        diff_path.to_string_lossy().replace('\\', "/"),
        "Change the greeting",
        vec!["-p1".to_string()],
    );
    (dir, patch)
}

fn target_contents(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("target/greeting.txt")).unwrap()
}

#[test]
fn patch_tool_applies_and_detects_reapply() {
    let (dir, patch) = setup();
    let applier = match PatchToolApplier::new(
        Rc::new(SystemRunner),
        Rc::new(BufferIo::new(false)),
        Rc::new(ScratchDir::system()),
        &HostPlatform,
    ) {
        Ok(applier) => applier,
        Err(PatchError::CommandNotFound { .. }) => return,
        Err(other) => panic!("unexpected probe failure: {other}"),
    };
    let base = dir.path().join("target");

    applier.apply_patch(&patch, &base).unwrap();
    assert_eq!(target_contents(&dir), AFTER);

    let err = applier.apply_patch(&patch, &base).unwrap_err();
    assert!(err.is_already_applied());
    assert_eq!(target_contents(&dir), AFTER);
}

#[test]
fn git_apply_patches_a_plain_tree() {
    let (dir, patch) = setup();
    let applier = match GitApplier::new(Rc::new(SystemRunner), Rc::new(BufferIo::new(false))) {
        Ok(applier) => applier,
        Err(PatchError::CommandNotFound { .. }) => return,
        Err(other) => panic!("unexpected probe failure: {other}"),
    };
    let base = dir.path().join("target");

    applier.apply_patch(&patch, &base).unwrap();
    assert_eq!(target_contents(&dir), AFTER);

    // git apply rejects a second application outright
    let err = applier.apply_patch(&patch, &base).unwrap_err();
    assert!(matches!(err, PatchError::NotApplied { .. }));
}

#[test]
fn git_strategy_is_selected_by_checkout_marker() {
    let dir = TempDir::new().unwrap();
    assert!(!GitApplier::usable_for(dir.path()));
    fs::create_dir(dir.path().join(".git")).unwrap();
    assert!(GitApplier::usable_for(dir.path()));
    // a .git file (worktree/submodule pointer) is not enough
    let other = TempDir::new().unwrap();
    fs::write(other.path().join(".git"), "gitdir: elsewhere").unwrap();
    assert!(!GitApplier::usable_for(other.path()));
}
