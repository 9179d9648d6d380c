use anyhow::Context;
use caws_core::change::{ChangeSet, FileChange};
use std::path::Path;
use std::process::{Command, Stdio};

/// Files and line counts changed between `base` and the working tree,
/// including files git does not track yet. Paths are relative to `root`.
pub fn collect_changes(root: &Path, base: &str) -> anyhow::Result<ChangeSet> {
    let numstat = run_git(
        root,
        &["diff", "--numstat", "-z", "--no-renames", "--relative", base],
    )?;
    let mut changes =
        ChangeSet::from_numstat(&numstat).context("failed to parse git numstat output")?;
    let tracked = changes.files.len();

    let untracked = run_git(root, &["ls-files", "--others", "--exclude-standard", "-z"])?;
    for rel in untracked.split('\0').filter(|p| !p.is_empty()) {
        let contents = read_untracked(&root.join(rel))
            .with_context(|| format!("failed to read untracked file {rel}"))?;
        changes.push(FileChange::untracked(rel, &contents));
    }

    tracing::debug!(
        base,
        tracked,
        untracked = changes.files.len() - tracked,
        "collected change set"
    );
    Ok(changes)
}

/// Symlinks count as their target path, the way git stores them.
fn read_untracked(path: &Path) -> std::io::Result<Vec<u8>> {
    if std::fs::symlink_metadata(path)?.file_type().is_symlink() {
        let target = std::fs::read_link(path)?;
        return Ok(target.to_string_lossy().into_owned().into_bytes());
    }
    std::fs::read(path)
}

fn run_git(root: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .context("failed to spawn git")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
