//! Workspace snapshots and diffs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `relative POSIX path -> sha256 hex` for every readable file in a tree.
pub type WorkspaceSnapshot = BTreeMap<String, String>;

/// Classification of every path across a before/after snapshot pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceDiff {
    pub added: BTreeMap<String, String>,
    pub modified: BTreeMap<String, String>,
    pub deleted: BTreeMap<String, String>,
    pub unchanged: BTreeMap<String, String>,
}

impl WorkspaceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.unchanged.is_empty()
    }
}

/// Hash every file under `root`.
///
/// Keys are workspace-relative paths with `/` separators. Files that
/// cannot be opened or read (dangling symlinks, permission errors) are
/// skipped; the run continues without them.
pub fn snapshot_workspace(root: &Path) -> WorkspaceSnapshot {
    let mut snapshot = WorkspaceSnapshot::new();
    walk(root, root, &mut snapshot);
    snapshot
}

fn walk(root: &Path, dir: &Path, snapshot: &mut WorkspaceSnapshot) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(root, &path, snapshot);
        } else if file_type.is_file() {
            if let Some(digest) = hash_file(&path) {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                snapshot.insert(relative, digest);
            }
        }
        // Symlinks and special files are not followed.
    }
}

fn hash_file(path: &Path) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).ok()?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Classify every file as added, modified, deleted, or unchanged.
pub fn diff_snapshots(before: &WorkspaceSnapshot, after: &WorkspaceSnapshot) -> WorkspaceDiff {
    let mut diff = WorkspaceDiff::default();
    for (name, digest) in after {
        match before.get(name) {
            None => {
                diff.added.insert(name.clone(), digest.clone());
            }
            Some(old) if old != digest => {
                diff.modified.insert(name.clone(), digest.clone());
            }
            Some(_) => {
                diff.unchanged.insert(name.clone(), digest.clone());
            }
        }
    }
    for (name, digest) in before {
        if !after.contains_key(name) {
            diff.deleted.insert(name.clone(), digest.clone());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_workspaces_produce_empty_buckets() {
        let before = tempfile::tempdir().unwrap();
        let after = tempfile::tempdir().unwrap();
        let diff = diff_snapshots(
            &snapshot_workspace(before.path()),
            &snapshot_workspace(after.path()),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn nested_paths_use_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        fs::write(dir.path().join("src/deep/file.txt"), b"content").unwrap();
        let snapshot = snapshot_workspace(dir.path());
        assert!(snapshot.contains_key("src/deep/file.txt"));
    }

    #[test]
    fn all_four_buckets_classify_correctly() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stays.txt"), b"same").unwrap();
        fs::write(dir.path().join("changes.txt"), b"v1").unwrap();
        fs::write(dir.path().join("goes.txt"), b"bye").unwrap();
        let before = snapshot_workspace(dir.path());

        fs::write(dir.path().join("changes.txt"), b"v2").unwrap();
        fs::remove_file(dir.path().join("goes.txt")).unwrap();
        fs::write(dir.path().join("arrives.txt"), b"hi").unwrap();
        let after = snapshot_workspace(dir.path());

        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.added.keys().collect::<Vec<_>>(), ["arrives.txt"]);
        assert_eq!(diff.modified.keys().collect::<Vec<_>>(), ["changes.txt"]);
        assert_eq!(diff.deleted.keys().collect::<Vec<_>>(), ["goes.txt"]);
        assert_eq!(diff.unchanged.keys().collect::<Vec<_>>(), ["stays.txt"]);
    }

    #[test]
    fn identical_content_hashes_equal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"same bytes").unwrap();
        fs::write(dir.path().join("b.txt"), b"same bytes").unwrap();
        let snapshot = snapshot_workspace(dir.path());
        assert_eq!(snapshot["a.txt"], snapshot["b.txt"]);
        assert_eq!(snapshot["a.txt"].len(), 64);
    }
}
