/// Mount-aware recursive directory removal.
///
/// A workload may leave mounts anywhere under its working directory, a mount
/// may be stacked several times on the same path, unmounting can expose
/// entries that were hidden underneath, and a mount may have been remounted
/// read-only. Removal therefore runs two bounded retry loops:
/// per entry (unlink, detach-unmount on EBUSY, retry) and per directory
/// (re-list and re-empty while rmdir reports ENOTEMPTY).
use crate::config::types::{HarnessError, Result};
use crate::kernel::mount::detach_unmount;
use log::debug;
use nix::errno::Errno;
use std::fs;
use std::path::{Path, PathBuf};

/// Attempts per entry before an EBUSY unlink or rmdir gives up.
pub const MAX_ENTRY_ATTEMPTS: usize = 100;
/// Re-list passes per directory before ENOTEMPTY gives up.
pub const MAX_RELIST_PASSES: usize = 100;

/// What it took to remove a tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Detach-unmounts performed.
    pub unmounts: usize,
    /// Extra listing passes caused by ENOTEMPTY.
    pub relists: usize,
    /// Entries skipped because they sit on a read-only filesystem.
    pub read_only_skips: usize,
}

fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(0))
}

fn transient(what: &str, path: &Path, err: impl std::fmt::Display) -> HarnessError {
    HarnessError::Transient(format!("{}({}) failed: {}", what, path.display(), err))
}

/// Remove `dir` and everything below it, unmounting whatever is in the way.
///
/// Budget exhaustion and unexpected errors are `Transient`: they come from
/// the environment the workload left behind, not from a harness bug.
pub fn remove_dir_tree(dir: &Path) -> Result<ReclaimStats> {
    let mut stats = ReclaimStats::default();
    remove_dir_inner(dir, &mut stats)?;
    Ok(stats)
}

fn list_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = fs::read_dir(dir).map_err(|e| {
        if errno_of(&e) == Errno::EMFILE {
            // The workload can prlimit(NOFILE) its ancestors.
            transient("opendir (NOFILE exhausted)", dir, e)
        } else {
            transient("opendir", dir, e)
        }
    })?;

    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| transient("readdir", dir, e))?;
        entries.push(entry.path());
    }
    Ok(entries)
}

fn remove_file_entry(path: &Path, stats: &mut ReclaimStats) -> Result<()> {
    let mut attempt = 0;
    loop {
        debug!("unlink({})", path.display());
        let err = match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match errno_of(&err) {
            Errno::EROFS => {
                debug!("ignoring EROFS");
                stats.read_only_skips += 1;
                return Ok(());
            }
            Errno::EBUSY if attempt < MAX_ENTRY_ATTEMPTS => {
                debug!("umount({})", path.display());
                detach_unmount(path).map_err(|e| transient("umount", path, e))?;
                stats.unmounts += 1;
                attempt += 1;
            }
            _ => return Err(transient("unlink", path, err)),
        }
    }
}

fn empty_dir(dir: &Path, stats: &mut ReclaimStats) -> Result<()> {
    for path in list_entries(dir)? {
        let meta = fs::symlink_metadata(&path).map_err(|e| transient("lstat", &path, e))?;
        if meta.is_dir() {
            remove_dir_inner(&path, stats)?;
        } else {
            remove_file_entry(&path, stats)?;
        }
    }
    Ok(())
}

fn remove_dir_inner(dir: &Path, stats: &mut ReclaimStats) -> Result<()> {
    let mut relists = 0;

    'relist: loop {
        empty_dir(dir, stats)?;

        for attempt in 0..=MAX_ENTRY_ATTEMPTS {
            debug!("rmdir({})", dir.display());
            let err = match fs::remove_dir(dir) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if attempt == MAX_ENTRY_ATTEMPTS {
                return Err(transient("rmdir", dir, err));
            }

            match errno_of(&err) {
                Errno::EROFS => {
                    debug!("ignoring EROFS");
                    stats.read_only_skips += 1;
                    return Ok(());
                }
                Errno::EBUSY => {
                    debug!("umount({})", dir.display());
                    detach_unmount(dir).map_err(|e| transient("umount", dir, e))?;
                    stats.unmounts += 1;
                }
                Errno::ENOTEMPTY if relists < MAX_RELIST_PASSES => {
                    relists += 1;
                    stats.relists += 1;
                    continue 'relist;
                }
                _ => return Err(transient("rmdir", dir, err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::mkdtemp;

    fn scratch() -> PathBuf {
        mkdtemp(&std::env::temp_dir().join("fuzzbox-cleanup.XXXXXX")).unwrap()
    }

    #[test]
    fn removes_nested_tree() {
        let root = scratch();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/file"), b"x").unwrap();
        fs::write(root.join("a/b/c/deep"), b"y").unwrap();
        fs::write(root.join("top"), b"z").unwrap();

        let stats = remove_dir_tree(&root).unwrap();
        assert!(!root.exists());
        assert_eq!(stats.unmounts, 0);
        assert_eq!(stats.relists, 0);
    }

    #[test]
    fn removes_empty_directory() {
        let root = scratch();
        remove_dir_tree(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn symlinks_are_unlinked_not_followed() {
        let root = scratch();
        let outside = scratch();
        fs::write(outside.join("keep"), b"keep").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        remove_dir_tree(&root).unwrap();
        assert!(!root.exists());
        assert!(outside.join("keep").exists());

        remove_dir_tree(&outside).unwrap();
    }

    #[test]
    fn missing_directory_is_transient() {
        let err = remove_dir_tree(Path::new("/nonexistent/fuzzbox-reclaim")).unwrap_err();
        assert!(matches!(err, HarnessError::Transient(_)));
    }
}
