/// Work root for one harness run
///
/// Every iteration directory, and the namespace sandbox's scaffold, lives
/// under a fresh mkdtemp directory that the main process changes into.
use crate::config::types::{HarnessError, Result};
use crate::kernel::signal::{ignore_libc_internal_signals, install_fault_handler};
use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};
use nix::unistd::{chdir, mkdtemp};
use std::path::{Path, PathBuf};

/// Create the work root from `template` (must end in `XXXXXX`), open it up to
/// every identity the sandbox may switch to, and return its path.
pub fn create_work_root(template: &Path) -> Result<PathBuf> {
    let root = mkdtemp(template).map_err(|e| {
        HarnessError::Logical(format!("failed to mkdtemp {}: {}", template.display(), e))
    })?;

    // Explicit chmod: mkdtemp creates 0700 and the setuid sandbox drops to
    // nobody before it creates iteration directories here.
    fchmodat(
        None,
        &root,
        Mode::from_bits_truncate(0o777),
        FchmodatFlags::FollowSymlink,
    )
    .map_err(|e| HarnessError::Logical(format!("failed to chmod {}: {}", root.display(), e)))?;

    Ok(root)
}

/// One-time setup of the main harness process: signal dispositions, the
/// fault handler, and the work root as current directory.
pub fn setup_main_process(template: &Path) -> Result<PathBuf> {
    ignore_libc_internal_signals();
    install_fault_handler()?;

    let root = create_work_root(template)?;
    chdir(&root)
        .map_err(|e| HarnessError::Logical(format!("failed to chdir {}: {}", root.display(), e)))?;

    log::info!("Work root: {}", root.display());
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn work_root_is_world_writable() {
        let root = create_work_root(&std::env::temp_dir().join("fuzzbox-ws.XXXXXX")).unwrap();
        let mode = std::fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
        std::fs::remove_dir(&root).unwrap();
    }

    #[test]
    fn bad_template_is_logical_error() {
        let err = create_work_root(Path::new("/nonexistent/fuzzbox.XXXXXX")).unwrap_err();
        assert!(matches!(err, HarnessError::Logical(_)));
    }
}
