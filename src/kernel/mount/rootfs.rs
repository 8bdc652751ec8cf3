//! Private root for namespace-isolated workers.
//!
//! Layout built under the scaffold directory `S`:
//!
//! ```text
//! S/            tmpfs, becomes the new root via pivot_root
//! S/newroot/    chroot target
//! S/newroot/dev recursive private bind of the host /dev
//! S/pivot/      put_old for pivot_root, detached right after
//! ```
use crate::config::types::{HarnessError, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, chroot, mkdir, pivot_root};
use std::path::Path;

fn mkdir_mandatory(path: &Path, mode: u32) -> Result<()> {
    mkdir(path, Mode::from_bits_truncate(mode)).map_err(|e| {
        HarnessError::Logical(format!("mkdir({}) failed: {}", path.display(), e))
    })
}

fn chdir_mandatory(path: &Path) -> Result<()> {
    chdir(path)
        .map_err(|e| HarnessError::Logical(format!("chdir({}) failed: {}", path.display(), e)))
}

/// Detach-unmount `path`: hide it now, release it once unreferenced.
pub fn detach_unmount(path: &Path) -> nix::Result<()> {
    umount2(path, MntFlags::MNT_DETACH)
}

/// Build a tmpfs root holding only a bind of /dev, switch into it and chroot.
///
/// Must run inside a private mount namespace. Every step is mandatory except
/// pivot_root, which is unsupported in some environments (e.g. when the
/// current root is itself a rootfs); then we only chdir into the scaffold
/// before chrooting.
pub fn build_private_root(scaffold: &Path) -> Result<()> {
    let newroot = scaffold.join("newroot");
    let newroot_dev = newroot.join("dev");
    let put_old = scaffold.join("pivot");

    mkdir_mandatory(scaffold, 0o777)?;
    mount(
        Some(""),
        scaffold,
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| HarnessError::Logical(format!("mount(tmpfs) failed: {}", e)))?;

    mkdir_mandatory(&newroot, 0o777)?;
    mkdir_mandatory(&newroot_dev, 0o700)?;
    mount(
        Some("/dev"),
        &newroot_dev,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| HarnessError::Logical(format!("mount(dev) failed: {}", e)))?;

    mkdir_mandatory(&put_old, 0o777)?;

    match pivot_root(scaffold, &put_old) {
        Ok(()) => {
            chdir_mandatory(Path::new("/"))?;
            detach_unmount(Path::new("./pivot"))
                .map_err(|e| HarnessError::Logical(format!("umount(pivot) failed: {}", e)))?;
        }
        Err(e) => {
            log::debug!("pivot_root failed, falling back to chdir: {}", e);
            chdir_mandatory(scaffold)?;
        }
    }

    chroot("./newroot")
        .map_err(|e| HarnessError::Logical(format!("chroot failed: {}", e)))?;
    chdir_mandatory(Path::new("/"))?;

    log::debug!("Private root ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_unmount_of_missing_path_fails() {
        assert!(detach_unmount(Path::new("/nonexistent/fuzzbox-mount")).is_err());
    }

    #[test]
    fn build_private_root_fails_cleanly_on_missing_parent() {
        let result = build_private_root(Path::new("/nonexistent/fuzzbox-scaffold"));
        assert!(matches!(result, Err(HarnessError::Logical(_))));
    }
}
