/// Namespace isolation helpers
/// Detaching shared kernel contexts and mapping identities inside a fresh
/// user namespace.
use crate::config::types::{HarnessError, Result};

use nix::sched::{unshare, CloneFlags};
use std::io::Write;
use std::path::Path;

/// Namespaces a NamespaceIsolated worker is cloned into.
pub fn isolated_clone_flags() -> CloneFlags {
    CloneFlags::CLONE_NEWUSER
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWNET
}

/// Detach from the parent's mount, IPC and IO contexts.
///
/// Each one is unshared separately: CLONE_NEWIPC and CLONE_IO return EINVAL
/// on some kernels, and one missing context must not cost us the others.
/// Failures are logged and otherwise ignored.
pub fn detach_shared_contexts() {
    for (name, flag) in [
        ("mount", CloneFlags::CLONE_NEWNS),
        ("ipc", CloneFlags::CLONE_NEWIPC),
        ("io", CloneFlags::CLONE_IO),
    ] {
        if let Err(e) = unshare(flag) {
            log::debug!("unshare({}) failed: {}", name, e);
        }
    }
}

fn write_proc_file(path: &str, contents: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().write(true).open(Path::new(path))?;
    // Kernel requires the whole map in a single write.
    let written = file.write(contents.as_bytes())?;
    if written != contents.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("short write to {}", path),
        ));
    }
    Ok(())
}

/// Map `real_uid`/`real_gid` from the parent namespace to root inside the
/// current (fresh) user namespace.
pub fn map_identity_to_root(real_uid: u32, real_gid: u32) -> Result<()> {
    // Not present on older kernels.
    if let Err(e) = write_proc_file("/proc/self/setgroups", "deny") {
        log::debug!("write of /proc/self/setgroups failed (ignored): {}", e);
    }

    write_proc_file("/proc/self/uid_map", &format!("0 {} 1\n", real_uid)).map_err(|e| {
        HarnessError::Logical(format!("write of /proc/self/uid_map failed: {}", e))
    })?;
    write_proc_file("/proc/self/gid_map", &format!("0 {} 1\n", real_gid)).map_err(|e| {
        HarnessError::Logical(format!("write of /proc/self/gid_map failed: {}", e))
    })?;

    log::debug!("Mapped uid {} / gid {} to root", real_uid, real_gid);
    Ok(())
}
