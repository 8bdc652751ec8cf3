//! Integration tests for kernel module
//!
//! Guarded dispatch, credential checks and the namespace sandbox's
//! capability drop. Tests needing privileges the runner lacks return early.

use fuzzbox::config::config::{HarnessConfig, SandboxKind};
use fuzzbox::config::types::HarnessError;
use fuzzbox::exec::sandbox::{spawn_sandboxed, SandboxConfiguration, WorkerExit};
use fuzzbox::kernel::capabilities::{has_capability, CapabilityNumber, CapabilitySet};
use fuzzbox::kernel::credentials::transition_to_unprivileged;
use fuzzbox::kernel::signal::{guard, guard_depth, install_fault_handler};
use fuzzbox::kernel::syscall::{execute_syscall, SyscallRequest, NR_OPEN_DEV, NR_OPEN_PTS};
use nix::unistd::mkdtemp;
use std::ffi::CString;
use std::os::fd::AsRawFd;

fn close(fd: i64) {
    if fd >= 0 {
        unsafe { libc::close(fd as libc::c_int) };
    }
}

#[test]
fn test_credential_transition_rejects_root_before_any_syscall() {
    assert!(matches!(
        transition_to_unprivileged(0, 1000),
        Err(HarnessError::Logical(_))
    ));
    assert!(matches!(
        transition_to_unprivileged(1000, 0),
        Err(HarnessError::Logical(_))
    ));
}

#[test]
fn test_open_dev_expands_template_against_real_file() {
    let dir = mkdtemp(&std::env::temp_dir().join("fuzzbox-dev.XXXXXX")).unwrap();
    std::fs::write(dir.join("node73"), b"").unwrap();

    let template = CString::new(format!("{}/node##", dir.display())).unwrap();
    let fd = execute_syscall(&SyscallRequest::new(
        NR_OPEN_DEV,
        &[template.as_ptr() as u64, 37, libc::O_RDONLY as u64],
    ));
    assert!(fd >= 0, "open-dev should open node73, got {}", fd);
    close(fd);

    let missing = execute_syscall(&SyscallRequest::new(
        NR_OPEN_DEV,
        &[template.as_ptr() as u64, 38, libc::O_RDONLY as u64],
    ));
    assert_eq!(missing, -1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_open_dev_with_unmapped_template_is_caught_by_guard() {
    install_fault_handler().unwrap();
    let result = guard(|| {
        execute_syscall(&SyscallRequest::new(
            NR_OPEN_DEV,
            &[0x8, 0, libc::O_RDONLY as u64],
        ))
    });
    assert!(result.is_none());
    assert_eq!(guard_depth(), 0);

    // The thread keeps working normally afterwards.
    assert_eq!(guard(|| 3), Some(3));
}

#[test]
fn test_open_pts_opens_peer_of_master() {
    let Ok(ptmx) = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/ptmx")
    else {
        eprintln!("skipping: /dev/ptmx unavailable");
        return;
    };
    let fd = ptmx.as_raw_fd();
    unsafe {
        if libc::grantpt(fd) != 0 || libc::unlockpt(fd) != 0 {
            eprintln!("skipping: cannot unlock pty");
            return;
        }
    }

    let peer = execute_syscall(&SyscallRequest::new(
        NR_OPEN_PTS,
        &[fd as u64, (libc::O_RDWR | libc::O_NOCTTY) as u64],
    ));
    if peer < 0 {
        eprintln!("skipping: /dev/pts not accessible");
        return;
    }
    assert_eq!(unsafe { libc::isatty(peer as libc::c_int) }, 1);
    close(peer);
}

#[test]
fn test_namespace_sandbox_drops_ptrace_capability() {
    let scratch = mkdtemp(&std::env::temp_dir().join("fuzzbox-ns.XXXXXX")).unwrap();
    let mut config = SandboxConfiguration::from_config(&HarnessConfig {
        sandbox: SandboxKind::Namespace,
        scaffold_dir: scratch.join("scaffold"),
        ..HarnessConfig::default()
    });
    config.limits.address_space_bytes = u64::MAX;

    let worker = match spawn_sandboxed(&config, || {
        let cap = CapabilityNumber::SYS_PTRACE;
        if has_capability(CapabilitySet::Effective, cap)?
            || has_capability(CapabilitySet::Permitted, cap)?
        {
            return Err(HarnessError::Target("SYS_PTRACE still held".to_string()));
        }
        if nix::unistd::getpid().as_raw() != 1 {
            return Err(HarnessError::Target("not pid 1 in new pid namespace".to_string()));
        }
        Ok(())
    }) {
        Ok(worker) => worker,
        Err(e) => {
            eprintln!("skipping: namespaces unavailable: {}", e);
            let _ = std::fs::remove_dir_all(&scratch);
            return;
        }
    };

    match worker.wait().unwrap() {
        WorkerExit::Exited(67) => eprintln!("skipping: namespace setup refused"),
        other => assert_eq!(other, WorkerExit::Exited(0)),
    }
    let _ = std::fs::remove_dir_all(&scratch);
}
