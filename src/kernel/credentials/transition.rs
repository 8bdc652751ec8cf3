//! Transition to an unprivileged identity.
//!
//! setresgid MUST be called BEFORE setresuid: once the uid is gone we no
//! longer have the right to change gids.

use super::validation::validate_ids;
use crate::config::types::{HarnessError, Result};
use nix::unistd::{setgroups, setresgid, setresuid, Gid, Uid};

/// validate -> clear groups -> setresgid -> setresuid -> verify.
/// Every step is mandatory.
pub fn transition_to_unprivileged(uid: u32, gid: u32) -> Result<()> {
    validate_ids(uid, gid)?;

    setgroups(&[]).map_err(|e| {
        HarnessError::Logical(format!("Failed to clear supplementary groups: {}", e))
    })?;

    let gid = Gid::from_raw(gid);
    setresgid(gid, gid, gid)
        .map_err(|e| HarnessError::Logical(format!("Failed to setresgid({}): {}", gid, e)))?;

    let uid = Uid::from_raw(uid);
    setresuid(uid, uid, uid)
        .map_err(|e| HarnessError::Logical(format!("Failed to setresuid({}): {}", uid, e)))?;

    verify_transition(uid, gid)?;
    log::debug!("Transitioned to UID={}, GID={}", uid, gid);
    Ok(())
}

fn verify_transition(expected_uid: Uid, expected_gid: Gid) -> Result<()> {
    use nix::unistd::{getegid, geteuid, getgid, getuid};

    if getuid() != expected_uid || geteuid() != expected_uid {
        return Err(HarnessError::Logical(format!(
            "UID verification failed: expected {}, got real={}, effective={}",
            expected_uid,
            getuid(),
            geteuid()
        )));
    }

    if getgid() != expected_gid || getegid() != expected_gid {
        return Err(HarnessError::Logical(format!(
            "GID verification failed: expected {}, got real={}, effective={}",
            expected_gid,
            getgid(),
            getegid()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_rejects_root_uid_before_any_syscall() {
        let result = transition_to_unprivileged(0, 1000);
        assert!(matches!(result, Err(HarnessError::Logical(_))));
    }

    #[test]
    fn transition_rejects_root_gid() {
        assert!(transition_to_unprivileged(1000, 0).is_err());
    }
}
