//! Credential validation logic.

use crate::config::types::{HarnessError, Result};

/// A privilege drop to uid/gid 0 is not a drop.
pub fn validate_ids(uid: u32, gid: u32) -> Result<()> {
    if uid == 0 || gid == 0 {
        return Err(HarnessError::Logical(format!(
            "Cannot transition to root UID/GID (uid={}, gid={})",
            uid, gid
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ids_rejects_root_uid() {
        assert!(validate_ids(0, 1000).is_err());
    }

    #[test]
    fn validate_ids_rejects_root_gid() {
        assert!(validate_ids(1000, 0).is_err());
    }

    #[test]
    fn validate_ids_accepts_nobody() {
        assert!(validate_ids(65534, 65534).is_ok());
    }
}
