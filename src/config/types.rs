/// Error taxonomy and exit classes for fuzzbox
use thiserror::Error;

/// Process exit classes understood by whatever launched the harness.
///
/// The numeric values are a stable contract: the controlling process tells
/// "bug in harness", "finding" and "retry me" apart purely by exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitClass {
    /// Harness setup or precondition violated.
    Logical = 67,
    /// The workload produced a reportable condition.
    Target = 68,
    /// Environment flakiness; re-run the whole thing.
    Transient = 69,
}

impl ExitClass {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a raw exit code back to a class, if it is one of ours.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            67 => Some(Self::Logical),
            68 => Some(Self::Target),
            69 => Some(Self::Transient),
            _ => None,
        }
    }
}

/// Custom error types for fuzzbox
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("logical error: {0}")]
    Logical(String),

    #[error("target error: {0}")]
    Target(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarnessError {
    pub fn exit_class(&self) -> ExitClass {
        match self {
            HarnessError::Target(_) => ExitClass::Target,
            HarnessError::Transient(_) => ExitClass::Transient,
            HarnessError::Logical(_) | HarnessError::Config(_) => ExitClass::Logical,
        }
    }
}

impl From<nix::errno::Errno> for HarnessError {
    fn from(err: nix::errno::Errno) -> Self {
        HarnessError::Logical(err.to_string())
    }
}

/// Result type alias for fuzzbox operations
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitClass::Logical.code(), 67);
        assert_eq!(ExitClass::Target.code(), 68);
        assert_eq!(ExitClass::Transient.code(), 69);
    }

    #[test]
    fn from_code_only_recognises_harness_codes() {
        assert_eq!(ExitClass::from_code(68), Some(ExitClass::Target));
        assert_eq!(ExitClass::from_code(0), None);
        assert_eq!(ExitClass::from_code(11), None);
    }

    #[test]
    fn errno_maps_to_logical() {
        let err: HarnessError = nix::errno::Errno::EPERM.into();
        assert_eq!(err.exit_class(), ExitClass::Logical);
    }

    #[test]
    fn config_errors_are_harness_bugs() {
        assert_eq!(
            HarnessError::Config("bad".into()).exit_class(),
            ExitClass::Logical
        );
        assert_eq!(
            HarnessError::Transient("busy".into()).exit_class(),
            ExitClass::Transient
        );
    }
}
