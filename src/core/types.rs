use crate::safety::cleanup::ReclaimStats;
use nix::unistd::Pid;
use std::path::PathBuf;
use std::time::Instant;

/// State of one loop iteration, from directory creation to reclamation.
#[derive(Debug)]
pub struct IterationRecord {
    /// Monotonic, never reused.
    pub index: u64,
    /// `<root>/<index>`
    pub workdir: PathBuf,
    pub worker: Pid,
    pub started: Instant,
    pub deadline: Instant,
}

/// How the iteration's worker ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Worker exited on its own with this status.
    Exited(i32),
    /// Worker died from this signal before the deadline.
    Signaled(i32),
    /// Deadline passed; the worker's group was killed.
    TimedOut,
}

impl IterationOutcome {
    pub fn is_target_error(&self) -> bool {
        matches!(
            self,
            IterationOutcome::Exited(code)
                if *code == crate::config::types::ExitClass::Target.code()
        )
    }
}

/// Summary of a finished iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterationReport {
    pub index: u64,
    pub workdir: PathBuf,
    pub worker: Pid,
    pub outcome: IterationOutcome,
    pub reclaim: ReclaimStats,
}
