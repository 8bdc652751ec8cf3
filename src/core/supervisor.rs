use crate::config::config::HarnessConfig;
use crate::config::types::{HarnessError, Result};
use crate::core::status::run_child;
use crate::core::types::{IterationOutcome, IterationRecord, IterationReport};
use crate::core::workload::Workload;
use crate::exec::preexec::{enter_new_process_group, setup_parent_death_signal};
use crate::exec::sandbox::{wait_for_exit, WorkerExit};
use crate::safety::cleanup::remove_dir_tree;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, fork, mkdir, ForkResult, Pid};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> HarnessError {
    HarnessError::Logical(format!("{prefix}: {err}"))
}

/// Kill the worker's whole process group, then the worker itself in case it
/// left the group.
fn kill_worker_group(worker: Pid) {
    if let Err(e) = kill(Pid::from_raw(-worker.as_raw()), Signal::SIGKILL) {
        log::debug!("kill(-{}) failed: {}", worker, e);
    }
    if let Err(e) = kill(worker, Signal::SIGKILL) {
        log::debug!("kill({}) failed: {}", worker, e);
    }
}

/// Classify a worker reaped after the deadline kill. Only our SIGKILL counts
/// as a timeout; a worker that exited on its own between the last poll and
/// the kill keeps its own status.
fn outcome_after_kill(exit: WorkerExit) -> IterationOutcome {
    match exit {
        WorkerExit::Signaled(sig) if sig == Signal::SIGKILL as i32 => IterationOutcome::TimedOut,
        WorkerExit::Signaled(sig) => IterationOutcome::Signaled(sig),
        WorkerExit::Exited(code) => IterationOutcome::Exited(code),
    }
}

/// Drives the fork-run-reap-reclaim loop, one iteration at a time.
///
/// Runs inside the sandboxed loop process. Iteration directories are
/// `<root>/<index>`; each is fully reclaimed before the next is created.
pub struct Supervisor<W: Workload> {
    workload: W,
    root: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    max_iterations: Option<u64>,
    next_index: u64,
}

impl<W: Workload> Supervisor<W> {
    /// `root` is usually `.`: the work root, or the private root in the
    /// namespace sandbox.
    pub fn new(config: &HarnessConfig, root: impl Into<PathBuf>, workload: W) -> Self {
        Self {
            workload,
            root: root.into(),
            timeout: config.iteration_timeout(),
            poll_interval: config.poll_interval(),
            max_iterations: config.max_iterations,
            next_index: 0,
        }
    }

    /// Index the next iteration will use.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Loop forever, or until `max_iterations` is reached.
    ///
    /// A worker crashing, timing out or reporting a target error does not
    /// stop the loop; only a harness error (directory creation, fork, an
    /// exhausted reclaim budget) does.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if let Some(max) = self.max_iterations {
                if self.next_index >= max {
                    log::info!("Completed {} iterations", max);
                    return Ok(());
                }
            }
            let report = self.run_iteration()?;
            log::debug!(
                "iteration {} finished: {:?} (unmounts={}, relists={})",
                report.index,
                report.outcome,
                report.reclaim.unmounts,
                report.reclaim.relists
            );
        }
    }

    /// One iteration: create the directory, fork a worker into it, wait with
    /// the deadline, reap, reclaim the directory.
    pub fn run_iteration(&mut self) -> Result<IterationReport> {
        let index = self.next_index;
        self.next_index += 1;

        let workdir = self.root.join(index.to_string());
        mkdir(&workdir, Mode::from_bits_truncate(0o777))
            .map_err(|e| to_process_error(&format!("failed to mkdir {}", workdir.display()), e))?;

        let worker = self.spawn_worker(&workdir)?;
        let started = Instant::now();
        let record = IterationRecord {
            index,
            workdir,
            worker,
            started,
            deadline: started + self.timeout,
        };

        let outcome = self.wait_with_deadline(&record)?;
        let reclaim = remove_dir_tree(&record.workdir)?;

        Ok(IterationReport {
            index: record.index,
            workdir: record.workdir,
            worker: record.worker,
            outcome,
            reclaim,
        })
    }

    fn spawn_worker(&self, workdir: &std::path::Path) -> Result<Pid> {
        // SAFETY: the child runs the workload and exits via run_child; it
        // never returns into the loop.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => run_child(|| {
                setup_parent_death_signal()?;
                enter_new_process_group();
                chdir(workdir).map_err(|e| {
                    to_process_error(&format!("failed to chdir {}", workdir.display()), e)
                })?;
                self.workload.test();
                Ok(())
            }),
            Err(e) => Err(to_process_error("clone failed", e)),
        }
    }

    fn wait_with_deadline(&self, record: &IterationRecord) -> Result<IterationOutcome> {
        loop {
            match waitpid(record.worker, Some(WaitPidFlag::WNOHANG | WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(IterationOutcome::Exited(code)),
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    return Ok(IterationOutcome::Signaled(sig as i32))
                }
                Ok(_) | Err(nix::errno::Errno::EINTR) => {}
                Err(e) => return Err(to_process_error("waitpid(worker)", e)),
            }

            std::thread::sleep(self.poll_interval);

            if Instant::now() > record.deadline {
                log::debug!(
                    "iteration {} exceeded {:?}, killing pid {}",
                    record.index,
                    self.timeout,
                    record.worker
                );
                kill_worker_group(record.worker);
                // Guaranteed to return: the worker has been sent SIGKILL.
                let exit = wait_for_exit(record.worker)?;
                log::debug!("worker {} reaped after kill: {:?}", record.worker, exit);
                return Ok(outcome_after_kill(exit));
            }
        }
    }
}
