//! Exit/status protocol.
//!
//! Every process the harness creates ends in one of three explicit classes
//! (see [`ExitClass`]) or, for an unguarded memory fault, with the raw signal
//! number as exit status. Nothing here returns.
use crate::config::types::{ExitClass, HarnessError};
use std::io::Write;

/// Log `err` and exit the current process with its class's status.
pub fn terminate(err: &HarnessError) -> ! {
    let class = err.exit_class();
    log::error!("{} (exit {})", err, class.code());
    exit_with(class)
}

/// Report a condition the workload was built to detect. Only meaningful
/// inside a worker process.
pub fn report_target_error(msg: impl Into<String>) -> ! {
    terminate(&HarnessError::Target(msg.into()))
}

/// Exit with `class`'s status after flushing stdout.
pub fn exit_with(class: ExitClass) -> ! {
    let _ = std::io::stdout().flush();
    std::process::exit(class.code())
}

/// Run `body` as the whole life of a child process: `Ok` exits 0, `Err`
/// exits with the error's class, and a panic exits as a logical error
/// instead of unwinding into code that belongs to the parent.
pub fn run_child<F>(body: F) -> !
where
    F: FnOnce() -> crate::config::types::Result<()>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)) {
        Ok(Ok(())) => {
            let _ = std::io::stdout().flush();
            std::process::exit(0)
        }
        Ok(Err(err)) => terminate(&err),
        Err(_) => terminate(&HarnessError::Logical("child panicked".to_string())),
    }
}
