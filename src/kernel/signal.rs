//! Guarded memory access.
//!
//! Workloads dereference addresses picked by an adversarial input generator.
//! [`guard`] runs a block with SIGSEGV/SIGBUS interception armed for the
//! calling thread: a fault inside the block abandons the rest of it and
//! resumes right after the guard with `None`.
//!
//! Resumption uses `sigsetjmp`/`siglongjmp`, so frames abandoned by a fault
//! are never unwound. Anything owned inside a guarded block leaks when the
//! block faults; that is memory-safe, but locks or guards taken inside the
//! block stay held. Keep guarded blocks to plain loads, stores and syscalls.
use crate::config::types::{HarnessError, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::cell::Cell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Opaque storage for a `sigjmp_buf`. Sized and aligned for the largest
/// libc layout we target (glibc aarch64 needs 312 bytes).
#[repr(C, align(16))]
struct SigJmpBuf([u64; 64]);

impl SigJmpBuf {
    const fn new() -> Self {
        Self([0; 64])
    }
}

extern "C" {
    // glibc only exports the sigsetjmp macro's backing symbol.
    #[cfg_attr(target_env = "gnu", link_name = "__sigsetjmp")]
    fn sigsetjmp(env: *mut SigJmpBuf, savemask: libc::c_int) -> libc::c_int;
    fn siglongjmp(env: *mut SigJmpBuf, val: libc::c_int) -> !;
}

struct GuardState {
    /// Number of active guards on this thread.
    depth: AtomicUsize,
    /// Resumption point of the innermost active guard.
    resume: Cell<*mut SigJmpBuf>,
}

thread_local! {
    // Const-initialised and drop-free, so the handler can touch it without
    // triggering lazy TLS registration.
    static GUARD: GuardState = const {
        GuardState {
            depth: AtomicUsize::new(0),
            resume: Cell::new(std::ptr::null_mut()),
        }
    };
}

extern "C" fn fault_handler(sig: libc::c_int, _info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    let target = GUARD.with(|g| {
        if g.depth.load(Ordering::SeqCst) > 0 {
            g.resume.get()
        } else {
            std::ptr::null_mut()
        }
    });

    if !target.is_null() {
        // SAFETY: target points at the SigJmpBuf of a guard frame that is
        // still live on this thread's stack (it is cleared before that
        // frame returns).
        unsafe { siglongjmp(target, 1) };
    }

    // Unguarded fault: a harness defect. Die with the signal number.
    // SAFETY: _exit is async-signal-safe.
    unsafe { libc::_exit(sig) }
}

/// Install the process-wide SIGSEGV/SIGBUS handler.
/// Call once at startup, before any workload runs. Idempotent.
pub fn install_fault_handler() -> Result<()> {
    // SA_NODEFER: we leave the handler by longjmp with savemask=0, so the
    // signal must not stay blocked afterwards.
    let action = SigAction::new(
        SigHandler::SigAction(fault_handler),
        SaFlags::SA_NODEFER | SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );

    for sig in [Signal::SIGSEGV, Signal::SIGBUS] {
        // SAFETY: the handler only touches const-initialised TLS and calls
        // async-signal-safe functions.
        unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
            HarnessError::Logical(format!("Failed to install {} handler: {}", sig, e))
        })?;
    }

    log::debug!("Fault handler installed (SIGSEGV, SIGBUS)");
    Ok(())
}

/// Ignore the two realtime signals glibc reserves for thread cancellation
/// and setxid broadcast. SIGCANCEL sent to the main thread would make it exit
/// without bringing down the whole group.
pub fn ignore_libc_internal_signals() {
    // Kernel layout of struct sigaction; libc's struct differs, and libc
    // refuses to touch these signal numbers itself.
    #[repr(C)]
    struct KernelSigaction {
        handler: usize,
        flags: libc::c_ulong,
        restorer: usize,
        mask: u64,
    }

    let action = KernelSigaction {
        handler: libc::SIG_IGN,
        flags: 0,
        restorer: 0,
        mask: 0,
    };

    for sig in [0x20, 0x21] {
        // SAFETY: valid kernel_sigaction pointer, sigsetsize 8 matches mask.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_rt_sigaction,
                sig as libc::c_long,
                &action as *const KernelSigaction,
                std::ptr::null_mut::<KernelSigaction>(),
                8 as libc::c_long,
            )
        };
        if rc != 0 {
            log::debug!(
                "rt_sigaction({}) failed: {}",
                sig,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Current guard nesting depth on the calling thread.
pub fn guard_depth() -> usize {
    GUARD.with(|g| g.depth.load(Ordering::SeqCst))
}

/// Run `block` with memory faults intercepted on this thread.
///
/// Returns `Some` with the block's value if it completed, `None` if it hit
/// SIGSEGV/SIGBUS. Guards nest: an inner guard restores the outer guard's
/// resumption point and depth when it exits, whichever way it exits.
///
/// A block that calls `std::process::exit` (e.g. via
/// [`crate::core::status::terminate`]) still exits; guards only intercept
/// faults. Requires [`install_fault_handler`] to have run.
#[inline(never)]
pub fn guard<F, R>(block: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    let mut env = SigJmpBuf::new();
    let env_ptr: *mut SigJmpBuf = &mut env;
    // MaybeUninit so the value read back out is dropped exactly once.
    let mut out = MaybeUninit::new(None::<R>);
    let out_ptr: *mut Option<R> = out.as_mut_ptr();

    let armed = ArmedGuard::arm(env_ptr);

    // SAFETY: env lives until this function returns, and the handler only
    // jumps to it while it is registered as the innermost resumption point.
    // Locals read after a jump (armed, out_ptr) are not modified after
    // sigsetjmp returns, and `out` is only accessed through volatile ops.
    if unsafe { sigsetjmp(env_ptr, 0) } == 0 {
        let value = block();
        unsafe { std::ptr::write_volatile(out_ptr, Some(value)) };
    }

    drop(armed);

    // SAFETY: out_ptr points at `out`, still live.
    unsafe { std::ptr::read_volatile(out_ptr) }
}

/// Registration of one guard frame. Dropping it, on return or while a
/// panic unwinds through [`guard`], puts back the previous resumption point
/// and depth.
struct ArmedGuard {
    prev: *mut SigJmpBuf,
}

impl ArmedGuard {
    fn arm(env: *mut SigJmpBuf) -> Self {
        let prev = GUARD.with(|g| g.resume.replace(env));
        GUARD.with(|g| g.depth.fetch_add(1, Ordering::SeqCst));
        Self { prev }
    }
}

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        GUARD.with(|g| {
            g.depth.fetch_sub(1, Ordering::SeqCst);
            g.resume.set(self.prev);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unmapped() -> *const u8 {
        // First page is never mapped on Linux (vm.mmap_min_addr).
        0x10 as *const u8
    }

    #[test]
    fn guard_passes_through_value() {
        install_fault_handler().unwrap();
        assert_eq!(guard(|| 41 + 1), Some(42));
        assert_eq!(guard_depth(), 0);
    }

    #[test]
    fn guard_survives_unmapped_read() {
        install_fault_handler().unwrap();
        let before = guard_depth();
        let mut reached_after = 0;

        let result = guard(|| unsafe { std::ptr::read_volatile(unmapped()) });
        reached_after += 1;

        assert!(result.is_none());
        assert_eq!(reached_after, 1);
        assert_eq!(guard_depth(), before);
    }

    #[test]
    fn repeated_faults_do_not_leak_depth() {
        install_fault_handler().unwrap();
        for _ in 0..100 {
            let r = guard(|| unsafe { std::ptr::read_volatile(unmapped()) });
            assert!(r.is_none());
        }
        assert_eq!(guard_depth(), 0);
    }

    #[test]
    fn inner_fault_keeps_outer_guard_armed() {
        install_fault_handler().unwrap();

        let outer = guard(|| {
            let inner = guard(|| unsafe { std::ptr::read_volatile(unmapped()) });
            assert!(inner.is_none());
            assert_eq!(guard_depth(), 1);

            // Outer guard must still catch this one.
            let second = guard(|| 7u8);
            assert_eq!(second, Some(7));
            unsafe { std::ptr::read_volatile(unmapped()) }
        });

        assert!(outer.is_none());
        assert_eq!(guard_depth(), 0);
    }

    #[test]
    fn panic_inside_guard_disarms_it() {
        install_fault_handler().unwrap();
        let before = guard_depth();

        let result = std::panic::catch_unwind(|| guard(|| -> u8 { panic!("boom") }));

        assert!(result.is_err());
        assert_eq!(guard_depth(), before);
    }

    #[test]
    fn fault_after_panicked_guard_exits_with_signal_number() {
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::{fork, ForkResult};

        install_fault_handler().unwrap();
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let _ = std::panic::catch_unwind(|| guard(|| -> u8 { panic!("boom") }));
                // No guard is armed any more: this must end the process.
                unsafe { std::ptr::read_volatile(unmapped()) };
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => {
                assert_eq!(
                    waitpid(child, None).unwrap(),
                    WaitStatus::Exited(child, libc::SIGSEGV)
                );
            }
        }
    }

    #[test]
    fn guards_are_per_thread() {
        install_fault_handler().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let faulted = guard(|| unsafe { std::ptr::read_volatile(unmapped()) });
                    let ok = guard(|| i * 2);
                    (faulted.is_none(), ok, guard_depth())
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            let (faulted, ok, depth) = h.join().unwrap();
            assert!(faulted);
            assert_eq!(ok, Some(i * 2));
            assert_eq!(depth, 0);
        }
    }
}
