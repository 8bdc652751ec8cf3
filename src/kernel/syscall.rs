//! Syscall dispatch with synthetic pseudo-calls.
//!
//! Plain syscall numbers go straight to `syscall(2)` with the first six
//! arguments. A handful of reserved numbers above the real syscall range are
//! implemented here: they open devices, pseudo-terminal peers and FUSE
//! mounts that a raw syscall sequence cannot express on its own.
//!
//! Pointer arguments are dereferenced as given. Callers executing untrusted
//! programs wrap each call in [`crate::kernel::signal::guard`].
use std::ffi::CString;

/// Base of the pseudo-call number range.
pub const PSEUDO_BASE: u64 = 1_000_000;
/// No-op; returns 0.
pub const NR_PSEUDO_TEST: u64 = PSEUDO_BASE + 1;
/// open-device(dev, id, flags)
pub const NR_OPEN_DEV: u64 = PSEUDO_BASE + 2;
/// open-pty(fd, flags)
pub const NR_OPEN_PTS: u64 = PSEUDO_BASE + 3;
/// fuse-mount(target, mode, uid, gid, maxread, flags)
pub const NR_FUSE_MOUNT: u64 = PSEUDO_BASE + 4;
/// fuseblk-mount(target, blkdev, mode, uid, gid, maxread, blksize, flags)
pub const NR_FUSEBLK_MOUNT: u64 = PSEUDO_BASE + 5;

/// open-device marker for `/dev/char/{major}:{minor}`.
pub const DEV_CHAR: u64 = 0xc;
/// open-device marker for `/dev/block/{major}:{minor}`.
pub const DEV_BLOCK: u64 = 0xb;

/// Longest device path template read from the caller, NUL included.
const MAX_TEMPLATE_LEN: usize = 1024;

/// Block node created for fuseblk mounts (loop major, high minor).
const FUSEBLK_MAJOR: u32 = 7;
const FUSEBLK_MINOR: u32 = 199;

const FAILURE: i64 = -1;

/// One call from a workload program: a number and up to nine raw words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyscallRequest {
    pub nr: u64,
    pub args: [u64; 9],
}

impl SyscallRequest {
    /// Build a request; missing trailing arguments are zero, extras beyond
    /// nine are dropped.
    pub fn new(nr: u64, args: &[u64]) -> Self {
        let mut padded = [0u64; 9];
        for (slot, value) in padded.iter_mut().zip(args) {
            *slot = *value;
        }
        Self { nr, args: padded }
    }
}

/// Execute one request. Returns the call's value, or -1 on failure with
/// errno set, as `syscall(2)` does.
pub fn execute_syscall(req: &SyscallRequest) -> i64 {
    let a = &req.args;
    match req.nr {
        NR_PSEUDO_TEST => 0,
        NR_OPEN_DEV => open_dev(a[0], a[1], a[2]),
        NR_OPEN_PTS => open_pts(a[0], a[1]),
        NR_FUSE_MOUNT => fuse_mount(a[0], a[1], a[2], a[3], a[4], a[5]),
        NR_FUSEBLK_MOUNT => fuseblk_mount(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]),
        nr => {
            // SAFETY: raw passthrough; pointer arguments are the workload's
            // responsibility and the kernel validates them.
            unsafe {
                libc::syscall(
                    nr as libc::c_long,
                    a[0], a[1], a[2], a[3], a[4], a[5],
                )
            }
        }
    }
}

/// Path opened by open-device for the char/block markers.
pub fn device_node_path(dev: u64, major: u64, minor: u64) -> String {
    let kind = if dev == DEV_CHAR { "char" } else { "block" };
    format!("/dev/{}/{}:{}", kind, major as u8, minor as u8)
}

/// Replace each `#` in `template`, left to right, with successive decimal
/// digits of `id`, least significant first. Once the digits run out the
/// remaining placeholders become `0`.
pub fn expand_device_template(template: &[u8], mut id: u64) -> Vec<u8> {
    template
        .iter()
        .map(|&b| {
            if b == b'#' {
                let digit = b'0' + (id % 10) as u8;
                id /= 10;
                digit
            } else {
                b
            }
        })
        .collect()
}

/// Mount option string shared by fuse and fuseblk mounts.
pub fn fuse_mount_options(
    fd: i32,
    uid: u64,
    gid: u64,
    mode: u64,
    maxread: u64,
    blksize: Option<u64>,
) -> String {
    let mut opts = format!(
        "fd={},user_id={},group_id={},rootmode=0{:o}",
        fd,
        uid as i64,
        gid as i64,
        (mode as u32) & !3u32
    );
    if maxread != 0 {
        opts.push_str(&format!(",max_read={}", maxread as i64));
    }
    if let Some(blksize) = blksize.filter(|b| *b != 0) {
        opts.push_str(&format!(",blksize={}", blksize as i64));
    }
    if mode & 1 != 0 {
        opts.push_str(",default_permissions");
    }
    if mode & 2 != 0 {
        opts.push_str(",allow_other");
    }
    opts
}

/// Copy a NUL-terminated string from a workload address, at most
/// `MAX_TEMPLATE_LEN - 1` bytes.
///
/// # Safety
/// `addr` is dereferenced byte by byte; run under a guard when it comes
/// from untrusted input.
unsafe fn read_c_string(addr: u64) -> Vec<u8> {
    let base = addr as *const u8;
    let mut bytes = Vec::new();
    for i in 0..MAX_TEMPLATE_LEN - 1 {
        let b = std::ptr::read_volatile(base.add(i));
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    bytes
}

fn open_bytes(path: Vec<u8>, flags: libc::c_int) -> i64 {
    let Ok(path) = CString::new(path) else {
        return FAILURE;
    };
    log::debug!("open({:?}, {:#x})", path, flags);
    // SAFETY: path is a valid C string.
    unsafe { libc::open(path.as_ptr(), flags, 0) as i64 }
}

fn open_dev(dev: u64, id: u64, flags: u64) -> i64 {
    if dev == DEV_CHAR || dev == DEV_BLOCK {
        return open_bytes(device_node_path(dev, id, flags).into_bytes(), libc::O_RDWR);
    }
    // SAFETY: caller guards untrusted pointers.
    let template = unsafe { read_c_string(dev) };
    open_bytes(expand_device_template(&template, id), flags as libc::c_int)
}

fn open_pts(fd: u64, flags: u64) -> i64 {
    let mut ptyno: libc::c_int = 0;
    // SAFETY: TIOCGPTN writes one int through the pointer.
    let rc = unsafe { libc::ioctl(fd as libc::c_int, libc::TIOCGPTN, &mut ptyno) };
    if rc != 0 {
        return FAILURE;
    }
    open_bytes(format!("/dev/pts/{}", ptyno).into_bytes(), flags as libc::c_int)
}

fn open_fuse_device() -> i64 {
    open_bytes(b"/dev/fuse".to_vec(), libc::O_RDWR)
}

fn mount_ignoring_failure(source: *const libc::c_char, target: u64, fstype: &str, flags: u64, opts: &str) {
    let (Ok(fstype_c), Ok(opts_c)) = (CString::new(fstype), CString::new(opts)) else {
        return;
    };
    // SAFETY: target is passed through to the kernel, which validates it.
    let rc = unsafe {
        libc::mount(
            source,
            target as *const libc::c_char,
            fstype_c.as_ptr(),
            flags as libc::c_ulong,
            opts_c.as_ptr() as *const libc::c_void,
        )
    };
    // The fd alone is still worth handing back.
    if rc != 0 {
        log::debug!(
            "{} mount failed (ignored): {}",
            fstype,
            std::io::Error::last_os_error()
        );
    }
}

fn fuse_mount(target: u64, mode: u64, uid: u64, gid: u64, maxread: u64, flags: u64) -> i64 {
    let fd = open_fuse_device();
    if fd == FAILURE {
        return fd;
    }
    let opts = fuse_mount_options(fd as i32, uid, gid, mode, maxread, None);
    mount_ignoring_failure(c"".as_ptr(), target, "fuse", flags, &opts);
    fd
}

#[allow(clippy::too_many_arguments)]
fn fuseblk_mount(
    target: u64,
    blkdev: u64,
    mode: u64,
    uid: u64,
    gid: u64,
    maxread: u64,
    blksize: u64,
    flags: u64,
) -> i64 {
    let fd = open_fuse_device();
    if fd == FAILURE {
        return fd;
    }

    // SAFETY: blkdev is passed through to the kernel, which validates it.
    let rc = unsafe {
        libc::mknodat(
            libc::AT_FDCWD,
            blkdev as *const libc::c_char,
            libc::S_IFBLK,
            libc::makedev(FUSEBLK_MAJOR, FUSEBLK_MINOR),
        )
    };
    if rc != 0 {
        return fd;
    }

    let opts = fuse_mount_options(fd as i32, uid, gid, mode, maxread, Some(blksize));
    mount_ignoring_failure(blkdev as *const libc::c_char, target, "fuseblk", flags, &opts);
    fd
}
