//! Scheduling-class lowering: a cache warmer should not steal CPU or I/O
//! priority from interactive workloads.

use std::io;

const MAX_NICE: i32 = 19;

/// Lower CPU niceness and, on Linux, I/O scheduling class, to the idlest
/// available. Best-effort: failures are logged and otherwise ignored,
/// since a warmer that can't demote itself should still warm the cache.
pub fn lower_priority() {
    if let Err(e) = set_nice(MAX_NICE) {
        tracing::warn!(component = "CLI", error = %e, "failed to lower CPU niceness");
    }
    if let Err(e) = set_idle_io_priority() {
        tracing::warn!(component = "CLI", error = %e, "failed to lower I/O priority");
    }
}

fn set_nice(nice: i32) -> io::Result<()> {
    // SAFETY: PRIO_PROCESS/0 targets the calling process; setpriority has
    // no preconditions beyond its arguments being in range.
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(target_os = "linux")]
fn set_idle_io_priority() -> io::Result<()> {
    const IOPRIO_WHO_PROCESS: libc::c_long = 1;
    const IOPRIO_CLASS_IDLE: libc::c_long = 3;
    const IOPRIO_CLASS_SHIFT: libc::c_long = 13;

    let ioprio = IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT;
    // SAFETY: `ioprio_set` is a plain integer syscall; failure is
    // reported via a -1 return and errno, handled below.
    let ret = unsafe { libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, 0, ioprio) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn set_idle_io_priority() -> io::Result<()> {
    Ok(())
}
