//! PID liveness checks used by the janitor's local reap duty (spec §4.E.1).

/// Returns true if `pid` names a process that is still alive on this
/// host.
///
/// On Unix this sends signal 0, which delivers nothing but still
/// performs the existence/permission check (`kill(2)`). `EPERM`
/// (process exists but we don't own it) is treated as "alive", since
/// deleting someone else's live session because we can't see it would
/// be worse than leaving a harmless false-positive in `peers`.
///
/// Non-Unix targets have no equivalent zero-cost syscall exposed by
/// this crate's dependency set; they conservatively report every PID
/// as alive, so the remote/TTL reap duty (spec §4.E.2) remains the
/// backstop for cleaning up dead sessions on those platforms.
#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: i32) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn very_unlikely_pid_is_dead() {
        // PID 2^30-ish is outside any real PID space on Linux.
        assert!(!is_alive(999_999_999));
    }
}
