use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Platform primitive for pid liveness and termination signals. The registry
/// talks to this trait only, so tests and non-POSIX platforms can substitute
/// their own implementation.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: i32) -> bool;
    fn terminate(&self, pid: i32) -> std::io::Result<()>;
    fn force_kill(&self, pid: i32) -> std::io::Result<()>;
}

/// Signal-based probe: signal 0 for liveness, SIGTERM/SIGKILL to stop.
pub struct UnixProcessProbe;

impl ProcessProbe for UnixProcessProbe {
    fn is_alive(&self, pid: i32) -> bool {
        // EPERM means the process exists but belongs to someone else.
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: i32) -> std::io::Result<()> {
        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    }

    fn force_kill(&self, pid: i32) -> std::io::Result<()> {
        kill(Pid::from_raw(pid), Signal::SIGKILL)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    }
}
