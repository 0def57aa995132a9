use std::io;

use libc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
    /// Signal 0: delivers nothing, only checks that the pid exists.
    Probe,
}

impl Signal {
    pub fn number(&self) -> i32 {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Probe => 0,
        }
    }
}

/// Delivers signals to processes by pid.
pub trait ProcessSignaller: Send + Sync {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

/// Signals real processes through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignaller;

impl ProcessSignaller for OsSignaller {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        let rc = unsafe { libc::kill(pid, signal.number()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

pub(crate) fn is_no_such_process(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}
