use thiserror::Error;

pub mod agent;
pub mod config;
pub mod controller;
pub mod json;
pub mod registry;
pub mod writer;

pub use agent::Agent;
pub use config::{TraceConfig, TraceRecordMode};
pub use controller::TracingController;
pub use json::JsonStringWriter;
pub use registry::{CategoryRegistry, ENABLED_FOR_RECORDING};
pub use writer::LogWriter;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("System error: {0}")]
    Nix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Monotonic wall time in microseconds.
pub(crate) fn monotonic_micros() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as i64 * 1_000_000 + ts.tv_nsec as i64 / 1_000
}

/// CPU time of the calling thread in microseconds, or wall time when the
/// thread CPU clock is unavailable.
pub(crate) fn thread_cpu_micros() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return monotonic_micros();
    }
    ts.tv_sec as i64 * 1_000_000 + ts.tv_nsec as i64 / 1_000
}

pub(crate) fn current_thread_id() -> u32 {
    (unsafe { libc::syscall(libc::SYS_gettid) }) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_are_monotonic_and_nonzero() {
        let a = monotonic_micros();
        let b = monotonic_micros();
        assert!(a > 0);
        assert!(b >= a);
        assert!(thread_cpu_micros() >= 0);
        assert_ne!(current_thread_id(), 0);
    }
}
