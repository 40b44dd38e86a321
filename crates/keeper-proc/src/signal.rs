use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::ProcError;

/// Probe a PID with signal 0. A process owned by another user still counts as alive.
pub fn pid_alive(pid: i32) -> bool {
	if pid <= 0 {
		return false;
	}
	match kill(Pid::from_raw(pid), None) {
		Ok(()) => true,
		Err(Errno::EPERM) => true,
		Err(_) => false,
	}
}

pub fn send_signal(pid: i32, signal: Signal) -> Result<(), ProcError> {
	if pid <= 0 {
		return Err(ProcError::InvalidPid(pid));
	}
	kill(Pid::from_raw(pid), signal).map_err(|source| ProcError::Signal {
		pid,
		signal,
		source,
	})
}

/// Parse `SIGTERM`, `TERM` or `term` into a signal.
pub fn parse_signal(name: &str) -> Option<Signal> {
	let upper = name.trim().to_ascii_uppercase();
	let full = if upper.starts_with("SIG") {
		upper
	} else {
		format!("SIG{}", upper)
	};
	full.parse().ok()
}
