use std::path::PathBuf;

use nix::sys::signal::Signal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcError {
	#[error("failed to spawn {name}: {source}")]
	Spawn {
		name: String,
		#[source]
		source: std::io::Error,
	},

	#[error("process {0} is already running")]
	AlreadyRunning(String),

	#[error("no process named {0}")]
	NotFound(String),

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to send {signal} to pid {pid}: {source}")]
	Signal {
		pid: i32,
		signal: Signal,
		#[source]
		source: nix::errno::Errno,
	},

	#[error("invalid pid {0}")]
	InvalidPid(i32),

	#[error("cannot start a new session: {0}")]
	Session(#[source] nix::errno::Errno),

	#[error("cannot locate current executable: {0}")]
	CurrentExe(#[source] std::io::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProcError {
	ProcError::Io {
		path: path.into(),
		source,
	}
}
