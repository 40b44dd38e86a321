use std::path::PathBuf;

use keeper_ctrl::CtrlError;
use keeper_proc::ProcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeeperError {
	#[error("invalid app {name:?}: {reason}")]
	InvalidApp { name: String, reason: String },

	#[error("app {app} is already registered in executor {executor}")]
	DuplicateApp { executor: String, app: String },

	#[error("app {app} not found in executor {executor}")]
	NotFound { executor: String, app: String },

	#[error("app {0} is already running")]
	AlreadyRunning(String),

	#[error("app {app} failed to exit: {message}")]
	AppExit { app: String, message: String },

	#[error("child process started without an executor name")]
	MissingExecutor,

	#[error("keeper is already running (pid {pid})")]
	AlreadyRunningKeeper { pid: i32 },

	#[error("executor {0} not found")]
	ExecutorNotFound(String),

	#[error("cannot {0} in single process mode")]
	SingleProcMode(&'static str),

	#[error("cannot {0} outside the master process")]
	NotMaster(&'static str),

	#[error("start function failed: {0}")]
	StartFn(String),

	#[error("forwarding to executor {executor} failed: {message}")]
	Forward { executor: String, message: String },

	#[error("installing signal handlers: {0}")]
	Signal(#[source] std::io::Error),

	#[error("config error: {0}")]
	Config(String),

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Ctrl(#[from] CtrlError),

	#[error(transparent)]
	Proc(#[from] ProcError),
}
