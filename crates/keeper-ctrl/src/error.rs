use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtrlError {
	#[error("control channel not initialized")]
	NotInitialized,

	#[error("control channel already initialized as server")]
	AlreadyServer,

	#[error("control channel already initialized as client")]
	AlreadyClient,

	#[error("child process has no executor name; socket identity would be ambiguous")]
	MissingExecutor,

	#[error("keeper is not running (no socket at {socket})")]
	NotRunning { socket: PathBuf },

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("remote error ({status}): {body}")]
	Remote { status: u16, body: String },

	#[error("unknown command: {0}")]
	UnknownCommand(String),

	#[error("command {0} is already registered")]
	DuplicateCommand(String),

	#[error("{0}")]
	Usage(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CtrlError {
	CtrlError::Io {
		path: path.into(),
		source,
	}
}
