use std::path::PathBuf;

use crate::error::CtrlError;

/// Overrides the platform temp directory for sockets and PID files.
pub const RUNTIME_DIR_ENV: &str = "KEEPER_RUNTIME_DIR";

#[derive(Debug, Clone)]
pub struct CtrlPaths {
	pub keeper_name: String,
}

impl CtrlPaths {
	pub fn new(keeper_name: impl Into<String>) -> Self {
		Self {
			keeper_name: keeper_name.into(),
		}
	}

	pub fn runtime_dir(&self) -> PathBuf {
		match std::env::var(RUNTIME_DIR_ENV) {
			Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
			_ => std::env::temp_dir(),
		}
	}

	/// `{keeper}.sock`
	pub fn master_socket(&self) -> PathBuf {
		self.runtime_dir().join(format!("{}.sock", self.keeper_name))
	}

	/// `{keeper}_{executor}.sock`
	pub fn executor_socket(&self, executor: &str) -> PathBuf {
		self.runtime_dir()
			.join(format!("{}_{}.sock", self.keeper_name, executor))
	}

	/// `{keeper}.pid`
	pub fn pid_path(&self) -> PathBuf {
		self.runtime_dir().join(format!("{}.pid", self.keeper_name))
	}
}

/// Who owns a control socket: the master, or the child running one executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlIdentity {
	pub keeper_name: String,
	pub is_master: bool,
	pub executor: Option<String>,
}

impl CtrlIdentity {
	pub fn master(keeper_name: impl Into<String>) -> Self {
		Self {
			keeper_name: keeper_name.into(),
			is_master: true,
			executor: None,
		}
	}

	pub fn child(keeper_name: impl Into<String>, executor: Option<String>) -> Self {
		Self {
			keeper_name: keeper_name.into(),
			is_master: false,
			executor,
		}
	}

	pub fn paths(&self) -> CtrlPaths {
		CtrlPaths::new(self.keeper_name.clone())
	}

	pub fn socket_path(&self) -> Result<PathBuf, CtrlError> {
		let paths = self.paths();
		if self.is_master {
			return Ok(paths.master_socket());
		}
		match self.executor.as_deref() {
			Some(executor) if !executor.is_empty() => Ok(paths.executor_socket(executor)),
			_ => Err(CtrlError::MissingExecutor),
		}
	}
}
