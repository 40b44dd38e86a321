use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ProcError};
use crate::signal::pid_alive;

/// Plain-text record of the master's PID.
#[derive(Debug, Clone)]
pub struct PidFile {
	path: PathBuf,
}

impl PidFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `{dir}/{name}.pid`
	pub fn for_name(dir: &Path, name: &str) -> Self {
		Self::new(dir.join(format!("{}.pid", name)))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The recorded PID, or `None` if the file is missing, empty, garbage or zero.
	pub fn read(&self) -> Option<i32> {
		std::fs::read_to_string(&self.path)
			.ok()
			.and_then(|s| s.trim().parse::<i32>().ok())
			.filter(|pid| *pid > 0)
	}

	/// The recorded PID if that process is still alive.
	pub fn live_pid(&self) -> Option<i32> {
		self.read().filter(|pid| pid_alive(*pid))
	}

	/// Truncate and rewrite the file with the current process id.
	pub fn write_current(&self) -> Result<u32, ProcError> {
		let pid = std::process::id();
		if let Some(dir) = self.path.parent() {
			if !dir.as_os_str().is_empty() {
				std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
			}
		}
		let mut file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(true)
			.mode(0o600)
			.open(&self.path)
			.map_err(|e| io_err(&self.path, e))?;
		write!(file, "{}", pid).map_err(|e| io_err(&self.path, e))?;
		tracing::info!("wrote pid {} to {}", pid, self.path.display());
		Ok(pid)
	}

	pub fn remove(&self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_name(dir.path(), "absent");
		assert_eq!(pid_file.read(), None);
		assert_eq!(pid_file.live_pid(), None);
	}

	#[test]
	fn read_trims_whitespace() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_name(dir.path(), "k");
		std::fs::write(pid_file.path(), "12345\n").unwrap();
		assert_eq!(pid_file.read(), Some(12345));
	}

	#[test]
	fn read_rejects_garbage_and_zero() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_name(dir.path(), "k");
		std::fs::write(pid_file.path(), "not-a-pid").unwrap();
		assert_eq!(pid_file.read(), None);
		std::fs::write(pid_file.path(), "0").unwrap();
		assert_eq!(pid_file.read(), None);
	}

	#[test]
	fn write_current_truncates_previous_content() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_name(dir.path(), "k");
		std::fs::write(pid_file.path(), "99999999999999").unwrap();

		let pid = pid_file.write_current().unwrap();
		assert_eq!(pid, std::process::id());
		assert_eq!(
			std::fs::read_to_string(pid_file.path()).unwrap(),
			std::process::id().to_string()
		);
		assert_eq!(pid_file.live_pid(), Some(std::process::id() as i32));
	}

	#[test]
	fn remove_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = PidFile::for_name(dir.path(), "k");
		pid_file.write_current().unwrap();
		pid_file.remove();
		pid_file.remove();
		assert!(!pid_file.path().exists());
	}
}
