use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::ProcError;

/// Set in the environment of a re-executed, detached copy.
pub const DETACHED_ENV: &str = "KEEPER_DETACHED";

fn is_marked() -> bool {
	std::env::var(DETACHED_ENV)
		.map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
		.unwrap_or(false)
}

/// True if this process is already a detached copy (marker set, or reparented to init).
pub fn is_detached() -> bool {
	is_marked() || nix::unistd::getppid().as_raw() == 1
}

/// In a copy started by [`respawn_detached`], leave the parent's session and
/// controlling terminal. A process that already leads a session is left alone.
pub fn enter_session() -> Result<(), ProcError> {
	if !is_marked() {
		return Ok(());
	}
	let pid = nix::unistd::getpid();
	if nix::unistd::getsid(None).map_err(ProcError::Session)? == pid {
		return Ok(());
	}
	nix::unistd::setsid().map_err(ProcError::Session)?;
	tracing::debug!("pid {} now leads its own session", pid);
	Ok(())
}

/// Drop the daemon flags so the detached copy does not detach again.
pub fn detach_args(args: &[String]) -> Vec<String> {
	args.iter()
		.filter(|a| *a != "--daemon" && *a != "-D" && !a.starts_with("--daemon="))
		.cloned()
		.collect()
}

/// Re-execute the current binary with null stdio. The copy calls [`enter_session`]
/// on start.
///
/// `args` excludes argv[0]. Returns the PID of the detached copy; the caller is
/// expected to exit right after.
pub fn respawn_detached(args: &[String]) -> Result<u32, ProcError> {
	let binary = current_binary()?;
	tracing::info!("detaching {}", binary.display());

	let child = Command::new(&binary)
		.args(detach_args(args))
		.env(DETACHED_ENV, "1")
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.spawn()
		.map_err(|source| ProcError::Spawn {
			name: binary.display().to_string(),
			source,
		})?;
	Ok(child.id())
}

pub fn current_binary() -> Result<PathBuf, ProcError> {
	std::env::current_exe().map_err(ProcError::CurrentExe)
}
