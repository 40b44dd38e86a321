use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// Default grace period after each stop signal.
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProcessState {
	Running { pid: u32, restarts: u32 },
	Stopping { pid: u32 },
	Stopped,
	Crashed { exit_code: i32, restarts: u32 },
	Failed { exit_code: i32 },
}

impl ProcessState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessState::Running { .. })
	}

	/// Still owned by a supervision loop: running, stopping, or waiting to restart.
	pub fn is_active(&self) -> bool {
		matches!(
			self,
			ProcessState::Running { .. } | ProcessState::Stopping { .. } | ProcessState::Crashed { .. }
		)
	}

	pub fn pid(&self) -> Option<u32> {
		match self {
			ProcessState::Running { pid, .. } | ProcessState::Stopping { pid } => Some(*pid),
			_ => None,
		}
	}
}

/// Bounded exponential restart budget for crashed children.
///
/// Attempt `n` waits `delay * 2^(n-1)`, capped at `max_delay`. At most `max_restarts`
/// consecutive attempts are made; a child that stays up for `stable_after` resets the count.
/// A clean exit (status 0) is never restarted.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
	pub enabled: bool,
	pub max_restarts: u32,
	pub delay: Duration,
	pub max_delay: Duration,
	pub stable_after: Duration,
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			max_restarts: 5,
			delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			stable_after: Duration::from_secs(60),
		}
	}
}

impl RestartPolicy {
	pub fn never() -> Self {
		Self {
			enabled: false,
			..Self::default()
		}
	}

	pub fn delay_for(&self, attempt: u32) -> Duration {
		let shift = attempt.saturating_sub(1).min(16);
		self.delay
			.checked_mul(1u32 << shift)
			.unwrap_or(self.max_delay)
			.min(self.max_delay)
	}

	pub fn allows(&self, attempt: u32) -> bool {
		self.enabled && attempt <= self.max_restarts
	}
}

/// Signals tried in order, each followed by a bounded wait; SIGKILL is the last resort.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPolicy {
	pub signals: Vec<Signal>,
	pub wait: Duration,
}

impl Default for StopPolicy {
	fn default() -> Self {
		Self {
			signals: vec![Signal::SIGQUIT, Signal::SIGTERM],
			wait: DEFAULT_STOP_WAIT,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
	pub name: String,
	pub program: PathBuf,
	pub args: Vec<String>,
	pub envs: Vec<(String, String)>,
	pub restart: RestartPolicy,
	pub stop: StopPolicy,
}

impl ProcessSpec {
	pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			program: program.into(),
			args: Vec::new(),
			envs: Vec::new(),
			restart: RestartPolicy::default(),
			stop: StopPolicy::default(),
		}
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
		self.envs.push((key.into(), val.into()));
		self
	}

	pub fn restart(mut self, policy: RestartPolicy) -> Self {
		self.restart = policy;
		self
	}

	pub fn stop(mut self, policy: StopPolicy) -> Self {
		self.stop = policy;
		self
	}
}
