use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keeper_proc::signal::parse_signal;
use keeper_proc::{RestartPolicy, StopPolicy};
use serde::Deserialize;

use crate::startup::ProcMode;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "keeper.toml";

// ── keeper.toml ──────────────────────────────────────────────────────────────

/// File-level settings. Unset fields fall through to environment and defaults
/// when the startup descriptor is resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeeperConfig {
	pub env: Option<String>,
	pub debug: Option<bool>,
	pub daemon: Option<bool>,
	pub mode: Option<ProcMode>,
	pub pid_file: Option<PathBuf>,
	#[serde(default = "default_true")]
	pub ctrl: bool,
	#[serde(default)]
	pub logger: LoggerConfig,
	#[serde(default)]
	pub supervisor: SupervisorConfig,
	#[serde(default)]
	pub apps: BTreeMap<String, toml::Table>,
}

impl Default for KeeperConfig {
	fn default() -> Self {
		Self {
			env: None,
			debug: None,
			daemon: None,
			mode: None,
			pid_file: None,
			ctrl: true,
			logger: LoggerConfig::default(),
			supervisor: SupervisorConfig::default(),
			apps: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
	pub level: Option<String>,
	pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
	#[serde(default = "default_stop_wait_secs")]
	pub stop_wait_secs: u64,
	#[serde(default = "default_max_restarts")]
	pub max_restarts: u32,
	#[serde(default = "default_restart_delay_ms")]
	pub restart_delay_ms: u64,
	#[serde(default = "default_max_restart_delay_ms")]
	pub max_restart_delay_ms: u64,
	#[serde(default = "default_stable_after_secs")]
	pub stable_after_secs: u64,
	/// Tried in order before SIGKILL. Empty keeps SIGQUIT then SIGTERM.
	#[serde(default)]
	pub stop_signals: Vec<String>,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			stop_wait_secs: default_stop_wait_secs(),
			max_restarts: default_max_restarts(),
			restart_delay_ms: default_restart_delay_ms(),
			max_restart_delay_ms: default_max_restart_delay_ms(),
			stable_after_secs: default_stable_after_secs(),
			stop_signals: Vec::new(),
		}
	}
}

fn default_true() -> bool { true }
fn default_stop_wait_secs() -> u64 { 15 }
fn default_max_restarts() -> u32 { 5 }
fn default_restart_delay_ms() -> u64 { 1000 }
fn default_max_restart_delay_ms() -> u64 { 30_000 }
fn default_stable_after_secs() -> u64 { 60 }

impl SupervisorConfig {
	pub fn restart_policy(&self) -> RestartPolicy {
		RestartPolicy {
			enabled: true,
			max_restarts: self.max_restarts,
			delay: Duration::from_millis(self.restart_delay_ms),
			max_delay: Duration::from_millis(self.max_restart_delay_ms),
			stable_after: Duration::from_secs(self.stable_after_secs),
		}
	}

	pub fn stop_policy(&self) -> StopPolicy {
		let mut policy = StopPolicy {
			wait: Duration::from_secs(self.stop_wait_secs),
			..StopPolicy::default()
		};
		let signals: Vec<_> = self
			.stop_signals
			.iter()
			.filter_map(|name| {
				let signal = parse_signal(name);
				if signal.is_none() {
					tracing::warn!("ignoring unknown stop signal {}", name);
				}
				signal
			})
			.collect();
		if !signals.is_empty() {
			policy.signals = signals;
		}
		policy
	}
}

impl KeeperConfig {
	pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(content)
	}

	/// Load `path`, or `keeper.toml` from the working directory. A missing default file
	/// is silent; an unreadable or invalid file is reported and replaced by defaults.
	/// Returns the config together with the path it came from.
	pub fn load(path: Option<&Path>) -> (Self, Option<PathBuf>) {
		let (path, explicit) = match path {
			Some(p) => (p.to_path_buf(), true),
			None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
		};
		if !path.exists() {
			if explicit {
				eprintln!("warning: config file {} not found, using defaults", path.display());
			}
			return (Self::default(), None);
		}

		let path = path.canonicalize().unwrap_or(path);
		match std::fs::read_to_string(&path) {
			Ok(content) => match Self::parse(&content) {
				Ok(config) => return (config, Some(path)),
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
		(Self::default(), Some(path))
	}

	/// The `[apps.<name>]` table, if any.
	pub fn app_config(&self, name: &str) -> Option<&toml::Table> {
		self.apps.get(name)
	}
}
