use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;

use crate::config::LoggerConfig;
use crate::error::KeeperError;
use crate::startup::RunEnv;

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
	pub level: Level,
	pub path: Option<PathBuf>,
}

impl LogSettings {
	/// `debug` wins, then an explicit `[logger] level`, then the environment's level.
	pub fn resolve(env: RunEnv, debug: bool, logger: &LoggerConfig) -> Self {
		let level = if debug {
			Level::TRACE
		} else {
			logger
				.level
				.as_deref()
				.and_then(|l| l.parse().ok())
				.unwrap_or_else(|| env_level(env))
		};
		Self {
			level,
			path: logger.path.clone(),
		}
	}

	pub fn describe(&self) -> String {
		let target = self
			.path
			.as_ref()
			.map(|p| p.display().to_string())
			.unwrap_or_else(|| "stdout".to_string());
		format!("level={} output={}", self.level, target)
	}
}

pub fn env_level(env: RunEnv) -> Level {
	match env {
		RunEnv::Dev => Level::DEBUG,
		RunEnv::Test => Level::INFO,
		RunEnv::Product => Level::WARN,
	}
}

/// Install the global subscriber. A second call is ignored.
pub fn init(settings: &LogSettings) -> Result<(), KeeperError> {
	let builder = tracing_subscriber::fmt()
		.with_max_level(settings.level)
		.with_target(false);

	match &settings.path {
		Some(path) => {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.map_err(|source| KeeperError::Io {
					path: path.clone(),
					source,
				})?;
			let _ = builder
				.with_ansi(false)
				.with_writer(Mutex::new(file))
				.try_init();
		}
		None => {
			let _ = builder.try_init();
		}
	}
	Ok(())
}

/// Quiet logging for the interactive control client.
pub fn init_ctrl() {
	let _ = tracing_subscriber::fmt()
		.with_max_level(Level::ERROR)
		.with_target(false)
		.try_init();
}
