use std::fmt;

use chrono::{DateTime, Local, Utc};

/// Static build metadata plus where this binary lives.
#[derive(Debug, Clone)]
pub struct VersionInfo {
	pub name: String,
	pub version: &'static str,
	pub git_commit: &'static str,
	pub build_time: String,
	pub target: &'static str,
	pub authors: &'static str,
	pub install_path: String,
}

impl VersionInfo {
	pub fn current(name: &str) -> Self {
		let build_time = option_env!("KEEPER_BUILD_EPOCH")
			.and_then(|s| s.parse::<i64>().ok())
			.filter(|secs| *secs > 0)
			.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
			.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
			.unwrap_or_else(|| "unknown".to_string());

		let install_path = std::env::current_exe()
			.map(|p| p.display().to_string())
			.unwrap_or_else(|_| "unknown".to_string());

		let authors = env!("CARGO_PKG_AUTHORS");
		Self {
			name: name.to_string(),
			version: env!("CARGO_PKG_VERSION"),
			git_commit: option_env!("KEEPER_GIT_COMMIT").unwrap_or("unknown"),
			build_time,
			target: option_env!("KEEPER_TARGET").unwrap_or("unknown"),
			authors: if authors.is_empty() { "unknown" } else { authors },
			install_path,
		}
	}
}

impl fmt::Display for VersionInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{} {}", self.name, self.version)?;
		writeln!(f, "  commit:  {}", self.git_commit)?;
		writeln!(f, "  built:   {}", self.build_time)?;
		writeln!(f, "  target:  {}", self.target)?;
		writeln!(f, "  authors: {}", self.authors)?;
		write!(f, "  path:    {}", self.install_path)
	}
}
