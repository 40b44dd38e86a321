use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::cli::StartArgs;
use crate::config::KeeperConfig;
use crate::error::KeeperError;

/// Set to `true` in the environment of every child the master spawns.
pub const ENV_IS_CHILD: &str = "KEEPER_IS_CHILD";
/// Set to `false` in the environment of every child the master spawns.
pub const ENV_IS_MASTER: &str = "KEEPER_IS_MASTER";
/// Fallback for `--env` when neither the flag nor the config file sets it.
pub const ENV_NAME: &str = "ENV_NAME";
/// Fallback for `--debug` when neither the flag nor the config file sets it.
pub const ENV_DEBUG: &str = "DEBUG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ProcMode {
	#[default]
	#[serde(rename = "single", alias = "SingleProc")]
	SingleProc,
	#[serde(rename = "multi", alias = "MultiProcs")]
	MultiProcs,
}

impl ProcMode {
	/// `single`/`multi`, plus the numeric `0`/`1` form.
	pub fn parse(s: &str) -> Option<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"single" | "singleproc" | "0" => Some(Self::SingleProc),
			"multi" | "multiprocs" | "1" => Some(Self::MultiProcs),
			_ => None,
		}
	}

	pub fn flag_value(self) -> &'static str {
		match self {
			Self::SingleProc => "single",
			Self::MultiProcs => "multi",
		}
	}
}

impl fmt::Display for ProcMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::SingleProc => write!(f, "SingleProc"),
			Self::MultiProcs => write!(f, "MultiProcs"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunEnv {
	Dev,
	Test,
	#[default]
	Product,
}

impl RunEnv {
	pub fn parse(s: &str) -> Option<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"dev" | "develop" => Some(Self::Dev),
			"test" => Some(Self::Test),
			"product" | "prod" => Some(Self::Product),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Dev => "dev",
			Self::Test => "test",
			Self::Product => "product",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
	Master,
	Child { executor: String },
}

/// Everything a `start` invocation decided about how this process runs.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupDescriptor {
	pub role: Role,
	pub mode: ProcMode,
	pub config_path: Option<PathBuf>,
	pub env: RunEnv,
	pub debug: bool,
	pub daemon: bool,
	pub apps: Vec<String>,
	pub pid_file: Option<PathBuf>,
}

impl Default for StartupDescriptor {
	fn default() -> Self {
		Self {
			role: Role::Master,
			mode: ProcMode::SingleProc,
			config_path: None,
			env: RunEnv::Product,
			debug: false,
			daemon: false,
			apps: Vec::new(),
			pid_file: None,
		}
	}
}

impl StartupDescriptor {
	/// Combine CLI flags, the config file and the environment, in that order of
	/// precedence. `lookup` reads environment variables.
	pub fn resolve(
		args: &StartArgs,
		config: &KeeperConfig,
		config_path: Option<PathBuf>,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, KeeperError> {
		let is_child = lookup(ENV_IS_CHILD).is_some_and(|v| truthy(&v))
			|| lookup(ENV_IS_MASTER).is_some_and(|v| !truthy(&v));

		let role = if is_child {
			match args.executor.as_deref().map(str::trim) {
				Some(executor) if !executor.is_empty() => Role::Child {
					executor: executor.to_string(),
				},
				_ => return Err(KeeperError::MissingExecutor),
			}
		} else {
			Role::Master
		};

		let env_name = args
			.env
			.clone()
			.or_else(|| config.env.clone())
			.or_else(|| lookup(ENV_NAME));
		let env = match env_name {
			Some(name) => RunEnv::parse(&name)
				.ok_or_else(|| KeeperError::Config(format!("unknown env {:?}", name)))?,
			None => RunEnv::default(),
		};

		let debug = args.debug
			|| config
				.debug
				.or_else(|| lookup(ENV_DEBUG).map(|v| truthy(&v)))
				.unwrap_or(false);

		let mode = match args.mode.as_deref() {
			Some(m) => ProcMode::parse(m).ok_or_else(|| KeeperError::Config(format!("unknown mode {:?}", m)))?,
			None => config.mode.unwrap_or_default(),
		};
		let mode = if is_child { ProcMode::MultiProcs } else { mode };

		Ok(Self {
			role,
			mode,
			config_path,
			env,
			debug,
			daemon: args.daemon || config.daemon.unwrap_or(false),
			apps: split_app_names(&args.apps),
			pid_file: args.pid.clone().or_else(|| config.pid_file.clone()),
		})
	}

	pub fn is_master(&self) -> bool {
		self.role == Role::Master
	}

	pub fn executor(&self) -> Option<&str> {
		match &self.role {
			Role::Master => None,
			Role::Child { executor } => Some(executor),
		}
	}

	/// Arguments for re-running this binary as the child for `executor`.
	pub fn child_args(&self, executor: &str, apps: &[String]) -> Vec<String> {
		let mut args = vec!["start".to_string(), format!("--env={}", self.env.as_str())];
		if let Some(path) = &self.config_path {
			args.push(format!("--config={}", path.display()));
		}
		if self.debug {
			args.push("--debug".to_string());
		}
		args.push(format!("--mode={}", ProcMode::MultiProcs.flag_value()));
		args.push(format!("--executor={}", executor));
		args.extend(apps.iter().cloned());
		args
	}

	/// Environment markers for a child process.
	pub fn child_envs() -> Vec<(String, String)> {
		vec![
			(ENV_IS_CHILD.to_string(), "true".to_string()),
			(ENV_IS_MASTER.to_string(), "false".to_string()),
		]
	}
}

fn truthy(v: &str) -> bool {
	matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// `["a,b", " c "]` → `["a", "b", "c"]`.
pub fn split_app_names(args: &[String]) -> Vec<String> {
	args.iter()
		.flat_map(|a| a.split(','))
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(String::from)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| map.get(key).cloned()
	}

	fn args(f: impl FnOnce(&mut StartArgs)) -> StartArgs {
		let mut a = StartArgs::default();
		f(&mut a);
		a
	}

	#[test]
	fn defaults_to_single_master_product() {
		let d = StartupDescriptor::resolve(&StartArgs::default(), &KeeperConfig::default(), None, env(&[])).unwrap();
		assert_eq!(d, StartupDescriptor::default());
		assert!(d.is_master());
	}

	#[test]
	fn child_markers_need_an_executor() {
		let markers = env(&[(ENV_IS_CHILD, "true"), (ENV_IS_MASTER, "false")]);
		let err = StartupDescriptor::resolve(&StartArgs::default(), &KeeperConfig::default(), None, &markers);
		assert!(matches!(err, Err(KeeperError::MissingExecutor)));

		let a = args(|a| a.executor = Some("web".into()));
		let d = StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, &markers).unwrap();
		assert_eq!(d.role, Role::Child { executor: "web".into() });
		assert_eq!(d.mode, ProcMode::MultiProcs);
		assert_eq!(d.executor(), Some("web"));
	}

	#[test]
	fn master_marker_alone_marks_a_child() {
		let a = args(|a| a.executor = Some("web".into()));
		let d = StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, env(&[(ENV_IS_MASTER, "false")]))
			.unwrap();
		assert!(!d.is_master());
	}

	#[test]
	fn executor_flag_without_markers_stays_master() {
		let a = args(|a| a.executor = Some("web".into()));
		let d = StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, env(&[])).unwrap();
		assert!(d.is_master());
	}

	#[test]
	fn flag_beats_config_beats_environment() {
		let config = KeeperConfig {
			env: Some("test".into()),
			mode: Some(ProcMode::MultiProcs),
			..KeeperConfig::default()
		};
		let vars = env(&[(ENV_NAME, "dev"), (ENV_DEBUG, "1")]);

		let d = StartupDescriptor::resolve(&StartArgs::default(), &config, None, &vars).unwrap();
		assert_eq!(d.env, RunEnv::Test);
		assert_eq!(d.mode, ProcMode::MultiProcs);
		assert!(d.debug);

		let a = args(|a| {
			a.env = Some("product".into());
			a.mode = Some("single".into());
		});
		let d = StartupDescriptor::resolve(&a, &config, None, &vars).unwrap();
		assert_eq!(d.env, RunEnv::Product);
		assert_eq!(d.mode, ProcMode::SingleProc);

		let d = StartupDescriptor::resolve(&StartArgs::default(), &KeeperConfig::default(), None, &vars).unwrap();
		assert_eq!(d.env, RunEnv::Dev);
	}

	#[test]
	fn config_debug_false_overrides_environment() {
		let config = KeeperConfig {
			debug: Some(false),
			..KeeperConfig::default()
		};
		let d = StartupDescriptor::resolve(&StartArgs::default(), &config, None, env(&[(ENV_DEBUG, "true")])).unwrap();
		assert!(!d.debug);
	}

	#[test]
	fn bad_env_or_mode_is_a_config_error() {
		let a = args(|a| a.env = Some("staging".into()));
		assert!(matches!(
			StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, env(&[])),
			Err(KeeperError::Config(_))
		));
		let a = args(|a| a.mode = Some("many".into()));
		assert!(matches!(
			StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, env(&[])),
			Err(KeeperError::Config(_))
		));
	}

	#[test]
	fn app_names_are_split_on_commas() {
		let a = args(|a| a.apps = vec!["a,b".into(), " c ".into(), ",".into()]);
		let d = StartupDescriptor::resolve(&a, &KeeperConfig::default(), None, env(&[])).unwrap();
		assert_eq!(d.apps, vec!["a", "b", "c"]);
	}

	#[test]
	fn child_args_follow_the_re_exec_contract() {
		let d = StartupDescriptor {
			env: RunEnv::Dev,
			debug: true,
			config_path: Some(PathBuf::from("/etc/keeper.toml")),
			..StartupDescriptor::default()
		};
		assert_eq!(
			d.child_args("web", &["a".into(), "b".into()]),
			vec![
				"start",
				"--env=dev",
				"--config=/etc/keeper.toml",
				"--debug",
				"--mode=multi",
				"--executor=web",
				"a",
				"b",
			]
		);

		let plain = StartupDescriptor::default().child_args("db", &[]);
		assert_eq!(plain, vec!["start", "--env=product", "--mode=multi", "--executor=db"]);
	}

	#[test]
	fn proc_mode_forms() {
		assert_eq!(ProcMode::parse("1"), Some(ProcMode::MultiProcs));
		assert_eq!(ProcMode::parse("Single"), Some(ProcMode::SingleProc));
		assert_eq!(ProcMode::MultiProcs.to_string(), "MultiProcs");
	}
}
