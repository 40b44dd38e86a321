use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(about = "Microservice keeper", disable_version_flag = true)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
	/// Start apps (the default when no command is given)
	Start(StartArgs),
	/// Stop the running keeper (SIGTERM)
	Stop(SignalArgs),
	/// Reload apps or executors (SIGUSR2)
	Reload(SignalArgs),
	/// Quit the running keeper (SIGQUIT)
	Quit(SignalArgs),
	/// Show version info
	Version,
	/// Interactive control shell
	Ctrl(CtrlArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct StartArgs {
	/// Apps to start; comma-separated or repeated. Empty means all
	pub apps: Vec<String>,

	/// Environment: dev, test or product
	#[arg(short, long)]
	pub env: Option<String>,

	/// Config file (default: ./keeper.toml)
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// Executor a child process runs
	#[arg(short = 'x', long)]
	pub executor: Option<String>,

	/// PID file (default: <tmp>/<keeper>.pid)
	#[arg(short, long)]
	pub pid: Option<PathBuf>,

	/// Detach from the terminal
	#[arg(short = 'D', long)]
	pub daemon: bool,

	/// Log everything
	#[arg(short, long)]
	pub debug: bool,

	/// Process model: single or multi
	#[arg(short, long)]
	pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SignalArgs {
	/// Accepted for symmetry with start; the signal goes to the whole keeper
	pub apps: Vec<String>,

	/// PID file (default: <tmp>/<keeper>.pid)
	#[arg(short, long)]
	pub pid: Option<PathBuf>,

	/// Config file, read for `pid_file`
	#[arg(short, long)]
	pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct CtrlArgs {
	/// Talk to one child's socket instead of the master's
	#[arg(short = 'x', long)]
	pub executor: Option<String>,

	/// Run one command and exit instead of opening the shell
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	pub line: Vec<String>,
}

/// The external stop protocol: which signal each command sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
	Stop,
	Reload,
	Quit,
}

impl StopAction {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"stop" => Some(Self::Stop),
			"reload" => Some(Self::Reload),
			"quit" => Some(Self::Quit),
			_ => None,
		}
	}

	pub fn signal(self) -> nix::sys::signal::Signal {
		use nix::sys::signal::Signal;
		match self {
			Self::Stop => Signal::SIGTERM,
			Self::Reload => Signal::SIGUSR2,
			Self::Quit => Signal::SIGQUIT,
		}
	}
}
