use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use keeper_ctrl::{ControlChannel, CtrlError, CtrlIdentity, CtrlPaths, Shell};
use keeper_proc::PidFile;
use owo_colors::OwoColorize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::cli::{Cli, CliCommand, CtrlArgs, SignalArgs, StartArgs, StopAction};
use crate::commands;
use crate::config::KeeperConfig;
use crate::error::KeeperError;
use crate::keeper::{default_name, Keeper, RunOutcome, StopOutcome};
use crate::logging;
use crate::startup::StartupDescriptor;
use crate::version::VersionInfo;

impl Keeper {
	/// Entry point for a binary embedding a keeper named `Keeper_<binary>`.
	///
	/// `start_fn` registers apps into executors; it runs in the master and in
	/// every child.
	pub async fn setup<F>(start_fn: F) -> ExitCode
	where
		F: FnOnce(&Keeper) -> anyhow::Result<()>,
	{
		Self::setup_named(default_name(), start_fn).await
	}

	pub async fn setup_named<F>(name: impl Into<String>, start_fn: F) -> ExitCode
	where
		F: FnOnce(&Keeper) -> anyhow::Result<()>,
	{
		let name = name.into();
		let cli = Cli::parse();
		let command = cli
			.command
			.unwrap_or_else(|| CliCommand::Start(StartArgs::default()));

		match command {
			CliCommand::Start(args) => match start(name, &args, start_fn).await {
				Ok(()) => ExitCode::SUCCESS,
				Err(e) => {
					tracing::error!("{}", e);
					eprintln!("{} {}", "error:".red(), e);
					ExitCode::FAILURE
				}
			},
			CliCommand::Stop(args) => signal_keeper(&name, &args, StopAction::Stop),
			CliCommand::Reload(args) => signal_keeper(&name, &args, StopAction::Reload),
			CliCommand::Quit(args) => signal_keeper(&name, &args, StopAction::Quit),
			CliCommand::Version => {
				println!("{}", VersionInfo::current(&name));
				ExitCode::SUCCESS
			}
			CliCommand::Ctrl(args) => match run_ctrl(&name, &args) {
				Ok(()) => ExitCode::SUCCESS,
				Err(e) => {
					eprintln!("{}", e.to_string().red());
					ExitCode::FAILURE
				}
			},
		}
	}

	/// Serve the control socket (when enabled) and handle signals until asked to
	/// stop, then shut down.
	pub async fn serve(self: &Arc<Self>) -> Result<(), KeeperError> {
		let server = if self.config().ctrl {
			Some(self.start_ctrl_server()?)
		} else {
			None
		};

		let mut term = signal(SignalKind::terminate()).map_err(KeeperError::Signal)?;
		let mut quit = signal(SignalKind::quit()).map_err(KeeperError::Signal)?;
		let mut int = signal(SignalKind::interrupt()).map_err(KeeperError::Signal)?;
		let mut usr2 = signal(SignalKind::user_defined2()).map_err(KeeperError::Signal)?;

		loop {
			tokio::select! {
				_ = term.recv() => {
					tracing::info!("received SIGTERM");
					break;
				}
				_ = quit.recv() => {
					tracing::info!("received SIGQUIT");
					break;
				}
				_ = int.recv() => {
					tracing::info!("received SIGINT");
					break;
				}
				_ = usr2.recv() => {
					tracing::info!("received SIGUSR2");
					self.reload().await;
				}
				_ = self.shutdown_requested.notified() => break,
			}
		}

		self.shutdown().await;
		if let Some(task) = server {
			task.abort();
		}
		Ok(())
	}

	fn start_ctrl_server(self: &Arc<Self>) -> Result<JoinHandle<()>, KeeperError> {
		self.ctrl().init_server()?;
		let registry = Arc::new(commands::registry(Some(self))?);
		let keeper = Arc::clone(self);
		Ok(tokio::spawn(async move {
			if let Err(e) = keeper.ctrl().ctrl_server_start(registry).await {
				tracing::error!("control server: {}", e);
			}
		}))
	}
}

async fn start<F>(name: String, args: &StartArgs, start_fn: F) -> Result<(), KeeperError>
where
	F: FnOnce(&Keeper) -> anyhow::Result<()>,
{
	let (config, config_path) = KeeperConfig::load(args.config.as_deref());
	let startup = StartupDescriptor::resolve(args, &config, config_path, |key| std::env::var(key).ok())?;
	let keeper = Keeper::new(name, startup, config)?;
	logging::init(keeper.log_settings())?;
	keeper.check_keeper_for_start()?;

	let raw: Vec<String> = std::env::args().skip(1).collect();
	if let RunOutcome::Detached { .. } = keeper.run_keeper(start_fn, &raw)? {
		return Ok(());
	}
	keeper.serve().await
}

/// `--pid`, then the config's `pid_file`, then the default location.
fn pid_file_for(name: &str, args: &SignalArgs) -> PidFile {
	if let Some(path) = &args.pid {
		return PidFile::new(path.clone());
	}
	let (config, _) = KeeperConfig::load(args.config.as_deref());
	let path: PathBuf = config
		.pid_file
		.unwrap_or_else(|| CtrlPaths::new(name).pid_path());
	PidFile::new(path)
}

fn signal_keeper(name: &str, args: &SignalArgs, action: StopAction) -> ExitCode {
	logging::init_ctrl();
	let pid_file = pid_file_for(name, args);
	match Keeper::stop_keeper(&pid_file, action) {
		StopOutcome::NotRunning => println!("{} is not running", name),
		StopOutcome::Signalled { pid, signal } => println!("sent {} to {} (pid {})", signal, name, pid),
		StopOutcome::DeliveryFailed { pid, signal, error } => {
			eprintln!("{}", format!("could not send {} to pid {}: {}", signal, pid, error).red())
		}
	}
	ExitCode::SUCCESS
}

fn run_ctrl(name: &str, args: &CtrlArgs) -> Result<(), CtrlError> {
	logging::init_ctrl();
	let identity = match &args.executor {
		Some(executor) => CtrlIdentity::child(name, Some(executor.clone())),
		None => CtrlIdentity::master(name),
	};
	let channel = ControlChannel::new(identity);
	channel.init_client()?;
	let registry = commands::registry(None)?;

	if args.line.is_empty() {
		return channel.ctrl_client_start(&registry);
	}
	let out = Shell::new(&channel, &registry).dispatch_line(&args.line.join(" "))?;
	if !out.is_empty() {
		println!("{}", out);
	}
	Ok(())
}
