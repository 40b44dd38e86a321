use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use keeper_ctrl::{ControlChannel, CtrlIdentity, CtrlPaths};
use keeper_proc::daemon;
use keeper_proc::signal::send_signal;
use keeper_proc::{PidFile, ProcessSupervisor};
use nix::sys::signal::Signal;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::cli::StopAction;
use crate::config::KeeperConfig;
use crate::error::KeeperError;
use crate::executor::{ChildLauncher, Executor};
use crate::logging::LogSettings;
use crate::startup::{ProcMode, Role, StartupDescriptor};

pub type BeforeStopFn = Box<dyn Fn(&Keeper) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
	Unknown,
	Initialized,
	Running,
	Exiting,
}

/// Result of `stop`/`reload`/`quit` against the PID file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
	NotRunning,
	Signalled { pid: i32, signal: Signal },
	DeliveryFailed { pid: i32, signal: Signal, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
	/// Executors are up; keep serving.
	Running,
	/// A detached copy took over; this process should exit.
	Detached { pid: u32 },
}

/// `Keeper_<binary name>`.
pub fn default_name() -> String {
	let binary = std::env::current_exe()
		.ok()
		.and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
		.unwrap_or_else(|| "keeper".to_string());
	format!("Keeper_{}", binary)
}

/// Top-level orchestrator: one per process.
pub struct Keeper {
	name: String,
	startup: StartupDescriptor,
	mode: RwLock<ProcMode>,
	state: RwLock<KeeperState>,
	executors: RwLock<BTreeMap<String, Arc<Executor>>>,
	apps_to_operate: RwLock<Vec<String>>,
	pid_file: PidFile,
	config: Arc<KeeperConfig>,
	log: LogSettings,
	supervisor: Arc<ProcessSupervisor>,
	ctrl: ControlChannel,
	root: CancellationToken,
	start_time: RwLock<Option<DateTime<Local>>>,
	before_stop: Mutex<Option<BeforeStopFn>>,
	pub(crate) shutdown_requested: Notify,
}

impl Keeper {
	pub fn new(
		name: impl Into<String>,
		startup: StartupDescriptor,
		config: KeeperConfig,
	) -> Result<Arc<Self>, KeeperError> {
		let name = name.into();
		let identity = match &startup.role {
			Role::Master => CtrlIdentity::master(name.clone()),
			Role::Child { executor } if executor.is_empty() => return Err(KeeperError::MissingExecutor),
			Role::Child { executor } => CtrlIdentity::child(name.clone(), Some(executor.clone())),
		};
		let pid_file = match &startup.pid_file {
			Some(path) => PidFile::new(path.clone()),
			None => PidFile::new(CtrlPaths::new(name.clone()).pid_path()),
		};
		let log = LogSettings::resolve(startup.env, startup.debug, &config.logger);

		Ok(Arc::new(Self {
			mode: RwLock::new(startup.mode),
			state: RwLock::new(KeeperState::Initialized),
			executors: RwLock::new(BTreeMap::new()),
			apps_to_operate: RwLock::new(startup.apps.clone()),
			pid_file,
			config: Arc::new(config),
			log,
			supervisor: ProcessSupervisor::new(),
			ctrl: ControlChannel::new(identity),
			root: CancellationToken::new(),
			start_time: RwLock::new(None),
			before_stop: Mutex::new(None),
			shutdown_requested: Notify::new(),
			name,
			startup,
		}))
	}

	// --- Accessors ---

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn startup(&self) -> &StartupDescriptor {
		&self.startup
	}

	pub fn is_master(&self) -> bool {
		self.startup.is_master()
	}

	pub fn current_executor(&self) -> Option<&str> {
		self.startup.executor()
	}

	pub fn proc_mode(&self) -> ProcMode {
		*self.mode.read()
	}

	pub fn is_single_proc(&self) -> bool {
		self.proc_mode() == ProcMode::SingleProc
	}

	pub fn is_multi_proc_master(&self) -> bool {
		self.proc_mode() == ProcMode::MultiProcs && self.is_master()
	}

	/// Switch to one child process per executor. Only before the keeper runs.
	pub fn enable_multi_proc(&self) {
		if self.state() != KeeperState::Initialized {
			tracing::warn!("process mode is fixed once the keeper runs");
			return;
		}
		*self.mode.write() = ProcMode::MultiProcs;
	}

	pub fn state(&self) -> KeeperState {
		*self.state.read()
	}

	/// Moves forward only; nothing leaves `Exiting`. Returns the previous state.
	pub(crate) fn advance(&self, next: KeeperState) -> KeeperState {
		let mut state = self.state.write();
		let prev = *state;
		if prev != KeeperState::Exiting {
			*state = next;
		}
		prev
	}

	pub fn start_time(&self) -> Option<DateTime<Local>> {
		*self.start_time.read()
	}

	pub fn config(&self) -> &Arc<KeeperConfig> {
		&self.config
	}

	pub fn log_settings(&self) -> &LogSettings {
		&self.log
	}

	pub fn pid_file(&self) -> &PidFile {
		&self.pid_file
	}

	pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
		&self.supervisor
	}

	pub fn ctrl(&self) -> &ControlChannel {
		&self.ctrl
	}

	/// Cancelled when the keeper starts exiting.
	pub fn cancel_token(&self) -> &CancellationToken {
		&self.root
	}

	pub fn set_before_stop<F>(&self, f: F)
	where
		F: Fn(&Keeper) + Send + Sync + 'static,
	{
		*self.before_stop.lock() = Some(Box::new(f));
	}

	// --- Executors ---

	pub fn executor(&self, name: &str) -> Option<Arc<Executor>> {
		self.executors.read().get(name).cloned()
	}

	pub fn executors(&self) -> Vec<Arc<Executor>> {
		self.executors.read().values().cloned().collect()
	}

	/// Add `app` to the named executor, or to the one named after the keeper.
	/// The executor is created on first use.
	pub fn add_app_to_executor<A: App>(&self, app: A, executor: Option<&str>) -> Result<(), KeeperError> {
		let name = match executor {
			Some(e) if !e.is_empty() => e,
			_ => self.name.as_str(),
		};
		let executor = {
			let mut executors = self.executors.write();
			let entry = executors.entry(name.to_string()).or_insert_with(|| {
				Executor::new(name, self.root.child_token(), Arc::clone(&self.config))
			});
			Arc::clone(entry)
		};
		executor.add_app(app)
	}

	pub fn apps_to_operate(&self) -> Vec<String> {
		self.apps_to_operate.read().clone()
	}

	pub fn set_apps_to_operate(&self, names: Vec<String>) {
		*self.apps_to_operate.write() = names;
	}

	pub(crate) fn child_launcher(&self) -> Result<ChildLauncher, KeeperError> {
		Ok(ChildLauncher {
			program: daemon::current_binary()?,
			startup: self.startup.clone(),
			restart: self.config.supervisor.restart_policy(),
			stop: self.config.supervisor.stop_policy(),
			supervisor: Arc::clone(&self.supervisor),
		})
	}

	// --- Start ---

	/// Refuse to start a second master for this name.
	pub fn check_keeper_for_start(&self) -> Result<(), KeeperError> {
		if !self.is_master() {
			return Ok(());
		}
		match self.pid_file.live_pid() {
			Some(pid) if pid as u32 != std::process::id() => Err(KeeperError::AlreadyRunningKeeper { pid }),
			_ => Ok(()),
		}
	}

	/// Detach if asked to, run the start function, bring executors up and record the
	/// master PID. `args` is this process's argv without the binary name.
	pub fn run_keeper<F>(&self, start_fn: F, args: &[String]) -> Result<RunOutcome, KeeperError>
	where
		F: FnOnce(&Keeper) -> anyhow::Result<()>,
	{
		if self.is_master() {
			daemon::enter_session()?;
		}
		if self.startup.daemon && self.is_master() && !daemon::is_detached() {
			let pid = daemon::respawn_detached(args)?;
			tracing::info!("{} detached as pid {}", self.name, pid);
			return Ok(RunOutcome::Detached { pid });
		}

		*self.start_time.write() = Some(Local::now());
		start_fn(self).map_err(|e| KeeperError::StartFn(format!("{:#}", e)))?;

		self.advance(KeeperState::Running);
		self.run_executors()?;

		if self.is_master() {
			let pid = self.pid_file.write_current()?;
			tracing::info!("{} running as pid {} ({})", self.name, pid, self.proc_mode());
		}
		Ok(RunOutcome::Running)
	}

	pub fn run_executors(&self) -> Result<(), KeeperError> {
		let requested = self.apps_to_operate();
		match (self.proc_mode(), &self.startup.role) {
			(ProcMode::MultiProcs, Role::Master) => {
				let launcher = self.child_launcher()?;
				for executor in self.executors() {
					if let Err(e) = executor.new_child_proc_for_start(&launcher, &requested) {
						tracing::error!("executor {}: {}", executor.name(), e);
					}
				}
			}
			(ProcMode::MultiProcs, Role::Child { executor }) => {
				let current = self
					.executor(executor)
					.ok_or_else(|| KeeperError::ExecutorNotFound(executor.clone()))?;
				current.set_pid(std::process::id());
				current.start_all_apps(&requested);
			}
			(ProcMode::SingleProc, _) => {
				for executor in self.executors() {
					executor.start_all_apps(&requested);
				}
			}
		}
		Ok(())
	}

	// --- Stop ---

	/// Deliver the signal for `action` to the PID in `pid_file`. Never retries.
	pub fn stop_keeper(pid_file: &PidFile, action: StopAction) -> StopOutcome {
		let Some(pid) = pid_file.read() else {
			return StopOutcome::NotRunning;
		};
		let signal = action.signal();
		match send_signal(pid, signal) {
			Ok(()) => {
				tracing::info!("sent {} to pid {}", signal, pid);
				StopOutcome::Signalled { pid, signal }
			}
			Err(e) => {
				tracing::warn!("{}", e);
				StopOutcome::DeliveryFailed {
					pid,
					signal,
					error: e.to_string(),
				}
			}
		}
	}

	/// Ask a running [`Keeper::serve`] loop to shut down.
	pub fn request_shutdown(&self) {
		self.shutdown_requested.notify_one();
	}

	/// Orderly stop: before-stop hook, cancel app tokens, stop children, stop apps,
	/// remove the socket and PID file. Runs once.
	pub async fn shutdown(&self) {
		if self.advance(KeeperState::Exiting) == KeeperState::Exiting {
			return;
		}
		tracing::info!("{} shutting down", self.name);

		let hook = self.before_stop.lock().take();
		if let Some(hook) = hook {
			hook(self);
		}
		self.root.cancel();

		if self.is_multi_proc_master() {
			for executor in self.executors() {
				executor.stop_child_proc(&self.supervisor).await;
			}
			self.supervisor.stop_all().await;
		}
		for executor in self.executors() {
			executor.stop_executor().await;
		}

		if let Ok(server) = self.ctrl.server() {
			let _ = std::fs::remove_file(server.socket_path());
		}
		if self.is_master() {
			self.pid_file.remove();
		}
	}

	/// Restart children (multi-process master) or stop and restart apps.
	pub async fn reload(&self) {
		if self.state() == KeeperState::Exiting {
			return;
		}
		tracing::info!("{} reloading", self.name);

		if self.is_multi_proc_master() {
			for executor in self.executors() {
				if executor.process().is_none() {
					continue;
				}
				if let Err(e) = executor.restart_child_proc(&self.supervisor).await {
					tracing::error!("executor {}: restart failed: {}", executor.name(), e);
				}
			}
			return;
		}

		let requested = self.apps_to_operate();
		for executor in self.executors() {
			executor.stop_executor().await;
			executor.start_all_apps(&requested);
		}
	}
}

impl std::fmt::Debug for Keeper {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Keeper")
			.field("name", &self.name)
			.field("role", &self.startup.role)
			.field("mode", &self.proc_mode())
			.field("state", &self.state())
			.field("executors", &self.executors.read().keys().collect::<Vec<_>>())
			.finish()
	}
}
