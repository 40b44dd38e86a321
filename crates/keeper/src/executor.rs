use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use chrono::Local;
use keeper_proc::{ProcessHandle, ProcessSpec, ProcessSupervisor, RestartPolicy, StopPolicy};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::app::{validate_name, App, AppContext};
use crate::config::KeeperConfig;
use crate::container::{AppContainer, AppState};
use crate::error::KeeperError;
use crate::startup::StartupDescriptor;

/// How the master re-runs itself for one executor.
#[derive(Clone)]
pub struct ChildLauncher {
	pub program: PathBuf,
	pub startup: StartupDescriptor,
	pub restart: RestartPolicy,
	pub stop: StopPolicy,
	pub supervisor: Arc<ProcessSupervisor>,
}

impl ChildLauncher {
	pub fn spec(&self, executor: &str, apps: &[String]) -> ProcessSpec {
		let mut spec = ProcessSpec::new(executor, self.program.clone())
			.args(self.startup.child_args(executor, apps))
			.restart(self.restart.clone())
			.stop(self.stop.clone());
		for (key, val) in StartupDescriptor::child_envs() {
			spec = spec.env(key, val);
		}
		spec
	}
}

/// A named group of apps, run in this process or in one child process.
pub struct Executor {
	name: String,
	me: Weak<Executor>,
	apps: RwLock<BTreeMap<String, AppContainer>>,
	running: RwLock<BTreeSet<String>>,
	process: Mutex<Option<ProcessHandle>>,
	pid: AtomicU32,
	cancel: CancellationToken,
	config: Arc<KeeperConfig>,
}

impl Executor {
	/// `cancel` is the parent of every app's token.
	pub fn new(name: impl Into<String>, cancel: CancellationToken, config: Arc<KeeperConfig>) -> Arc<Self> {
		let name = name.into();
		Arc::new_cyclic(|me| Self {
			name,
			me: me.clone(),
			apps: RwLock::new(BTreeMap::new()),
			running: RwLock::new(BTreeSet::new()),
			process: Mutex::new(None),
			pid: AtomicU32::new(0),
			cancel,
			config,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	// --- App registry ---

	pub fn add_app<A: App>(&self, mut app: A) -> Result<(), KeeperError> {
		let name = app.name();
		validate_name(&name).map_err(|reason| KeeperError::InvalidApp {
			name: name.clone(),
			reason,
		})?;
		if self.contains(&name) {
			return Err(self.duplicate(&name));
		}

		let ctx = AppContext::new(
			self.me.clone(),
			self.name.clone(),
			self.cancel.child_token(),
			Arc::clone(&self.config),
		);
		app.init(ctx).map_err(|e| KeeperError::InvalidApp {
			name: name.clone(),
			reason: format!("init failed: {:#}", e),
		})?;

		let mut apps = self.apps.write();
		if apps.contains_key(&name) {
			return Err(self.duplicate(&name));
		}
		apps.insert(name.clone(), AppContainer::new(Arc::new(app)));
		tracing::debug!("executor {}: added app {}", self.name, name);
		Ok(())
	}

	fn duplicate(&self, app: &str) -> KeeperError {
		KeeperError::DuplicateApp {
			executor: self.name.clone(),
			app: app.to_string(),
		}
	}

	fn not_found(&self, app: &str) -> KeeperError {
		KeeperError::NotFound {
			executor: self.name.clone(),
			app: app.to_string(),
		}
	}

	/// Stop the app if it is running (errors are logged), then forget it.
	pub async fn remove_app(&self, name: &str) -> Result<(), KeeperError> {
		let state = self.app_state(name).ok_or_else(|| self.not_found(name))?;
		if state == AppState::Running {
			if let Err(e) = self.stop_app(name).await {
				tracing::warn!("executor {}: stopping {} before removal: {}", self.name, name, e);
			}
		}
		self.apps.write().remove(name);
		self.running.write().remove(name);
		Ok(())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.apps.read().contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.apps.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.apps.read().is_empty()
	}

	pub fn app_names(&self) -> Vec<String> {
		self.apps.read().keys().cloned().collect()
	}

	pub fn app_state(&self, name: &str) -> Option<AppState> {
		self.apps.read().get(name).map(AppContainer::state)
	}

	pub fn container(&self, name: &str) -> Option<AppContainer> {
		self.apps.read().get(name).cloned()
	}

	// --- In-process lifecycle ---

	/// Launch `execute` in its own task. A failure there is logged and resets the
	/// app to `Stopped`; it is never returned from here.
	pub fn start_app(&self, name: &str) -> Result<(), KeeperError> {
		let app = {
			let mut apps = self.apps.write();
			let container = apps.get_mut(name).ok_or_else(|| self.not_found(name))?;
			if container.is_active() {
				return Err(KeeperError::AlreadyRunning(name.to_string()));
			}
			container.state = AppState::Running;
			container.start_time = Some(Local::now());
			Arc::clone(&container.app)
		};

		tracing::info!("executor {}: starting {}", self.name, name);
		let me = self.me.clone();
		let name = name.to_string();
		tokio::spawn(async move {
			let result = app.execute().await;
			if let Some(executor) = me.upgrade() {
				executor.execute_finished(&name, result);
			}
		});
		Ok(())
	}

	fn execute_finished(&self, name: &str, result: anyhow::Result<()>) {
		let mut apps = self.apps.write();
		let Some(container) = apps.get_mut(name) else {
			return;
		};
		match result {
			Ok(()) => {
				if container.state == AppState::Running {
					self.running.write().insert(name.to_string());
				}
			}
			Err(e) => {
				if matches!(container.state, AppState::Stopping | AppState::Stopped) {
					tracing::debug!("executor {}: {} returned during stop: {:#}", self.name, name, e);
					return;
				}
				container.state = AppState::Stopped;
				container.stop_time = Some(Local::now());
				self.running.write().remove(name);
				tracing::warn!("executor {}: app {} failed: {:#}", self.name, name, e);
			}
		}
	}

	/// No-op unless the app is running. Returns the app's `exit` error, if any.
	pub async fn stop_app(&self, name: &str) -> Result<(), KeeperError> {
		let app = {
			let mut apps = self.apps.write();
			let container = apps.get_mut(name).ok_or_else(|| self.not_found(name))?;
			if container.state != AppState::Running {
				return Ok(());
			}
			container.state = AppState::Stopping;
			Arc::clone(&container.app)
		};

		tracing::info!("executor {}: stopping {}", self.name, name);
		let result = app.exit().await;

		{
			let mut apps = self.apps.write();
			if let Some(container) = apps.get_mut(name) {
				container.state = AppState::Stopped;
				container.stop_time = Some(Local::now());
			}
			self.running.write().remove(name);
		}

		result.map_err(|e| KeeperError::AppExit {
			app: name.to_string(),
			message: format!("{:#}", e),
		})
	}

	/// Start every app that is not running. A non-empty `requested` list first
	/// drops every app it does not name.
	pub fn start_all_apps(&self, requested: &[String]) {
		if !requested.is_empty() {
			let mut apps = self.apps.write();
			apps.retain(|name, _| {
				let keep = is_requested(requested, name);
				if !keep {
					tracing::debug!("executor {}: dropping {} (not requested)", self.name, name);
				}
				keep
			});
		}

		for name in self.app_names() {
			if self.app_state(&name) == Some(AppState::Running) {
				continue;
			}
			if let Err(e) = self.start_app(&name) {
				tracing::warn!("executor {}: {}", self.name, e);
			}
		}
	}

	/// Stop every running app. Errors are logged.
	pub async fn stop_executor(&self) {
		for name in self.app_names() {
			if self.app_state(&name) != Some(AppState::Running) {
				continue;
			}
			if let Err(e) = self.stop_app(&name).await {
				tracing::warn!("executor {}: {}", self.name, e);
			}
		}
	}

	/// The requested apps this executor owns, or all of its apps when nothing was requested.
	pub fn get_app_need_to_start(&self, requested: &[String]) -> Vec<String> {
		let names = self.app_names();
		if requested.is_empty() {
			return names;
		}
		names
			.into_iter()
			.filter(|name| is_requested(requested, name))
			.collect()
	}

	// --- Child process ---

	/// Spawn the child process for this executor. Returns `None` when there is
	/// nothing to run. The selected apps are marked running right away.
	pub fn new_child_proc_for_start(
		&self,
		launcher: &ChildLauncher,
		requested: &[String],
	) -> Result<Option<u32>, KeeperError> {
		if self.is_empty() {
			return Ok(None);
		}
		let apps = self.get_app_need_to_start(requested);
		if apps.is_empty() {
			return Ok(None);
		}

		let handle = launcher.supervisor.spawn(launcher.spec(&self.name, &apps))?;
		let pid = handle.pid();
		tracing::info!(
			"executor {}: child pid {} for {}",
			self.name,
			pid.unwrap_or(0),
			apps.join(",")
		);

		*self.process.lock() = Some(handle);
		self.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
		self.running.write().extend(apps);
		Ok(pid)
	}

	/// Stop the child with the supervisor's escalating policy and clear bookkeeping.
	/// Returns false when there was no child.
	pub async fn stop_child_proc(&self, supervisor: &ProcessSupervisor) -> bool {
		let handle = self.process.lock().take();
		let stopped = supervisor.stop(&self.name).await;
		if !stopped {
			if let Some(handle) = &handle {
				handle.stop().await;
			}
		}
		self.running.write().clear();
		self.pid.store(0, Ordering::SeqCst);
		stopped || handle.is_some()
	}

	/// Restart the child with the same arguments.
	pub async fn restart_child_proc(&self, supervisor: &ProcessSupervisor) -> Result<Option<u32>, KeeperError> {
		let handle = supervisor.restart(&self.name).await?;
		let pid = handle.pid();
		*self.process.lock() = Some(handle);
		self.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
		Ok(pid)
	}

	pub fn process(&self) -> Option<ProcessHandle> {
		self.process.lock().clone()
	}

	pub fn child_alive(&self) -> bool {
		self.process
			.lock()
			.as_ref()
			.map(ProcessHandle::is_alive)
			.unwrap_or(false)
	}

	/// Current child PID (follows restarts), else the recorded one, else 0.
	pub fn pid(&self) -> u32 {
		self.process
			.lock()
			.as_ref()
			.and_then(ProcessHandle::pid)
			.unwrap_or_else(|| self.pid.load(Ordering::SeqCst))
	}

	pub fn set_pid(&self, pid: u32) {
		self.pid.store(pid, Ordering::SeqCst);
	}

	// --- Running set ---

	pub fn running_names(&self) -> Vec<String> {
		self.running.read().iter().cloned().collect()
	}

	pub fn is_running(&self, name: &str) -> bool {
		self.running.read().contains(name)
	}

	pub fn mark_running<I: IntoIterator<Item = String>>(&self, names: I) {
		self.running.write().extend(names);
	}

	pub fn mark_stopped<'a, I: IntoIterator<Item = &'a String>>(&self, names: I) {
		let mut running = self.running.write();
		for name in names {
			running.remove(name);
		}
	}
}

impl std::fmt::Debug for Executor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Executor")
			.field("name", &self.name)
			.field("apps", &self.app_names())
			.field("running", &self.running_names())
			.field("pid", &self.pid())
			.finish()
	}
}

fn is_requested(requested: &[String], name: &str) -> bool {
	requested.iter().any(|r| r.eq_ignore_ascii_case(name))
}
