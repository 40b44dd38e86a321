use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::error::ProcError;
use crate::signal::{pid_alive, send_signal};
use crate::types::*;

/// Registry of supervised child processes, keyed by name.
pub struct ProcessSupervisor {
	procs: RwLock<HashMap<String, ProcessHandle>>,
}

/// Cheap, clonable view of one supervised child.
#[derive(Clone)]
pub struct ProcessHandle {
	inner: Arc<Shared>,
}

struct Shared {
	spec: ProcessSpec,
	state: watch::Sender<ProcessState>,
	stopping: AtomicBool,
	cancel: watch::Sender<bool>,
}

impl ProcessSupervisor {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			procs: RwLock::new(HashMap::new()),
		})
	}

	/// Spawn the first child now and keep supervising it in the background.
	///
	/// Must be called from within a tokio runtime. Fails if a live process with the
	/// same name is already registered.
	pub fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ProcError> {
		let mut procs = self.procs.write();
		if let Some(existing) = procs.get(&spec.name) {
			if existing.state().is_active() {
				return Err(ProcError::AlreadyRunning(spec.name.clone()));
			}
		}

		let child = spawn_child(&spec)?;
		let pid = child.id().unwrap_or(0);
		tracing::info!("spawned {} (pid {})", spec.name, pid);

		let (state, _) = watch::channel(ProcessState::Running { pid, restarts: 0 });
		let (cancel, cancel_rx) = watch::channel(false);
		let handle = ProcessHandle {
			inner: Arc::new(Shared {
				spec,
				state,
				stopping: AtomicBool::new(false),
				cancel,
			}),
		};

		let shared = Arc::clone(&handle.inner);
		tokio::spawn(async move {
			supervise(shared, child, cancel_rx).await;
		});

		procs.insert(handle.name().to_string(), handle.clone());
		Ok(handle)
	}

	pub fn get(&self, name: &str) -> Option<ProcessHandle> {
		self.procs.read().get(name).cloned()
	}

	pub fn status(&self) -> Vec<(String, ProcessState)> {
		let procs = self.procs.read();
		let mut result: Vec<_> = procs
			.iter()
			.map(|(name, handle)| (name.clone(), handle.state()))
			.collect();
		result.sort_by(|a, b| a.0.cmp(&b.0));
		result
	}

	/// Stop and forget the named process. Returns false if it was never registered.
	pub async fn stop(&self, name: &str) -> bool {
		let handle = self.procs.write().remove(name);
		match handle {
			Some(handle) => {
				handle.stop().await;
				true
			}
			None => false,
		}
	}

	pub async fn stop_all(&self) {
		let handles: Vec<ProcessHandle> = self.procs.write().drain().map(|(_, h)| h).collect();
		let mut tasks = Vec::new();
		for handle in handles {
			tasks.push(tokio::spawn(async move { handle.stop().await }));
		}
		for task in tasks {
			let _ = task.await;
		}
	}

	/// Stop the named process and start it again from the same spec.
	pub async fn restart(&self, name: &str) -> Result<ProcessHandle, ProcError> {
		let handle = self
			.get(name)
			.ok_or_else(|| ProcError::NotFound(name.to_string()))?;
		handle.stop().await;
		let spec = handle.spec().clone();
		self.procs.write().remove(name);
		self.spawn(spec)
	}
}

impl ProcessHandle {
	pub fn name(&self) -> &str {
		&self.inner.spec.name
	}

	pub fn spec(&self) -> &ProcessSpec {
		&self.inner.spec
	}

	pub fn state(&self) -> ProcessState {
		self.inner.state.borrow().clone()
	}

	/// PID of the current child, updated across restarts.
	pub fn pid(&self) -> Option<u32> {
		self.state().pid()
	}

	pub fn is_alive(&self) -> bool {
		let state = self.state();
		match state.pid() {
			Some(pid) if state.is_running() => pid_alive(pid as i32),
			_ => false,
		}
	}

	/// Disable restarts, run the stop policy, and wait until supervision has ended.
	pub async fn stop(&self) {
		self.inner.stopping.store(true, Ordering::SeqCst);
		let _ = self.inner.cancel.send(true);

		let mut rx = self.inner.state.subscribe();
		let _ = rx.wait_for(|state| !state.is_active()).await;
	}

	/// Wait until the supervision loop has given up or been stopped.
	pub async fn wait(&self) -> ProcessState {
		let mut rx = self.inner.state.subscribe();
		let finished = rx.wait_for(|state| !state.is_active()).await.map(|state| (*state).clone());
		finished.unwrap_or_else(|_| self.state())
	}
}

impl Shared {
	fn set_state(&self, state: ProcessState) {
		self.state.send_replace(state);
	}

	fn is_stopping(&self) -> bool {
		self.stopping.load(Ordering::SeqCst)
	}
}

async fn supervise(shared: Arc<Shared>, mut child: Child, mut cancel: watch::Receiver<bool>) {
	let name = shared.spec.name.clone();
	let policy = shared.spec.restart.clone();
	let mut restarts: u32 = 0;
	let mut attempt: u32 = 0;

	loop {
		let pid = child.id().unwrap_or(0);
		let started_at = Instant::now();
		shared.set_state(ProcessState::Running { pid, restarts });

		let exit_result = tokio::select! {
			status = child.wait() => status,
			_ = cancel.changed() => {
				shared.set_state(ProcessState::Stopping { pid });
				stop_child(&mut child, &shared.spec.stop, &name).await;
				shared.set_state(ProcessState::Stopped);
				tracing::info!("{} stopped", name);
				return;
			}
		};

		let exit = match exit_result {
			Ok(exit) => exit,
			Err(e) => {
				tracing::error!("{}: wait failed: {}", name, e);
				shared.set_state(ProcessState::Failed { exit_code: -1 });
				return;
			}
		};

		if exit.success() {
			tracing::info!("{} exited cleanly", name);
			shared.set_state(ProcessState::Stopped);
			return;
		}
		if shared.is_stopping() {
			shared.set_state(ProcessState::Stopped);
			return;
		}

		let code = exit_code(&exit);
		if started_at.elapsed() >= policy.stable_after {
			attempt = 0;
		}
		attempt += 1;

		if !policy.allows(attempt) {
			tracing::error!(
				"{} failed (exit {}), restart budget of {} exhausted",
				name,
				code,
				policy.max_restarts
			);
			shared.set_state(ProcessState::Failed { exit_code: code });
			return;
		}

		let delay = policy.delay_for(attempt);
		tracing::warn!(
			"{} crashed (exit {}), restarting in {:?} ({}/{})",
			name,
			code,
			delay,
			attempt,
			policy.max_restarts
		);
		shared.set_state(ProcessState::Crashed {
			exit_code: code,
			restarts,
		});

		tokio::select! {
			_ = tokio::time::sleep(delay) => {},
			_ = cancel.changed() => {
				shared.set_state(ProcessState::Stopped);
				return;
			}
		}

		child = match spawn_child(&shared.spec) {
			Ok(c) => c,
			Err(e) => {
				tracing::error!("{}", e);
				shared.set_state(ProcessState::Failed { exit_code: -1 });
				return;
			}
		};
		restarts += 1;
		tracing::info!("{} restarted (pid {})", name, child.id().unwrap_or(0));
	}
}

fn spawn_child(spec: &ProcessSpec) -> Result<Child, ProcError> {
	let mut cmd = Command::new(&spec.program);
	cmd.args(&spec.args)
		.stdin(Stdio::null())
		.stdout(Stdio::inherit())
		.stderr(Stdio::inherit())
		.process_group(0);

	for (key, val) in &spec.envs {
		cmd.env(key, val);
	}

	cmd.spawn().map_err(|source| ProcError::Spawn {
		name: spec.name.clone(),
		source,
	})
}

/// Walk the stop signals, waiting `policy.wait` after each; SIGKILL if none worked.
async fn stop_child(child: &mut Child, policy: &StopPolicy, name: &str) -> Option<ExitStatus> {
	let Some(pid) = child.id() else {
		return child.wait().await.ok();
	};

	for signal in &policy.signals {
		if let Err(e) = send_signal(pid as i32, *signal) {
			tracing::warn!("{}", e);
		}
		match tokio::time::timeout(policy.wait, child.wait()).await {
			Ok(status) => return status.ok(),
			Err(_) => tracing::warn!(
				"{} (pid {}) still running {:?} after {}",
				name,
				pid,
				policy.wait,
				signal
			),
		}
	}

	tracing::warn!("{} (pid {}) killed", name, pid);
	let _ = child.start_kill();
	child.wait().await.ok()
}

fn exit_code(status: &ExitStatus) -> i32 {
	use std::os::unix::process::ExitStatusExt;
	status
		.code()
		.or_else(|| status.signal().map(|s| 128 + s))
		.unwrap_or(-1)
}
