use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::config::KeeperConfig;
use crate::executor::Executor;

/// A unit of work run by an [`Executor`].
///
/// `execute` brings the app up: returning `Ok` means it started. Long-running work
/// should be spawned by the app itself and stop when [`AppContext::cancelled`]
/// resolves or `exit` is called.
#[async_trait]
pub trait App: Send + Sync + 'static {
	fn name(&self) -> String;

	/// Called once when the app is added to an executor.
	fn init(&mut self, ctx: AppContext) -> anyhow::Result<()> {
		let _ = ctx;
		Ok(())
	}

	async fn execute(&self) -> anyhow::Result<()>;

	async fn exit(&self) -> anyhow::Result<()>;
}

/// What an app gets from its executor at registration.
#[derive(Clone)]
pub struct AppContext {
	executor: Weak<Executor>,
	executor_name: String,
	cancel: CancellationToken,
	config: Arc<KeeperConfig>,
}

impl AppContext {
	pub(crate) fn new(
		executor: Weak<Executor>,
		executor_name: String,
		cancel: CancellationToken,
		config: Arc<KeeperConfig>,
	) -> Self {
		Self {
			executor,
			executor_name,
			cancel,
			config,
		}
	}

	pub fn executor(&self) -> Option<Arc<Executor>> {
		self.executor.upgrade()
	}

	pub fn executor_name(&self) -> &str {
		&self.executor_name
	}

	/// Cancelled when the keeper shuts down.
	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
		self.cancel.cancelled()
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn config(&self) -> &KeeperConfig {
		&self.config
	}

	/// `[apps.<name>]` from the config file.
	pub fn app_config(&self, name: &str) -> Option<&toml::Table> {
		self.config.app_config(name)
	}
}

impl std::fmt::Debug for AppContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppContext")
			.field("executor", &self.executor_name)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

/// Names travel as CLI arguments and are comma-split there.
pub(crate) fn validate_name(name: &str) -> Result<(), String> {
	if name.is_empty() {
		return Err("name is empty".to_string());
	}
	if name.chars().any(|c| c.is_whitespace() || c == ',') {
		return Err("name must not contain whitespace or commas".to_string());
	}
	Ok(())
}
