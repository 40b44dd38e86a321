use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::app::{App, AppContext};

#[derive(Default)]
struct ProbeInner {
	executed: AtomicUsize,
	exited: AtomicUsize,
	returned: AtomicUsize,
	release: Notify,
	ctx: Mutex<Option<AppContext>>,
}

/// Observes a [`TestApp`] after it has been moved into an executor.
#[derive(Clone, Default)]
pub(crate) struct Probe(Arc<ProbeInner>);

impl Probe {
	pub fn executed(&self) -> usize {
		self.0.executed.load(Ordering::SeqCst)
	}

	pub fn exited(&self) -> usize {
		self.0.exited.load(Ordering::SeqCst)
	}

	/// Number of `execute` calls that have returned.
	pub fn returned(&self) -> usize {
		self.0.returned.load(Ordering::SeqCst)
	}

	/// Let one held `execute` return.
	pub fn release(&self) {
		self.0.release.notify_one();
	}

	pub fn executor_name(&self) -> Option<String> {
		self.0.ctx.lock().as_ref().map(|c| c.executor_name().to_string())
	}

	pub fn context(&self) -> Option<AppContext> {
		self.0.ctx.lock().clone()
	}
}

pub(crate) struct TestApp {
	name: String,
	fail_init: bool,
	fail_execute: bool,
	fail_exit: bool,
	held: bool,
	probe: Probe,
}

impl TestApp {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			fail_init: false,
			fail_execute: false,
			fail_exit: false,
			held: false,
			probe: Probe::default(),
		}
	}

	pub fn failing_init(mut self) -> Self {
		self.fail_init = true;
		self
	}

	pub fn failing_execute(mut self) -> Self {
		self.fail_execute = true;
		self
	}

	pub fn failing_exit(mut self) -> Self {
		self.fail_exit = true;
		self
	}

	/// `execute` blocks until [`Probe::release`], then fails.
	pub fn held_execute(mut self) -> Self {
		self.held = true;
		self
	}

	pub fn probe(&self) -> Probe {
		self.probe.clone()
	}
}

#[async_trait]
impl App for TestApp {
	fn name(&self) -> String {
		self.name.clone()
	}

	fn init(&mut self, ctx: AppContext) -> anyhow::Result<()> {
		if self.fail_init {
			anyhow::bail!("init refused");
		}
		*self.probe.0.ctx.lock() = Some(ctx);
		Ok(())
	}

	async fn execute(&self) -> anyhow::Result<()> {
		self.probe.0.executed.fetch_add(1, Ordering::SeqCst);
		if self.held {
			self.probe.0.release.notified().await;
			self.probe.0.returned.fetch_add(1, Ordering::SeqCst);
			anyhow::bail!("listener closed");
		}
		self.probe.0.returned.fetch_add(1, Ordering::SeqCst);
		if self.fail_execute {
			anyhow::bail!("port already in use");
		}
		Ok(())
	}

	async fn exit(&self) -> anyhow::Result<()> {
		self.probe.0.exited.fetch_add(1, Ordering::SeqCst);
		if self.fail_exit {
			anyhow::bail!("exit refused");
		}
		Ok(())
	}
}

pub(crate) async fn wait_for(cond: impl Fn() -> bool) {
	for _ in 0..200 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached within 2s");
}
