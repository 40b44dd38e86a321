use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use keeper::{App, AppContext, Keeper};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Logs a line every `interval_secs` (from `[apps.ticker]`, default 5).
#[derive(Default)]
struct Ticker {
	ctx: Option<AppContext>,
	task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl App for Ticker {
	fn name(&self) -> String {
		"ticker".into()
	}

	fn init(&mut self, ctx: AppContext) -> anyhow::Result<()> {
		self.ctx = Some(ctx);
		Ok(())
	}

	async fn execute(&self) -> anyhow::Result<()> {
		let ctx = self.ctx.clone().ok_or_else(|| anyhow::anyhow!("ticker not initialized"))?;
		let secs = ctx
			.app_config("ticker")
			.and_then(|t| t.get("interval_secs"))
			.and_then(|v| v.as_integer())
			.unwrap_or(5)
			.max(1) as u64;
		let token = ctx.cancel_token().child_token();

		*self.task.lock() = Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(secs));
			let mut n = 0u64;
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = interval.tick() => {
						n += 1;
						tracing::info!("[{}] tick {}", ctx.executor_name(), n);
					}
				}
			}
		}));
		Ok(())
	}

	async fn exit(&self) -> anyhow::Result<()> {
		let task = self.task.lock().take();
		if let Some(task) = task {
			task.abort();
		}
		Ok(())
	}
}

/// TCP echo server on `[apps.echo] addr` (default 127.0.0.1:7007).
#[derive(Default)]
struct Echo {
	ctx: Option<AppContext>,
	task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl App for Echo {
	fn name(&self) -> String {
		"echo".into()
	}

	fn init(&mut self, ctx: AppContext) -> anyhow::Result<()> {
		self.ctx = Some(ctx);
		Ok(())
	}

	async fn execute(&self) -> anyhow::Result<()> {
		let ctx = self.ctx.clone().ok_or_else(|| anyhow::anyhow!("echo not initialized"))?;
		let addr = ctx
			.app_config("echo")
			.and_then(|t| t.get("addr"))
			.and_then(|v| v.as_str())
			.unwrap_or("127.0.0.1:7007")
			.to_string();

		let listener = TcpListener::bind(&addr).await?;
		tracing::info!("echo listening on {}", addr);
		let token = ctx.cancel_token().child_token();

		*self.task.lock() = Some(tokio::spawn(async move {
			loop {
				let accepted = tokio::select! {
					_ = token.cancelled() => break,
					accepted = listener.accept() => accepted,
				};
				let Ok((mut stream, peer)) = accepted else {
					continue;
				};
				tracing::debug!("echo: connection from {}", peer);
				tokio::spawn(async move {
					let mut buf = [0u8; 4096];
					while let Ok(n) = stream.read(&mut buf).await {
						if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
							break;
						}
					}
				});
			}
		}));
		Ok(())
	}

	async fn exit(&self) -> anyhow::Result<()> {
		let task = self.task.lock().take();
		if let Some(task) = task {
			task.abort();
		}
		Ok(())
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	Keeper::setup(|k| {
		k.add_app_to_executor(Ticker::default(), Some("jobs"))?;
		k.add_app_to_executor(Echo::default(), Some("web"))?;
		Ok(())
	})
	.await
}
