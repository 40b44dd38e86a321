//! # keeper
//!
//! Runs groups of apps ("executors") either all inside one process or one child
//! process per executor, with a PID file, signal handling and a control socket.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use keeper::{App, Keeper};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl App for Hello {
//! 	fn name(&self) -> String {
//! 		"hello".into()
//! 	}
//!
//! 	async fn execute(&self) -> anyhow::Result<()> {
//! 		Ok(())
//! 	}
//!
//! 	async fn exit(&self) -> anyhow::Result<()> {
//! 		Ok(())
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//! 	Keeper::setup(|k| {
//! 		k.add_app_to_executor(Hello, None)?;
//! 		Ok(())
//! 	})
//! 	.await
//! }
//! ```

pub mod admin;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod keeper;
pub mod logging;
pub mod runtime;
pub mod startup;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::{AppFailure, AppsReport, InfoRow};
pub use app::{App, AppContext};
pub use config::KeeperConfig;
pub use container::{AppContainer, AppState};
pub use error::KeeperError;
pub use executor::{ChildLauncher, Executor};
pub use keeper::{default_name, Keeper, KeeperState, RunOutcome, StopOutcome};
pub use startup::{ProcMode, Role, RunEnv, StartupDescriptor};
pub use version::VersionInfo;
