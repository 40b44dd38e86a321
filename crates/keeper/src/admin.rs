use std::fmt;
use std::sync::Arc;

use keeper_ctrl::client::request_once;
use keeper_ctrl::protocol::command_path;
use keeper_ctrl::{CtrlPaths, CtrlRequest, CtrlResponse};
use serde::{Deserialize, Serialize};

use crate::error::KeeperError;
use crate::executor::Executor;
use crate::keeper::Keeper;

/// One `info` row per executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoRow {
	pub keeper: String,
	pub proc_mode: String,
	pub executor: String,
	pub pid: u32,
	pub apps: String,
	pub apps_running: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppFailure {
	pub app: String,
	pub error: String,
}

/// Reply to `starta` and `stopa`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppsReport {
	pub executor: String,
	#[serde(default)]
	pub done: Vec<String>,
	#[serde(default)]
	pub failed: Vec<AppFailure>,
}

impl AppsReport {
	fn new(executor: &str) -> Self {
		Self {
			executor: executor.to_string(),
			..Self::default()
		}
	}

	fn fail(&mut self, app: &str, error: impl fmt::Display) {
		self.failed.push(AppFailure {
			app: app.to_string(),
			error: error.to_string(),
		});
	}

	/// `verb` is "started" or "stopped".
	pub fn render(&self, verb: &str) -> String {
		let mut lines = Vec::new();
		for app in &self.done {
			lines.push(format!("{} {}/{}", verb, self.executor, app));
		}
		for f in &self.failed {
			lines.push(format!("failed {}/{}: {}", self.executor, f.app, f.error));
		}
		if lines.is_empty() {
			lines.push(format!("nothing to do in {}", self.executor));
		}
		lines.join("\n")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppsOp {
	Start,
	Stop,
}

impl AppsOp {
	fn command(self) -> &'static str {
		match self {
			Self::Start => "starta",
			Self::Stop => "stopa",
		}
	}
}

impl Keeper {
	fn lookup(&self, executor: &str) -> Result<Arc<Executor>, KeeperError> {
		self.executor(executor)
			.ok_or_else(|| KeeperError::ExecutorNotFound(executor.to_string()))
	}

	pub fn info(&self) -> Vec<InfoRow> {
		self.executors()
			.into_iter()
			.map(|e| InfoRow {
				keeper: self.name().to_string(),
				proc_mode: self.proc_mode().to_string(),
				executor: e.name().to_string(),
				pid: e.pid(),
				apps: e.app_names().join(","),
				apps_running: e.running_names().join(","),
			})
			.collect()
	}

	/// `starte`: spawn the child for `executor`, scoped to `apps` when given.
	pub fn start_executor(&self, executor: &str, apps: &[String]) -> Result<String, KeeperError> {
		if self.is_single_proc() {
			return Err(KeeperError::SingleProcMode("start executor"));
		}
		if !self.is_master() {
			return Err(KeeperError::NotMaster("start executor"));
		}
		let target = self.lookup(executor)?;
		if target.child_alive() {
			return Ok(format!("executor {} is already running (pid {})", executor, target.pid()));
		}
		match target.new_child_proc_for_start(&self.child_launcher()?, apps)? {
			Some(pid) => Ok(format!("executor {} started (pid {})", executor, pid)),
			None => Ok(format!("executor {} has no apps to start", executor)),
		}
	}

	/// `stope`: stop the child, or every app in process.
	pub async fn stop_executor_named(&self, executor: &str) -> Result<String, KeeperError> {
		let target = self.lookup(executor)?;
		if self.is_multi_proc_master() {
			return Ok(if target.stop_child_proc(self.supervisor()).await {
				format!("executor {} stopped", executor)
			} else {
				format!("executor {} was not running", executor)
			});
		}
		target.stop_executor().await;
		Ok(format!("executor {} stopped", executor))
	}

	/// `starta`
	pub async fn start_apps(&self, executor: &str, apps: &[String]) -> Result<AppsReport, KeeperError> {
		let target = self.lookup(executor)?;
		if !self.is_multi_proc_master() {
			let mut report = AppsReport::new(executor);
			for app in apps {
				match target.start_app(app) {
					Ok(()) => report.done.push(app.clone()),
					Err(e) => report.fail(app, e),
				}
			}
			return Ok(report);
		}

		if target.child_alive() {
			let report = self.forward(executor, AppsOp::Start, apps).await?;
			target.mark_running(report.done.iter().cloned());
			return Ok(report);
		}

		let mut report = AppsReport::new(executor);
		let selected = target.get_app_need_to_start(apps);
		for app in apps {
			if !selected.iter().any(|s| s.eq_ignore_ascii_case(app)) {
				report.fail(app, "not found");
			}
		}
		if selected.is_empty() {
			return Ok(report);
		}
		if target.new_child_proc_for_start(&self.child_launcher()?, &selected)?.is_some() {
			report.done = selected;
		}
		Ok(report)
	}

	/// `stopa`
	pub async fn stop_apps(&self, executor: &str, apps: &[String]) -> Result<AppsReport, KeeperError> {
		let target = self.lookup(executor)?;
		if !self.is_multi_proc_master() {
			let mut report = AppsReport::new(executor);
			for app in apps {
				match target.stop_app(app).await {
					Ok(()) => report.done.push(app.clone()),
					Err(e) => report.fail(app, e),
				}
			}
			return Ok(report);
		}

		if target.child_alive() {
			let report = self.forward(executor, AppsOp::Stop, apps).await?;
			target.mark_stopped(&report.done);
			return Ok(report);
		}

		let mut report = AppsReport::new(executor);
		for app in apps {
			report.fail(app, "executor not running");
		}
		Ok(report)
	}

	/// Send `op` to the child's socket and wait for its report.
	async fn forward(&self, executor: &str, op: AppsOp, apps: &[String]) -> Result<AppsReport, KeeperError> {
		let socket = CtrlPaths::new(self.name()).executor_socket(executor);
		let req = CtrlRequest::new(command_path(op.command()))
			.param("executor", executor)
			.args(apps.iter().cloned());
		let forward_err = |message: String| KeeperError::Forward {
			executor: executor.to_string(),
			message,
		};

		tracing::debug!("forwarding {} to {}", req.path, socket.display());
		let resp: CtrlResponse = tokio::task::spawn_blocking(move || request_once(&socket, &req))
			.await
			.map_err(|e| forward_err(e.to_string()))??;
		if !resp.is_ok() {
			return Err(forward_err(format!("{} {}", resp.status, resp.body)));
		}
		serde_json::from_str(&resp.body).map_err(|e| forward_err(format!("bad report: {}", e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::KeeperConfig;
	use crate::container::AppState;
	use crate::startup::{ProcMode, StartupDescriptor};
	use crate::testing::{wait_for, TestApp};

	fn keeper(mode: ProcMode) -> Arc<Keeper> {
		let startup = StartupDescriptor {
			mode,
			..StartupDescriptor::default()
		};
		let k = Keeper::new("K", startup, KeeperConfig::default()).unwrap();
		k.add_app_to_executor(TestApp::new("a"), None).unwrap();
		k.add_app_to_executor(TestApp::new("b"), None).unwrap();
		k
	}

	fn names(list: &[&str]) -> Vec<String> {
		list.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn info_row_serializes_in_column_order() {
		let k = keeper(ProcMode::SingleProc);
		let rows = k.info();
		assert_eq!(
			serde_json::to_string(&rows[0]).unwrap(),
			r#"{"Keeper":"K","ProcMode":"SingleProc","Executor":"K","Pid":0,"Apps":"a,b","AppsRunning":""}"#
		);
	}

	#[test]
	fn starte_is_refused_in_single_proc() {
		let k = keeper(ProcMode::SingleProc);
		assert!(matches!(
			k.start_executor("K", &[]),
			Err(KeeperError::SingleProcMode(_))
		));
	}

	#[test]
	fn starte_unknown_executor() {
		let k = keeper(ProcMode::MultiProcs);
		assert!(matches!(
			k.start_executor("ghost", &[]),
			Err(KeeperError::ExecutorNotFound(_))
		));
	}

	#[tokio::test]
	async fn single_proc_starta_and_stopa_report_per_app() {
		let k = keeper(ProcMode::SingleProc);
		let report = k.start_apps("K", &names(&["a", "zzz"])).await.unwrap();
		assert_eq!(report.done, names(&["a"]));
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].app, "zzz");

		let exec = k.executor("K").unwrap();
		wait_for(|| exec.is_running("a")).await;

		let again = k.start_apps("K", &names(&["a"])).await.unwrap();
		assert!(again.done.is_empty());
		assert!(again.failed[0].error.contains("already running"));

		let report = k.stop_apps("K", &names(&["a"])).await.unwrap();
		assert_eq!(report.done, names(&["a"]));
		assert_eq!(exec.app_state("a"), Some(AppState::Stopped));
	}

	#[tokio::test]
	async fn stope_in_single_proc_stops_every_app() {
		let k = keeper(ProcMode::SingleProc);
		let exec = k.executor("K").unwrap();
		exec.start_all_apps(&[]);
		wait_for(|| exec.running_names().len() == 2).await;

		let msg = k.stop_executor_named("K").await.unwrap();
		assert_eq!(msg, "executor K stopped");
		assert!(exec.running_names().is_empty());
	}

	#[tokio::test]
	async fn starta_with_only_unknown_apps_spawns_nothing() {
		let k = keeper(ProcMode::MultiProcs);
		let report = k.start_apps("K", &names(&["zzz"])).await.unwrap();
		assert!(report.done.is_empty());
		assert_eq!(report.failed[0].error, "not found");
		assert!(k.executor("K").unwrap().process().is_none());
	}

	#[tokio::test]
	async fn stopa_without_child_reports_not_running() {
		let k = keeper(ProcMode::MultiProcs);
		let report = k.stop_apps("K", &names(&["a"])).await.unwrap();
		assert!(report.done.is_empty());
		assert_eq!(report.failed[0].error, "executor not running");

		let msg = k.stop_executor_named("K").await.unwrap();
		assert_eq!(msg, "executor K was not running");
	}

	#[test]
	fn report_renders_lines() {
		let report = AppsReport {
			executor: "web".into(),
			done: names(&["a"]),
			failed: vec![AppFailure {
				app: "b".into(),
				error: "not found".into(),
			}],
		};
		assert_eq!(report.render("started"), "started web/a\nfailed web/b: not found");
		assert_eq!(AppsReport::new("web").render("stopped"), "nothing to do in web");
	}
}
