use std::future::Future;
use std::sync::Arc;

use keeper_ctrl::{CmdContext, Command, CommandRegistry, CtrlError, CtrlRequest, CtrlResponse, OptSpec};

use crate::admin::AppsReport;
use crate::error::KeeperError;
use crate::keeper::Keeper;
use crate::startup::split_app_names;
use crate::version::VersionInfo;

/// Build the administrative commands. With a keeper, server-side handlers are
/// attached; without one (the `ctrl` client) only the shell side is.
pub fn registry(keeper: Option<&Arc<Keeper>>) -> Result<CommandRegistry, CtrlError> {
	let mut registry = CommandRegistry::new();
	registry.register(info(keeper))?;
	registry.register(starte(keeper))?;
	registry.register(starta(keeper))?;
	registry.register(stope(keeper))?;
	registry.register(stopa(keeper))?;
	registry.register(reload(keeper))?;
	registry.register(debug(keeper))?;
	registry.register(log(keeper))?;
	registry.register(version())?;
	Ok(registry)
}

fn executor_opt() -> OptSpec {
	OptSpec::new("executor").alias('e').required(true).help("executor name")
}

/// Attach `handler` as the remote side when serving.
fn serve_with<F, Fut>(command: Command, keeper: Option<&Arc<Keeper>>, handler: F) -> Command
where
	F: Fn(Arc<Keeper>, CtrlRequest) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = CtrlResponse> + Send + 'static,
{
	let Some(keeper) = keeper else {
		return command;
	};
	let keeper = Arc::clone(keeper);
	command.remote(move |req| handler(Arc::clone(&keeper), req))
}

fn error_response(e: KeeperError) -> CtrlResponse {
	match e {
		KeeperError::ExecutorNotFound(_) | KeeperError::NotFound { .. } => CtrlResponse {
			status: 404,
			body: e.to_string(),
		},
		KeeperError::SingleProcMode(_) | KeeperError::NotMaster(_) => CtrlResponse::bad_request(e.to_string()),
		other => CtrlResponse::error(other.to_string()),
	}
}

fn executor_param(req: &CtrlRequest) -> Result<String, CtrlResponse> {
	match req.get("executor").map(str::trim) {
		Some(e) if !e.is_empty() => Ok(e.to_string()),
		_ => Err(CtrlResponse::bad_request("missing executor")),
	}
}

fn report_response(result: Result<AppsReport, KeeperError>) -> CtrlResponse {
	match result {
		Ok(report) => match serde_json::to_string(&report) {
			Ok(body) => CtrlResponse::ok(body),
			Err(e) => CtrlResponse::error(e.to_string()),
		},
		Err(e) => error_response(e),
	}
}

/// Client side of `starta`/`stopa`: one line per app.
fn render_report(ctx: &CmdContext<'_>, verb: &str) -> Result<String, CtrlError> {
	let body = ctx.get_result()?;
	Ok(match serde_json::from_str::<AppsReport>(&body) {
		Ok(report) => report.render(verb),
		Err(_) => body,
	})
}

fn info(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("info")
		.help("list executors, their pid and apps")
		.auto(true)
		.show_table(true);
	serve_with(command, keeper, |k, _req| async move {
		match serde_json::to_string(&k.info()) {
			Ok(body) => CtrlResponse::ok(body),
			Err(e) => CtrlResponse::error(e.to_string()),
		}
	})
}

fn starte(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("starte")
		.help("start an executor's child process")
		.opt(executor_opt())
		.args_help("apps to run in the child; empty means all")
		.auto(true);
	serve_with(command, keeper, |k, req| async move {
		let executor = match executor_param(&req) {
			Ok(e) => e,
			Err(resp) => return resp,
		};
		match k.start_executor(&executor, &split_app_names(&req.args)) {
			Ok(msg) => CtrlResponse::ok(msg),
			Err(e) => error_response(e),
		}
	})
}

fn starta(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("starta")
		.help("start apps in an executor")
		.opt(executor_opt())
		.args_help("app names")
		.args_required(true)
		.local(|ctx| render_report(ctx, "started"));
	serve_with(command, keeper, |k, req| async move {
		let executor = match executor_param(&req) {
			Ok(e) => e,
			Err(resp) => return resp,
		};
		report_response(k.start_apps(&executor, &split_app_names(&req.args)).await)
	})
}

fn stope(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("stope")
		.help("stop an executor")
		.opt(executor_opt())
		.auto(true);
	serve_with(command, keeper, |k, req| async move {
		let executor = match executor_param(&req) {
			Ok(e) => e,
			Err(resp) => return resp,
		};
		match k.stop_executor_named(&executor).await {
			Ok(msg) => CtrlResponse::ok(msg),
			Err(e) => error_response(e),
		}
	})
}

fn stopa(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("stopa")
		.help("stop apps in an executor")
		.opt(executor_opt())
		.args_help("app names")
		.args_required(true)
		.local(|ctx| render_report(ctx, "stopped"));
	serve_with(command, keeper, |k, req| async move {
		let executor = match executor_param(&req) {
			Ok(e) => e,
			Err(resp) => return resp,
		};
		report_response(k.stop_apps(&executor, &split_app_names(&req.args)).await)
	})
}

fn reload(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("reload").help("restart children or apps").auto(true);
	serve_with(command, keeper, |k, _req| async move {
		k.reload().await;
		CtrlResponse::ok(format!("{} reloaded", k.name()))
	})
}

fn debug(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("debug").help("show the debug flag").auto(true);
	serve_with(command, keeper, |k, _req| async move {
		CtrlResponse::ok(format!("debug={}", k.startup().debug))
	})
}

fn log(keeper: Option<&Arc<Keeper>>) -> Command {
	let command = Command::new("log").help("show logger settings").auto(true);
	serve_with(command, keeper, |k, _req| async move {
		CtrlResponse::ok(k.log_settings().describe())
	})
}

fn version() -> Command {
	Command::new("version")
		.help("show version info")
		.local(|ctx| Ok(VersionInfo::current(&ctx.channel.identity().keeper_name).to_string()))
}
