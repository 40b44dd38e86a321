use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use keeper_ctrl::client::{is_listening, request_once};
use keeper_ctrl::paths::RUNTIME_DIR_ENV;
use keeper_ctrl::{
	Command, CommandRegistry, ControlChannel, CtrlError, CtrlIdentity, CtrlMode, CtrlRequest, CtrlResponse, OptSpec,
	Shell,
};

const INFO: &str = r#"{"Keeper":"K","ProcMode":"SingleProc","Executor":"K","Pid":0,"Apps":"a,b","AppsRunnig":""}"#;

fn runtime_dir() -> &'static Path {
	static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
	DIR.get_or_init(|| {
		let dir = tempfile::Builder::new()
			.prefix("kc")
			.tempdir_in("/tmp")
			.unwrap();
		std::env::set_var(RUNTIME_DIR_ENV, dir.path());
		dir
	})
	.path()
}

fn keeper_name() -> String {
	static COUNTER: AtomicUsize = AtomicUsize::new(0);
	runtime_dir();
	format!("K{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn registry() -> Arc<CommandRegistry> {
	let mut registry = CommandRegistry::new();
	registry
		.register(
			Command::new("info")
				.help("show executors")
				.remote(|_req| async { CtrlResponse::ok(INFO) })
				.auto(true)
				.show_table(true),
		)
		.unwrap();
	registry
		.register(
			Command::new("starta")
				.help("start apps")
				.opt(OptSpec::new("executor").alias('e').required(true))
				.args_help("apps")
				.args_required(true)
				.remote(|req: CtrlRequest| async move {
					let executor = req.get("executor").unwrap_or_default().to_string();
					CtrlResponse::ok(format!("{}:{}", executor, req.args.join(",")))
				})
				.auto(true),
		)
		.unwrap();
	registry
		.register(
			Command::new("fail")
				.remote(|_req| async { CtrlResponse::error("boom") })
				.auto(true),
		)
		.unwrap();
	Arc::new(registry)
}

async fn start_server(name: &str) -> PathBuf {
	let channel = Arc::new(ControlChannel::new(CtrlIdentity::master(name)));
	channel.init_server().unwrap();
	let socket = channel.socket_path().unwrap().to_path_buf();

	let registry = registry();
	let server = Arc::clone(&channel);
	tokio::spawn(async move { server.ctrl_server_start(registry).await });

	wait_listening(&socket).await;
	socket
}

async fn wait_listening(socket: &Path) {
	for _ in 0..100 {
		if is_listening(socket) {
			return;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	panic!("server never listened on {}", socket.display());
}

fn client(name: &str) -> ControlChannel {
	let channel = ControlChannel::new(CtrlIdentity::master(name));
	channel.init_client().unwrap();
	channel
}

// --- Round trips ---

#[tokio::test(flavor = "multi_thread")]
async fn info_payload_round_trips_unmodified() {
	let name = keeper_name();
	start_server(&name).await;

	let body = tokio::task::spawn_blocking(move || client(&name).ctrl_get_str("/ctrl/info", &BTreeMap::new()))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(body, INFO);
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_command_sends_options_and_args() {
	let name = keeper_name();
	start_server(&name).await;

	let out = tokio::task::spawn_blocking(move || {
		let channel = client(&name);
		let registry = registry();
		Shell::new(&channel, &registry).dispatch_line("starta -e web a b")
	})
	.await
	.unwrap()
	.unwrap();
	assert_eq!(out, "web:a,b");
}

#[tokio::test(flavor = "multi_thread")]
async fn table_command_renders_rows() {
	let name = keeper_name();
	start_server(&name).await;

	let out = tokio::task::spawn_blocking(move || {
		let channel = client(&name);
		let registry = registry();
		Shell::new(&channel, &registry).dispatch_line("info")
	})
	.await
	.unwrap()
	.unwrap();
	assert!(out.contains("ProcMode"));
	assert!(out.contains("SingleProc"));
	assert!(out.contains("a,b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_errors_surface_as_remote() {
	let name = keeper_name();
	start_server(&name).await;

	let err = tokio::task::spawn_blocking(move || {
		let channel = client(&name);
		let registry = registry();
		Shell::new(&channel, &registry).dispatch_line("fail")
	})
	.await
	.unwrap()
	.unwrap_err();
	match err {
		CtrlError::Remote { status, body } => {
			assert_eq!(status, 500);
			assert_eq!(body, "boom");
		}
		other => panic!("expected Remote, got {:?}", other),
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_route_is_404_and_bad_line_is_400() {
	let name = keeper_name();
	let socket = start_server(&name).await;

	let (missing, bad) = tokio::task::spawn_blocking(move || {
		let missing: CtrlResponse = request_once(&socket, &CtrlRequest::new("/ctrl/nope")).unwrap();

		use std::io::{BufRead, BufReader, Write};
		let mut stream = std::os::unix::net::UnixStream::connect(&socket).unwrap();
		stream.write_all(b"not json\n").unwrap();
		let mut line = String::new();
		BufReader::new(&stream).read_line(&mut line).unwrap();
		let bad: CtrlResponse = serde_json::from_str(line.trim_end()).unwrap();
		(missing, bad)
	})
	.await
	.unwrap();

	assert_eq!(missing.status, 404);
	assert_eq!(bad.status, 400);
}

// --- Channel setup ---

#[tokio::test(flavor = "multi_thread")]
async fn server_start_replaces_stale_socket_file() {
	let name = keeper_name();
	let channel = Arc::new(ControlChannel::new(CtrlIdentity::master(name.as_str())));
	channel.init_server().unwrap();
	let socket = channel.socket_path().unwrap().to_path_buf();

	std::fs::write(&socket, b"stale").unwrap();

	let server = Arc::clone(&channel);
	tokio::spawn(async move { server.ctrl_server_start(registry()).await });
	wait_listening(&socket).await;

	let body = tokio::task::spawn_blocking(move || client(&name).ctrl_get_str("/ctrl/info", &BTreeMap::new()))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(body, INFO);
}

#[test]
fn init_server_clears_stale_file() {
	let name = keeper_name();
	let socket = CtrlIdentity::master(name.as_str()).socket_path().unwrap();
	std::fs::write(&socket, b"stale").unwrap();

	let channel = ControlChannel::new(CtrlIdentity::master(name.as_str()));
	channel.init_server().unwrap();
	assert!(!socket.exists());
}

#[test]
fn second_init_has_no_effect() {
	let name = keeper_name();
	let socket = CtrlIdentity::master(name.as_str()).socket_path().unwrap();

	let channel = ControlChannel::new(CtrlIdentity::master(name.as_str()));
	channel.init_client().unwrap();
	std::fs::write(&socket, b"keep").unwrap();
	channel.init_server().unwrap();

	assert_eq!(channel.mode(), CtrlMode::Client);
	assert!(socket.exists(), "losing init must not touch the socket file");
}

#[test]
fn client_reports_not_running() {
	let channel = client(&keeper_name());
	assert!(matches!(
		channel.ctrl_get_str("/ctrl/info", &BTreeMap::new()),
		Err(CtrlError::NotRunning { .. })
	));
}

#[tokio::test]
async fn server_start_on_client_channel_fails() {
	let channel = client(&keeper_name());
	assert!(matches!(
		channel.ctrl_server_start(registry()).await,
		Err(CtrlError::AlreadyClient)
	));
}

#[test]
fn child_socket_is_scoped_to_executor() {
	let name = keeper_name();
	let channel = ControlChannel::new(CtrlIdentity::child(name.as_str(), Some("web".into())));
	channel.init_server().unwrap();
	let socket = channel.socket_path().unwrap();
	assert_eq!(
		socket.file_name().unwrap().to_string_lossy(),
		format!("{}_web.sock", name)
	);
}
