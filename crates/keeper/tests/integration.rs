use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use keeper::cli::StopAction;
use keeper::{commands, App, Keeper, KeeperConfig, KeeperState, RunOutcome, StartupDescriptor, StopOutcome};
use keeper_ctrl::client::is_listening;
use keeper_ctrl::paths::RUNTIME_DIR_ENV;
use keeper_ctrl::{ControlChannel, CtrlIdentity, Shell};
use keeper_proc::PidFile;
use nix::sys::signal::Signal;

fn runtime_dir() -> &'static Path {
	static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
	DIR.get_or_init(|| {
		let dir = tempfile::Builder::new()
			.prefix("kk")
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

struct Noop(&'static str);

#[async_trait]
impl App for Noop {
	fn name(&self) -> String {
		self.0.to_string()
	}

	async fn execute(&self) -> anyhow::Result<()> {
		Ok(())
	}

	async fn exit(&self) -> anyhow::Result<()> {
		Ok(())
	}
}

async fn wait_until(cond: impl Fn() -> bool) {
	for _ in 0..200 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached within 2s");
}

#[test]
fn stop_without_pid_file_is_not_running() {
	let dir = tempfile::tempdir().unwrap();
	let pid_file = PidFile::for_name(dir.path(), "absent");
	assert_eq!(Keeper::stop_keeper(&pid_file, StopAction::Stop), StopOutcome::NotRunning);
}

#[test]
fn reload_signals_exactly_the_recorded_pid() {
	let dir = tempfile::tempdir().unwrap();
	let pid_file = PidFile::for_name(dir.path(), "k");
	let mut target = std::process::Command::new("sleep").arg("30").spawn().unwrap();
	let mut bystander = std::process::Command::new("sleep").arg("30").spawn().unwrap();
	std::fs::write(pid_file.path(), target.id().to_string()).unwrap();

	let outcome = Keeper::stop_keeper(&pid_file, StopAction::Reload);
	assert_eq!(
		outcome,
		StopOutcome::Signalled {
			pid: target.id() as i32,
			signal: Signal::SIGUSR2,
		}
	);

	let status = target.wait().unwrap();
	assert_eq!(status.signal(), Some(Signal::SIGUSR2 as i32));
	assert!(bystander.try_wait().unwrap().is_none(), "bystander was signalled");
	let _ = bystander.kill();
	let _ = bystander.wait();
}

#[test]
fn delivery_failure_is_reported_not_retried() {
	let dir = tempfile::tempdir().unwrap();
	let pid_file = PidFile::for_name(dir.path(), "k");
	std::fs::write(pid_file.path(), "2000000000").unwrap();

	match Keeper::stop_keeper(&pid_file, StopAction::Quit) {
		StopOutcome::DeliveryFailed { pid, signal, .. } => {
			assert_eq!(pid, 2_000_000_000);
			assert_eq!(signal, Signal::SIGQUIT);
		}
		other => panic!("expected DeliveryFailed, got {:?}", other),
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn single_proc_keeper_serves_ctrl_commands() {
	let name = keeper_name();
	let pid_path = runtime_dir().join(format!("{}.pid", name));
	let startup = StartupDescriptor {
		pid_file: Some(pid_path.clone()),
		..StartupDescriptor::default()
	};
	let keeper = Keeper::new(name.clone(), startup, KeeperConfig::default()).unwrap();

	let outcome = keeper
		.run_keeper(
			|k| {
				k.add_app_to_executor(Noop("a"), None)?;
				k.add_app_to_executor(Noop("b"), None)?;
				Ok(())
			},
			&[],
		)
		.unwrap();
	assert_eq!(outcome, RunOutcome::Running);
	assert_eq!(keeper.pid_file().read(), Some(std::process::id() as i32));

	let server = Arc::clone(&keeper);
	let serving = tokio::spawn(async move { server.serve().await });

	let socket = runtime_dir().join(format!("{}.sock", name));
	let probe = socket.clone();
	wait_until(move || is_listening(&probe)).await;
	let exec = keeper.executor(&name).unwrap();
	wait_until(|| exec.running_names().len() == 2).await;

	let client_name = name.clone();
	let outputs = tokio::task::spawn_blocking(move || {
		let channel = ControlChannel::new(CtrlIdentity::master(client_name.clone()));
		channel.init_client().unwrap();
		let registry = commands::registry(None).unwrap();
		let shell = Shell::new(&channel, &registry);
		[
			shell.dispatch_line("info").unwrap(),
			shell.dispatch_line(&format!("stopa -e {} a", client_name)).unwrap(),
			shell.dispatch_line(&format!("starta -e {} a,zzz", client_name)).unwrap(),
			shell.dispatch_line("debug").unwrap(),
			shell.dispatch_line(&format!("starte -e {}", client_name)).unwrap_err().to_string(),
		]
	})
	.await
	.unwrap();

	assert!(outputs[0].contains("AppsRunning"));
	assert!(outputs[0].contains("a,b"));
	assert!(outputs[0].contains("SingleProc"));
	assert_eq!(outputs[1], format!("stopped {}/a", name));
	assert!(outputs[2].starts_with(&format!("started {}/a\nfailed {}/zzz", name, name)));
	assert_eq!(outputs[3], "debug=false");
	assert!(outputs[4].contains("single process mode"));

	keeper.request_shutdown();
	serving.await.unwrap().unwrap();

	assert_eq!(keeper.state(), KeeperState::Exiting);
	assert!(!socket.exists());
	assert!(!pid_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn ctrl_disabled_serves_no_socket() {
	let name = keeper_name();
	let startup = StartupDescriptor {
		pid_file: Some(runtime_dir().join(format!("{}.pid", name))),
		..StartupDescriptor::default()
	};
	let config = KeeperConfig::parse("ctrl = false").unwrap();
	let keeper = Keeper::new(name.clone(), startup, config).unwrap();
	keeper.run_keeper(|k| k.add_app_to_executor(Noop("a"), None).map_err(Into::into), &[])
		.unwrap();

	let server = Arc::clone(&keeper);
	let serving = tokio::spawn(async move { server.serve().await });
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(!runtime_dir().join(format!("{}.sock", name)).exists());

	keeper.request_shutdown();
	serving.await.unwrap().unwrap();
	assert_eq!(keeper.state(), KeeperState::Exiting);
}
