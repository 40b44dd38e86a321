use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
	let commit = Command::new("git")
		.args(["rev-parse", "--short", "HEAD"])
		.output()
		.ok()
		.filter(|out| out.status.success())
		.map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
		.filter(|s| !s.is_empty())
		.unwrap_or_else(|| "unknown".to_string());

	let built = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);

	let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

	println!("cargo:rustc-env=KEEPER_GIT_COMMIT={}", commit);
	println!("cargo:rustc-env=KEEPER_BUILD_EPOCH={}", built);
	println!("cargo:rustc-env=KEEPER_TARGET={}", target);
	println!("cargo:rerun-if-changed=../../.git/HEAD");
}
