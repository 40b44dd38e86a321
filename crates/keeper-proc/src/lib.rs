//! # keeper-proc
//!
//! Child process supervision for keeper.
//!
//! Spawns one OS process per executor, restarts it within a bounded budget when it
//! crashes, and stops it with an escalating signal sequence. Also owns the PID file
//! and self-detach helpers the master process needs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use keeper_proc::{ProcessSpec, ProcessSupervisor};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = ProcessSupervisor::new();
//! let spec = ProcessSpec::new("worker", "/usr/bin/sleep").arg("60");
//!
//! let handle = sup.spawn(spec).unwrap();
//! println!("worker pid {:?}", handle.pid());
//!
//! sup.stop("worker").await;
//! # }
//! ```

pub mod daemon;
pub mod error;
pub mod pidfile;
pub mod signal;
pub mod supervisor;
pub mod types;

pub use error::ProcError;
pub use pidfile::PidFile;
pub use supervisor::{ProcessHandle, ProcessSupervisor};
pub use types::*;
