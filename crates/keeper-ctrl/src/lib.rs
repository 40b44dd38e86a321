//! # keeper-ctrl
//!
//! Administrative control plane for a keeper process.
//!
//! A [`ControlChannel`] is initialized exactly once, either as a server inside the
//! process being administered or as a client inside a separate `ctrl` invocation.
//! Commands registered in a [`CommandRegistry`] are reachable by name from the
//! interactive [`Shell`] and, on the server side, by their `/ctrl/<name>` route.
//!
//! The wire format is newline-delimited JSON over a Unix stream socket: one
//! [`CtrlRequest`] per line in, one [`CtrlResponse`] per line out.

pub mod channel;
pub mod client;
pub mod command;
pub mod error;
pub mod paths;
pub mod protocol;
pub mod render;
pub mod server;
pub mod shell;

pub use channel::{ControlChannel, CtrlClient, CtrlMode, CtrlServer};
pub use client::SocketClient;
pub use command::{CmdContext, Command, CommandRegistry, Invocation, OptSpec};
pub use error::CtrlError;
pub use paths::{CtrlIdentity, CtrlPaths};
pub use protocol::{CtrlRequest, CtrlResponse};
pub use shell::Shell;
