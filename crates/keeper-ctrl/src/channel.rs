use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::client;
use crate::command::CommandRegistry;
use crate::error::{io_err, CtrlError};
use crate::paths::CtrlIdentity;
use crate::protocol::{CtrlRequest, CtrlResponse};
use crate::server;
use crate::shell::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlMode {
	Unknown,
	Server,
	Client,
}

/// Serving side: owns the socket path it listens on.
#[derive(Debug)]
pub struct CtrlServer {
	socket: PathBuf,
}

impl CtrlServer {
	pub fn socket_path(&self) -> &Path {
		&self.socket
	}

	/// Bind the socket and serve `registry`'s remote handlers. Runs until the task is dropped.
	pub async fn start(&self, registry: Arc<CommandRegistry>) -> Result<(), CtrlError> {
		let listener = server::bind(&self.socket)?;
		tracing::info!("ctrl server on {}", self.socket.display());

		let handler = move |req: CtrlRequest| {
			let route = registry.route(&req.path);
			async move {
				tracing::debug!("ctrl {} {}", req.path, req.query_string());
				match route {
					Some(handler) => handler(req).await,
					None => CtrlResponse::not_found(&req.path),
				}
			}
		};
		let on_error = |msg: String| CtrlResponse::bad_request(msg);
		server::serve(listener, handler, on_error).await;
		Ok(())
	}
}

/// Dialing side: every request opens the socket, sends one line, reads one line.
#[derive(Debug)]
pub struct CtrlClient {
	socket: PathBuf,
}

impl CtrlClient {
	pub fn socket_path(&self) -> &Path {
		&self.socket
	}

	pub fn request(&self, req: &CtrlRequest) -> Result<CtrlResponse, CtrlError> {
		client::request_once(&self.socket, req)
	}

	/// Body of a 2xx response; anything else is [`CtrlError::Remote`].
	pub fn get_str(&self, path: &str, params: &BTreeMap<String, String>) -> Result<String, CtrlError> {
		let mut req = CtrlRequest::new(path);
		req.params = params.clone();
		let resp = self.request(&req)?;
		if resp.is_ok() {
			Ok(resp.body)
		} else {
			Err(CtrlError::Remote {
				status: resp.status,
				body: resp.body,
			})
		}
	}
}

#[derive(Debug)]
enum Endpoint {
	Server(CtrlServer),
	Client(CtrlClient),
}

/// Administrative socket endpoint whose role is fixed by the first successful init.
#[derive(Debug)]
pub struct ControlChannel {
	identity: CtrlIdentity,
	endpoint: OnceLock<Endpoint>,
}

impl ControlChannel {
	pub fn new(identity: CtrlIdentity) -> Self {
		Self {
			identity,
			endpoint: OnceLock::new(),
		}
	}

	pub fn identity(&self) -> &CtrlIdentity {
		&self.identity
	}

	pub fn mode(&self) -> CtrlMode {
		match self.endpoint.get() {
			None => CtrlMode::Unknown,
			Some(Endpoint::Server(_)) => CtrlMode::Server,
			Some(Endpoint::Client(_)) => CtrlMode::Client,
		}
	}

	pub fn socket_path(&self) -> Option<&Path> {
		match self.endpoint.get()? {
			Endpoint::Server(s) => Some(s.socket_path()),
			Endpoint::Client(c) => Some(c.socket_path()),
		}
	}

	/// No-op once a role is set. The winning call clears a stale socket file.
	pub fn init_server(&self) -> Result<(), CtrlError> {
		if self.endpoint.get().is_some() {
			return Ok(());
		}
		let socket = self.identity.socket_path()?;
		let won = self
			.endpoint
			.set(Endpoint::Server(CtrlServer {
				socket: socket.clone(),
			}))
			.is_ok();
		if won && socket.exists() {
			tracing::debug!("removing stale socket {}", socket.display());
			std::fs::remove_file(&socket).map_err(|e| io_err(&socket, e))?;
		}
		Ok(())
	}

	/// No-op once a role is set.
	pub fn init_client(&self) -> Result<(), CtrlError> {
		if self.endpoint.get().is_some() {
			return Ok(());
		}
		let socket = self.identity.socket_path()?;
		let _ = self.endpoint.set(Endpoint::Client(CtrlClient { socket }));
		Ok(())
	}

	pub fn server(&self) -> Result<&CtrlServer, CtrlError> {
		match self.endpoint.get() {
			Some(Endpoint::Server(s)) => Ok(s),
			Some(Endpoint::Client(_)) => Err(CtrlError::AlreadyClient),
			None => Err(CtrlError::NotInitialized),
		}
	}

	pub fn client(&self) -> Result<&CtrlClient, CtrlError> {
		match self.endpoint.get() {
			Some(Endpoint::Client(c)) => Ok(c),
			Some(Endpoint::Server(_)) => Err(CtrlError::AlreadyServer),
			None => Err(CtrlError::NotInitialized),
		}
	}

	pub async fn ctrl_server_start(&self, registry: Arc<CommandRegistry>) -> Result<(), CtrlError> {
		let server = self.server().map_err(|e| {
			tracing::error!("ctrl server start: {}", e);
			e
		})?;
		server.start(registry).await
	}

	pub fn ctrl_client_start(&self, registry: &CommandRegistry) -> Result<(), CtrlError> {
		self.client().map_err(|e| {
			tracing::error!("ctrl client start: {}", e);
			e
		})?;
		Shell::new(self, registry).run()
	}

	pub fn ctrl_get_str(&self, path: &str, params: &BTreeMap<String, String>) -> Result<String, CtrlError> {
		self.client()?.get_str(path, params)
	}

	pub fn request(&self, req: &CtrlRequest) -> Result<CtrlResponse, CtrlError> {
		self.client()?.request(req)
	}
}
