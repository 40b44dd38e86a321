use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{io_err, CtrlError};

/// Blocking JSON-lines client for one Unix socket connection.
pub struct SocketClient<Req, Resp> {
	stream: UnixStream,
	path: PathBuf,
	_phantom: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> SocketClient<Req, Resp>
where
	Req: Serialize,
	Resp: DeserializeOwned,
{
	/// Returns `Err(CtrlError::NotRunning)` if nothing is listening on the socket.
	pub fn connect(socket_path: &Path) -> Result<Self, CtrlError> {
		let stream = UnixStream::connect(socket_path).map_err(|err| {
			if matches!(
				err.kind(),
				std::io::ErrorKind::NotFound
					| std::io::ErrorKind::ConnectionRefused
					| std::io::ErrorKind::ConnectionReset
			) {
				CtrlError::NotRunning {
					socket: socket_path.to_path_buf(),
				}
			} else {
				io_err(socket_path, err)
			}
		})?;
		Ok(Self {
			stream,
			path: socket_path.to_path_buf(),
			_phantom: PhantomData,
		})
	}

	pub fn send(&mut self, request: &Req) -> Result<Resp, CtrlError> {
		let mut data = serde_json::to_vec(request)?;
		data.push(b'\n');
		self.stream
			.write_all(&data)
			.map_err(|e| io_err(&self.path, e))?;

		let mut reader = BufReader::new(&self.stream);
		let mut line = String::new();
		let read = reader
			.read_line(&mut line)
			.map_err(|e| io_err(&self.path, e))?;
		if read == 0 {
			return Err(CtrlError::Protocol(
				"connection closed before a response arrived".to_string(),
			));
		}

		Ok(serde_json::from_str(line.trim_end())?)
	}
}

/// Connect, send one request, return one response.
pub fn request_once<Req, Resp>(socket_path: &Path, request: &Req) -> Result<Resp, CtrlError>
where
	Req: Serialize,
	Resp: DeserializeOwned,
{
	SocketClient::connect(socket_path)?.send(request)
}

/// A socket is live if something accepts connections on it.
pub fn is_listening(socket_path: &Path) -> bool {
	UnixStream::connect(socket_path).is_ok()
}
