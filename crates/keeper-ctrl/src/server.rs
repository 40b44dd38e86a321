use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use crate::error::{io_err, CtrlError};

/// Bind a listener, replacing a stale socket file left by a crashed run.
pub fn bind(socket_path: &Path) -> Result<UnixListener, CtrlError> {
	if socket_path.exists() {
		let _ = std::fs::remove_file(socket_path);
	}
	UnixListener::bind(socket_path).map_err(|e| io_err(socket_path, e))
}

/// Accept connections forever; one task per connection. A line that does not
/// decode as `Req` is answered with `on_error(message)`.
pub async fn serve<Req, Resp, F, Fut, E>(listener: UnixListener, handler: F, on_error: E)
where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Resp> + Send,
	E: Fn(String) -> Resp + Send + Sync + 'static,
{
	if let Ok(addr) = listener.local_addr() {
		if let Some(path) = addr.as_pathname() {
			tracing::info!("listening on {}", path.display());
		}
	}

	let handler = Arc::new(handler);
	let on_error = Arc::new(on_error);

	loop {
		let (stream, _) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let handler = Arc::clone(&handler);
		let on_error = Arc::clone(&on_error);
		tokio::spawn(async move {
			handle_connection(stream, handler, on_error).await;
		});
	}
}

async fn handle_connection<Req, Resp, F, Fut, E>(
	stream: tokio::net::UnixStream,
	handler: Arc<F>,
	on_error: Arc<E>,
) where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Resp> + Send,
	E: Fn(String) -> Resp + Send + Sync + 'static,
{
	let (reader, mut writer) = stream.into_split();
	let mut lines = BufReader::new(reader).lines();

	while let Ok(Some(line)) = lines.next_line().await {
		let response = match serde_json::from_str::<Req>(&line) {
			Ok(request) => handler(request).await,
			Err(e) => {
				tracing::warn!("invalid request: {}", e);
				on_error(format!("invalid request: {}", e))
			}
		};

		let mut data = match serde_json::to_vec(&response) {
			Ok(d) => d,
			Err(e) => {
				tracing::error!("failed to serialize response: {}", e);
				continue;
			}
		};
		data.push(b'\n');

		if writer.write_all(&data).await.is_err() {
			break;
		}
	}
}
