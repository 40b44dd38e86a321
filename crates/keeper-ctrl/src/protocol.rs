use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CTRL_PREFIX: &str = "/ctrl";

/// Route for a registered command: `/ctrl/<name>`.
pub fn command_path(name: &str) -> String {
	format!("{}/{}", CTRL_PREFIX, name)
}

/// Command path plus query parameters plus positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrlRequest {
	pub path: String,
	#[serde(default)]
	pub params: BTreeMap<String, String>,
	#[serde(default)]
	pub args: Vec<String>,
}

impl CtrlRequest {
	pub fn new(path: impl Into<String>) -> Self {
		let path = path.into();
		let path = format!("/{}", path.trim_matches('/'));
		Self {
			path,
			params: BTreeMap::new(),
			args: Vec::new(),
		}
	}

	pub fn param(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
		self.params.insert(key.into(), val.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.params.get(key).map(String::as_str)
	}

	/// `k1=v1&k2=v2`, for logging.
	pub fn query_string(&self) -> String {
		self.params
			.iter()
			.map(|(k, v)| format!("{}={}", k, v))
			.collect::<Vec<_>>()
			.join("&")
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrlResponse {
	pub status: u16,
	pub body: String,
}

impl CtrlResponse {
	pub fn ok(body: impl Into<String>) -> Self {
		Self {
			status: 200,
			body: body.into(),
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self {
			status: 400,
			body: message.into(),
		}
	}

	pub fn not_found(path: &str) -> Self {
		Self {
			status: 404,
			body: format!("no route for {}", path),
		}
	}

	pub fn error(message: impl Into<String>) -> Self {
		Self {
			status: 500,
			body: message.into(),
		}
	}

	pub fn is_ok(&self) -> bool {
		(200..300).contains(&self.status)
	}
}
