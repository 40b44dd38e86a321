use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clap::{Arg, ArgAction};

use crate::channel::ControlChannel;
use crate::error::CtrlError;
use crate::protocol::{command_path, CtrlRequest, CtrlResponse, CTRL_PREFIX};
use crate::render;

pub type LocalHandler = Arc<dyn Fn(&CmdContext<'_>) -> Result<String, CtrlError> + Send + Sync>;
pub type RemoteFuture = Pin<Box<dyn Future<Output = CtrlResponse> + Send>>;
pub type RemoteHandler = Arc<dyn Fn(CtrlRequest) -> RemoteFuture + Send + Sync>;

const ARGS_ID: &str = "args";

/// One named option of a command, parsed as `--name value`, `--name=value` or `-a value`.
#[derive(Debug, Clone)]
pub struct OptSpec {
	pub name: String,
	pub alias: Option<char>,
	pub required: bool,
	pub help: String,
}

impl OptSpec {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			alias: None,
			required: false,
			help: String::new(),
		}
	}

	pub fn alias(mut self, alias: char) -> Self {
		self.alias = Some(alias);
		self
	}

	pub fn required(mut self, required: bool) -> Self {
		self.required = required;
		self
	}

	pub fn help(mut self, help: impl Into<String>) -> Self {
		self.help = help.into();
		self
	}
}

/// A parsed shell line for one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
	pub command: String,
	pub opts: BTreeMap<String, String>,
	pub args: Vec<String>,
}

impl Invocation {
	pub fn opt(&self, name: &str) -> Option<&str> {
		self.opts.get(name).map(String::as_str)
	}

	pub fn to_request(&self) -> CtrlRequest {
		let mut req = CtrlRequest::new(command_path(&self.command)).args(self.args.iter().cloned());
		req.params = self.opts.clone();
		req
	}
}

/// What a local handler sees: the parsed line plus the channel to round-trip over.
pub struct CmdContext<'a> {
	pub invocation: &'a Invocation,
	pub channel: &'a ControlChannel,
	pub command: &'a Command,
}

impl CmdContext<'_> {
	pub fn opt(&self, name: &str) -> Option<&str> {
		self.invocation.opt(name)
	}

	pub fn args(&self) -> &[String] {
		&self.invocation.args
	}

	/// Send the invocation to the server and return the body of a 2xx response.
	pub fn get_result(&self) -> Result<String, CtrlError> {
		let resp = self.channel.request(&self.invocation.to_request())?;
		if resp.is_ok() {
			Ok(resp.body)
		} else {
			Err(CtrlError::Remote {
				status: resp.status,
				body: resp.body,
			})
		}
	}

	pub fn render(&self, body: &str) -> String {
		render::render_body(body, self.command.show_table)
	}
}

pub struct Command {
	name: String,
	help: String,
	opts: Vec<OptSpec>,
	args_help: Option<String>,
	args_required: bool,
	local: Option<LocalHandler>,
	remote: Option<RemoteHandler>,
	auto: bool,
	show_table: bool,
}

impl std::fmt::Debug for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Command")
			.field("name", &self.name)
			.field("opts", &self.opts)
			.field("local", &self.local.is_some())
			.field("remote", &self.remote.is_some())
			.field("auto", &self.auto)
			.field("show_table", &self.show_table)
			.finish()
	}
}

impl Command {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			help: String::new(),
			opts: Vec::new(),
			args_help: None,
			args_required: false,
			local: None,
			remote: None,
			auto: false,
			show_table: false,
		}
	}

	pub fn help(mut self, help: impl Into<String>) -> Self {
		self.help = help.into();
		self
	}

	pub fn opt(mut self, opt: OptSpec) -> Self {
		self.opts.push(opt);
		self
	}

	/// Accept positional arguments, described by `help` in usage text.
	pub fn args_help(mut self, help: impl Into<String>) -> Self {
		self.args_help = Some(help.into());
		self
	}

	pub fn args_required(mut self, required: bool) -> Self {
		self.args_required = required;
		self
	}

	pub fn local<F>(mut self, handler: F) -> Self
	where
		F: Fn(&CmdContext<'_>) -> Result<String, CtrlError> + Send + Sync + 'static,
	{
		let local: LocalHandler = Arc::new(handler);
		self.local = Some(local);
		self
	}

	pub fn remote<F, Fut>(mut self, handler: F) -> Self
	where
		F: Fn(CtrlRequest) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = CtrlResponse> + Send + 'static,
	{
		let remote: RemoteHandler = Arc::new(move |req: CtrlRequest| -> RemoteFuture {
			Box::pin(handler(req))
		});
		self.remote = Some(remote);
		self
	}

	pub fn auto(mut self, auto: bool) -> Self {
		self.auto = auto;
		self
	}

	pub fn show_table(mut self, show_table: bool) -> Self {
		self.show_table = show_table;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn about(&self) -> &str {
		&self.help
	}

	pub fn remote_handler(&self) -> Option<RemoteHandler> {
		self.remote.clone()
	}

	pub fn is_local(&self) -> bool {
		self.local.is_some()
	}

	fn clap_command(&self) -> clap::Command {
		let mut cmd = clap::Command::new(self.name.clone())
			.no_binary_name(true)
			.disable_version_flag(true)
			.about(self.help.clone());

		for opt in &self.opts {
			let mut arg = Arg::new(opt.name.clone())
				.long(opt.name.clone())
				.num_args(1)
				.required(opt.required)
				.help(opt.help.clone());
			if let Some(alias) = opt.alias {
				arg = arg.short(alias);
			}
			cmd = cmd.arg(arg);
		}

		if let Some(help) = &self.args_help {
			cmd = cmd.arg(
				Arg::new(ARGS_ID)
					.num_args(1..)
					.action(ArgAction::Append)
					.required(self.args_required)
					.help(help.clone()),
			);
		}
		cmd
	}

	pub fn usage(&self) -> String {
		self.clap_command().render_help().to_string()
	}

	/// Parse the words after the command name.
	pub fn parse(&self, words: &[String]) -> Result<Invocation, CtrlError> {
		let matches = self
			.clap_command()
			.try_get_matches_from(words)
			.map_err(|e| CtrlError::Usage(e.render().to_string().trim_end().to_string()))?;

		let mut opts = BTreeMap::new();
		for opt in &self.opts {
			if let Some(value) = matches.get_one::<String>(&opt.name) {
				opts.insert(opt.name.clone(), value.clone());
			}
		}

		let args = if self.args_help.is_some() {
			matches
				.get_many::<String>(ARGS_ID)
				.map(|vals| vals.cloned().collect())
				.unwrap_or_default()
		} else {
			Vec::new()
		};

		Ok(Invocation {
			command: self.name.clone(),
			opts,
			args,
		})
	}

	/// Local handler if any, otherwise the standard round trip for `auto` commands.
	pub fn dispatch(&self, channel: &ControlChannel, words: &[String]) -> Result<String, CtrlError> {
		let invocation = self.parse(words)?;
		let ctx = CmdContext {
			invocation: &invocation,
			channel,
			command: self,
		};
		if let Some(local) = &self.local {
			return local(&ctx);
		}
		if self.auto {
			let body = ctx.get_result()?;
			return Ok(ctx.render(&body));
		}
		Err(CtrlError::Usage(format!("{} has no shell handler", self.name)))
	}
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
	commands: BTreeMap<String, Arc<Command>>,
}

impl CommandRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, command: Command) -> Result<(), CtrlError> {
		if self.commands.contains_key(command.name()) {
			return Err(CtrlError::DuplicateCommand(command.name().to_string()));
		}
		self.commands
			.insert(command.name().to_string(), Arc::new(command));
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&Arc<Command>> {
		self.commands.get(name)
	}

	pub fn names(&self) -> Vec<&str> {
		self.commands.keys().map(String::as_str).collect()
	}

	pub fn commands(&self) -> impl Iterator<Item = &Arc<Command>> {
		self.commands.values()
	}

	/// Remote handler for a `/ctrl/<name>` path.
	pub fn route(&self, path: &str) -> Option<RemoteHandler> {
		let name = path
			.strip_prefix(CTRL_PREFIX)?
			.trim_matches('/');
		self.commands.get(name)?.remote_handler()
	}

	pub fn dispatch(&self, channel: &ControlChannel, name: &str, words: &[String]) -> Result<String, CtrlError> {
		let command = self
			.get(name)
			.ok_or_else(|| CtrlError::UnknownCommand(name.to_string()))?;
		command.dispatch(channel, words)
	}
}
