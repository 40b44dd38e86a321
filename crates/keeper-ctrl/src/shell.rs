use std::io::{BufRead, Write};

use owo_colors::OwoColorize;

use crate::channel::ControlChannel;
use crate::command::CommandRegistry;
use crate::error::CtrlError;

/// Interactive read-eval-print loop over registered commands.
pub struct Shell<'a> {
	channel: &'a ControlChannel,
	registry: &'a CommandRegistry,
	prompt: String,
}

impl<'a> Shell<'a> {
	pub fn new(channel: &'a ControlChannel, registry: &'a CommandRegistry) -> Self {
		let prompt = format!("{}> ", channel.identity().keeper_name);
		Self {
			channel,
			registry,
			prompt,
		}
	}

	/// Run one shell line. `help` is answered locally.
	pub fn dispatch_line(&self, line: &str) -> Result<String, CtrlError> {
		let words: Vec<String> = line.split_whitespace().map(String::from).collect();
		let Some((name, rest)) = words.split_first() else {
			return Ok(String::new());
		};
		if name == "help" {
			return self.help(rest.first().map(String::as_str));
		}
		self.registry.dispatch(self.channel, name, rest)
	}

	fn help(&self, topic: Option<&str>) -> Result<String, CtrlError> {
		if let Some(topic) = topic {
			let command = self
				.registry
				.get(topic)
				.ok_or_else(|| CtrlError::UnknownCommand(topic.to_string()))?;
			return Ok(command.usage());
		}

		let width = self
			.registry
			.names()
			.iter()
			.map(|n| n.len())
			.max()
			.unwrap_or(0)
			.max("help".len());
		let mut out = String::new();
		for command in self.registry.commands() {
			out.push_str(&format!("  {:width$}  {}\n", command.name(), command.about(), width = width));
		}
		out.push_str(&format!("  {:width$}  {}\n", "help", "show commands, or usage of one", width = width));
		out.push_str(&format!("  {:width$}  {}", "exit", "leave the shell", width = width));
		Ok(out)
	}

	pub fn run(&self) -> Result<(), CtrlError> {
		let stdin = std::io::stdin();
		let mut stdout = std::io::stdout();
		let mut line = String::new();

		loop {
			print!("{}", self.prompt);
			let _ = stdout.flush();

			line.clear();
			let read = stdin
				.lock()
				.read_line(&mut line)
				.map_err(|e| CtrlError::Protocol(format!("stdin: {}", e)))?;
			if read == 0 {
				println!();
				return Ok(());
			}

			let trimmed = line.trim();
			if matches!(trimmed, "exit" | "quit") {
				return Ok(());
			}

			match self.dispatch_line(trimmed) {
				Ok(out) if out.is_empty() => {}
				Ok(out) => println!("{}", out),
				Err(e) => eprintln!("{}", e.to_string().red()),
			}
		}
	}
}
