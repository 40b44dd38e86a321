use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::app::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
	Unknown,
	Starting,
	Running,
	Stopping,
	Stopped,
}

impl fmt::Display for AppState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Unknown => "unknown",
			Self::Starting => "starting",
			Self::Running => "running",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
		};
		write!(f, "{}", s)
	}
}

/// One app plus its run state.
#[derive(Clone)]
pub struct AppContainer {
	pub(crate) app: Arc<dyn App>,
	pub(crate) state: AppState,
	pub(crate) start_time: Option<DateTime<Local>>,
	pub(crate) stop_time: Option<DateTime<Local>>,
}

impl AppContainer {
	pub(crate) fn new(app: Arc<dyn App>) -> Self {
		Self {
			app,
			state: AppState::Unknown,
			start_time: None,
			stop_time: None,
		}
	}

	pub fn app(&self) -> &Arc<dyn App> {
		&self.app
	}

	pub fn state(&self) -> AppState {
		self.state
	}

	pub fn start_time(&self) -> Option<DateTime<Local>> {
		self.start_time
	}

	pub fn stop_time(&self) -> Option<DateTime<Local>> {
		self.stop_time
	}

	pub fn is_active(&self) -> bool {
		matches!(self.state, AppState::Starting | AppState::Running)
	}
}

impl fmt::Debug for AppContainer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AppContainer")
			.field("app", &self.app.name())
			.field("state", &self.state)
			.field("start_time", &self.start_time)
			.field("stop_time", &self.stop_time)
			.finish()
	}
}
