//! The single status line of a session.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::commands::CommandDispatcher;
use crate::host::Host;
use crate::protocol::StatusParams;

/// Local command bound to the status line when the server names none.
pub const TOGGLE_LOGS_COMMAND: &str = "tether.toggle-logs";

/// Current contents of the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusState {
	/// Displayed text.
	pub text: String,
	/// Whether the status line is shown.
	pub visible: bool,
	/// Hover text.
	pub tooltip: Option<String>,
	/// Server command bound as the click action.
	pub command: Option<String>,
}

impl StatusState {
	/// Merge a status push.
	///
	/// Text is always replaced. Visibility follows `show`/`hide`, with `hide` winning, and is
	/// kept when neither is set. An absent tooltip keeps the previous one; an absent command
	/// clears the bound action.
	pub fn apply(&mut self, params: &StatusParams) {
		self.text.clone_from(&params.text);
		if params.hide == Some(true) {
			self.visible = false;
		} else if params.show == Some(true) {
			self.visible = true;
		}
		if let Some(tooltip) = &params.tooltip {
			self.tooltip = Some(tooltip.clone());
		}
		self.command.clone_from(&params.command);
	}

	/// Command run when the status line is clicked.
	pub fn action(&self) -> &str {
		self.command.as_deref().unwrap_or(TOGGLE_LOGS_COMMAND)
	}
}

/// Applies status pushes and mirrors the result to the host.
pub struct StatusPresenter {
	host: Arc<dyn Host>,
	commands: Arc<CommandDispatcher>,
	state: Mutex<StatusState>,
}

impl std::fmt::Debug for StatusPresenter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StatusPresenter").field("state", &*self.state.lock()).finish_non_exhaustive()
	}
}

impl StatusPresenter {
	/// Create a presenter with a hidden, empty status line.
	pub fn new(host: Arc<dyn Host>, commands: Arc<CommandDispatcher>) -> Self {
		Self {
			host,
			commands,
			state: Mutex::new(StatusState::default()),
		}
	}

	/// Apply a server push and render the result.
	pub fn update(&self, params: &StatusParams) {
		if let Some(command) = &params.command {
			self.commands.bind_if_absent(command);
		}
		let snapshot = {
			let mut state = self.state.lock();
			state.apply(params);
			state.clone()
		};
		trace!(target: "tether::status", text = %snapshot.text, visible = snapshot.visible, action = snapshot.action(), "Status updated");
		self.host.update_status(&snapshot);
	}

	/// Current status line contents.
	pub fn snapshot(&self) -> StatusState {
		self.state.lock().clone()
	}
}
