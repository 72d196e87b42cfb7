//! Host that renders everything to the log.

use std::collections::HashMap;

use async_trait::async_trait;
use lsp_types::{Location, Uri};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tether_client::protocol::{DecorationOptions, InputBoxParams};
use tether_client::status::StatusState;
use tether_client::{CommandHandler, DecorationStyleId, Host, MessageLevel, ProgressReporter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// [`Host`] without a user interface.
///
/// Interactive prompts resolve as dismissed. Commands are kept in a registry so they can be run
/// from the command line.
#[derive(Default)]
pub struct LogHost {
	commands: Mutex<HashMap<String, CommandHandler>>,
	active: Mutex<Option<Uri>>,
	next_style: Mutex<u64>,
}

impl LogHost {
	/// Mark `uri` as the focused document.
	pub fn set_active_document(&self, uri: Option<Uri>) {
		*self.active.lock() = uri;
	}

	/// Run a registered command. Returns `false` if it is unknown.
	pub fn run_command(&self, id: &str, args: Vec<JsonValue>) -> bool {
		let handler = self.commands.lock().get(id).cloned();
		match handler {
			Some(handler) => {
				handler(args);
				true
			}
			None => false,
		}
	}

	/// Registered command ids, sorted.
	pub fn command_ids(&self) -> Vec<String> {
		let mut ids: Vec<_> = self.commands.lock().keys().cloned().collect();
		ids.sort();
		ids
	}
}

struct LogProgress {
	title: String,
}

impl ProgressReporter for LogProgress {
	fn report(&self, message: &str) {
		info!(target: "tether::progress", title = %self.title, "{message}");
	}

	fn finish(&self) {
		debug!(target: "tether::progress", title = %self.title, "Finished");
	}
}

#[async_trait]
impl Host for LogHost {
	fn has_command(&self, id: &str) -> bool {
		self.commands.lock().contains_key(id)
	}

	fn register_command(&self, id: &str, handler: CommandHandler) -> bool {
		let mut commands = self.commands.lock();
		if commands.contains_key(id) {
			return false;
		}
		commands.insert(id.to_owned(), handler);
		true
	}

	fn unregister_command(&self, id: &str) {
		self.commands.lock().remove(id);
	}

	fn execute_host_command(&self, id: &str, args: Vec<JsonValue>) {
		if !self.run_command(id, args) {
			warn!(command = id, "Unknown host command");
		}
	}

	fn update_status(&self, status: &StatusState) {
		if status.visible {
			info!(target: "tether::status", action = status.action(), tooltip = ?status.tooltip, "{}", status.text);
		}
	}

	fn begin_progress(&self, title: &str, cancel: Option<CancellationToken>) -> Box<dyn ProgressReporter> {
		info!(target: "tether::progress", cancellable = cancel.is_some(), "{title}");
		Box::new(LogProgress { title: title.to_owned() })
	}

	fn create_decoration_style(&self, options: &JsonValue) -> DecorationStyleId {
		let mut next = self.next_style.lock();
		*next += 1;
		debug!(style = *next, %options, "Decoration style");
		DecorationStyleId(*next)
	}

	fn render_decorations(&self, style: DecorationStyleId, uri: &Uri, decorations: &[DecorationOptions]) {
		info!(style = style.0, uri = uri.as_str(), count = decorations.len(), "Decorations");
		for decoration in decorations {
			debug!(
				line = decoration.range.start.line,
				hover = decoration.hover_text.as_deref().unwrap_or_default(),
				"Decoration"
			);
		}
	}

	fn active_document(&self) -> Option<Uri> {
		self.active.lock().clone()
	}

	fn show_message(&self, level: MessageLevel, message: &str) {
		match level {
			MessageLevel::Error => error!("{message}"),
			MessageLevel::Warning => warn!("{message}"),
			MessageLevel::Info => info!("{message}"),
			MessageLevel::Log => debug!("{message}"),
		}
	}

	async fn show_message_with_actions(&self, level: MessageLevel, message: &str, actions: &[String]) -> Option<String> {
		self.show_message(level, message);
		debug!(?actions, "No interactive prompt; dismissing");
		None
	}

	fn append_log(&self, line: &str) {
		info!(target: "tether::server", "{line}");
	}

	fn toggle_log_panel(&self) {
		debug!("Log panel toggled");
	}

	fn open_settings(&self) {
		info!("Edit the configuration file to change settings");
	}

	fn open_location(&self, location: &Location) {
		info!(uri = location.uri.as_str(), line = location.range.start.line, "Open location");
	}

	fn open_folder(&self, uri: &Uri, new_window: bool) {
		info!(uri = uri.as_str(), new_window, "Open folder");
	}

	fn refresh_views(&self) {
		debug!("Refresh views");
	}

	fn show_diagnostics_panel(&self) {
		debug!("Show diagnostics");
	}

	fn show_report(&self, content: &str) {
		info!("Report:\n{content}");
	}

	async fn input_box(&self, params: InputBoxParams) -> Option<String> {
		info!(prompt = %params.prompt, "Input requested; dismissing");
		None
	}
}
