//! The editor surface consumed by the client.

use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::{Location, Uri};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::protocol::{DecorationOptions, InputBoxParams};
use crate::status::StatusState;

/// Handler invoked when the user runs a registered command.
pub type CommandHandler = Arc<dyn Fn(Vec<JsonValue>) + Send + Sync>;

/// Identifier of a decoration style created by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecorationStyleId(pub u64);

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
	/// Error message.
	Error,
	/// Warning message.
	Warning,
	/// Informational message.
	Info,
	/// Log-only message.
	Log,
}

impl From<lsp_types::MessageType> for MessageLevel {
	fn from(typ: lsp_types::MessageType) -> Self {
		match typ {
			lsp_types::MessageType::ERROR => Self::Error,
			lsp_types::MessageType::WARNING => Self::Warning,
			lsp_types::MessageType::INFO => Self::Info,
			_ => Self::Log,
		}
	}
}

/// A progress indicator shown by the host.
pub trait ProgressReporter: Send + Sync {
	/// Replace the progress detail text.
	fn report(&self, message: &str);

	/// Remove the indicator. Calling it more than once has no effect.
	fn finish(&self);
}

/// Editor integration points.
///
/// Implementations must be cheap to call from any task; the client calls them while processing
/// server messages and never holds its own locks across a call.
#[async_trait]
pub trait Host: Send + Sync + 'static {
	/// Whether a command with `id` is registered.
	fn has_command(&self, id: &str) -> bool;

	/// Register a command. Returns `false` if `id` was already registered.
	fn register_command(&self, id: &str, handler: CommandHandler) -> bool;

	/// Remove a command registered by the client.
	fn unregister_command(&self, id: &str);

	/// Run a host command by id.
	fn execute_host_command(&self, id: &str, args: Vec<JsonValue>);

	/// Replace the status line contents.
	fn update_status(&self, status: &StatusState);

	/// Show a progress indicator titled `title`.
	///
	/// When `cancel` is set the indicator is cancellable and the host cancels the token when the
	/// user dismisses it. Without it the indicator is indeterminate.
	fn begin_progress(&self, title: &str, cancel: Option<CancellationToken>) -> Box<dyn ProgressReporter>;

	/// Create a decoration style from opaque server options.
	fn create_decoration_style(&self, options: &JsonValue) -> DecorationStyleId;

	/// Render `decorations` with `style` on the document `uri`, replacing earlier ones.
	fn render_decorations(&self, style: DecorationStyleId, uri: &Uri, decorations: &[DecorationOptions]);

	/// The document currently focused in the editor.
	fn active_document(&self) -> Option<Uri>;

	/// Show a transient message.
	fn show_message(&self, level: MessageLevel, message: &str);

	/// Show a message with action buttons, resolving to the chosen action.
	async fn show_message_with_actions(&self, level: MessageLevel, message: &str, actions: &[String]) -> Option<String>;

	/// Append a line to the output log.
	fn append_log(&self, line: &str);

	/// Toggle the output log panel.
	fn toggle_log_panel(&self);

	/// Open the settings UI.
	fn open_settings(&self);

	/// Reveal a location in an editor.
	fn open_location(&self, location: &Location);

	/// Open a folder, optionally in a new window.
	fn open_folder(&self, uri: &Uri, new_window: bool);

	/// Refresh views that depend on server state.
	fn refresh_views(&self);

	/// Focus the diagnostics panel.
	fn show_diagnostics_panel(&self);

	/// Show a rendered report.
	fn show_report(&self, content: &str);

	/// Ask the user for a line of text. `None` when dismissed.
	async fn input_box(&self, params: InputBoxParams) -> Option<String>;
}
