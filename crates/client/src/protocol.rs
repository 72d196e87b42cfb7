//! Protocol extensions spoken between the client and the analysis server.
//!
//! Each message kind is a marker type implementing [`Request`] or [`Notification`], mirroring
//! how [`lsp_types`] describes the standard methods.

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use lsp_types::{Range, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Server-pushed status line update.
#[derive(Debug)]
pub enum StatusUpdate {}

impl Notification for StatusUpdate {
	type Params = StatusParams;
	const METHOD: &'static str = "tether/status";
}

/// Payload of [`StatusUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
	/// Text to display.
	pub text: String,
	/// Show the status line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub show: Option<bool>,
	/// Hide the status line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hide: Option<bool>,
	/// Hover text.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tooltip: Option<String>,
	/// Command bound to clicking the status line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
}

/// Server asks the client to perform a client-side action.
#[derive(Debug)]
pub enum ExecuteClientCommand {}

impl Notification for ExecuteClientCommand {
	type Params = ClientCommandParams;
	const METHOD: &'static str = "tether/executeClientCommand";
}

/// Payload of [`ExecuteClientCommand`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCommandParams {
	/// Sub-kind of the action.
	pub command: String,
	/// Action arguments.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub arguments: Vec<JsonValue>,
}

/// Sub-kinds of [`ExecuteClientCommand`].
pub mod client_commands {
	/// Navigate to a location; argument is an LSP `Location`.
	pub const GOTO_LOCATION: &str = "tether-goto-location";
	/// Refresh views that depend on server state.
	pub const MODEL_REFRESH: &str = "tether-model-refresh";
	/// Open a folder; argument is `{uri, newWindow?}`.
	pub const OPEN_FOLDER: &str = "tether-open-folder";
	/// Focus the diagnostics panel.
	pub const DIAGNOSTICS_FOCUS: &str = "tether-diagnostics-focus";
	/// Show the server health report; argument is the rendered report.
	pub const DOCTOR_RUN: &str = "tether-doctor-run";
	/// Run a host command; arguments are the command id followed by its arguments.
	pub const ECHO_COMMAND: &str = "tether-echo-command";
}

/// Argument of [`client_commands::OPEN_FOLDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFolderParams {
	/// Folder to open.
	pub uri: Uri,
	/// Open in a new window.
	#[serde(default)]
	pub new_window: bool,
}

/// Long-running server operation shown with elapsed time.
#[derive(Debug)]
pub enum SlowTask {}

impl Request for SlowTask {
	type Params = SlowTaskParams;
	type Result = SlowTaskResult;
	const METHOD: &'static str = "tether/slowTask";
}

/// Payload of [`SlowTask`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowTaskParams {
	/// What the server is doing.
	pub message: String,
	/// Seconds the operation already ran before the request was sent.
	#[serde(default, alias = "secondsElapsed", skip_serializing_if = "Option::is_none")]
	pub seconds_elapsed_so_far: Option<u64>,
}

/// Result of [`SlowTask`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowTaskResult {
	/// The user asked to cancel the operation.
	pub cancel: bool,
}

/// Full replacement of the decorations of one document.
#[derive(Debug)]
pub enum PublishDecorations {}

impl Notification for PublishDecorations {
	type Params = DecorationsParams;
	const METHOD: &'static str = "tether/publishDecorations";
}

/// Payload of [`PublishDecorations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationsParams {
	/// Document the decorations belong to.
	pub document_uri: Uri,
	/// Decorations, in render order.
	#[serde(default)]
	pub options: Vec<DecorationOptions>,
}

/// One inline annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationOptions {
	/// Annotated range.
	pub range: Range,
	/// Text shown on hover.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hover_text: Option<String>,
	/// Opaque render options for the host.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub render_options: Option<JsonValue>,
}

/// New rendering style for subsequent decorations.
#[derive(Debug)]
pub enum DecorationTypeDidChange {}

impl Notification for DecorationTypeDidChange {
	type Params = JsonValue;
	const METHOD: &'static str = "tether/decorationTypeDidChange";
}

/// The user focused a document.
#[derive(Debug)]
pub enum DidFocusTextDocument {}

impl Notification for DidFocusTextDocument {
	type Params = Uri;
	const METHOD: &'static str = "tether/didFocusTextDocument";
}

/// The editor window gained or lost focus.
#[derive(Debug)]
pub enum WindowStateDidChange {}

impl Notification for WindowStateDidChange {
	type Params = WindowStateParams;
	const METHOD: &'static str = "tether/windowStateDidChange";
}

/// Payload of [`WindowStateDidChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStateParams {
	/// Whether the window is focused.
	pub focused: bool,
}

/// Server asks the user for a line of text.
#[derive(Debug)]
pub enum InputBox {}

impl Request for InputBox {
	type Params = InputBoxParams;
	type Result = InputBoxResult;
	const METHOD: &'static str = "tether/inputBox";
}

/// Payload of [`InputBox`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBoxParams {
	/// Prompt shown above the input.
	#[serde(default)]
	pub prompt: String,
	/// Prefilled value.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	/// Placeholder when empty.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub placeholder: Option<String>,
	/// Mask the input.
	#[serde(default)]
	pub password: bool,
}

/// Result of [`InputBox`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBoxResult {
	/// Entered text.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	/// Set when the user dismissed the input.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cancelled: Option<bool>,
}

impl InputBoxResult {
	/// Result for a dismissed input.
	pub fn cancelled() -> Self {
		Self {
			value: None,
			cancelled: Some(true),
		}
	}
}

/// Client providers advertised in `initializationOptions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationOptions {
	/// `"on"` when the client renders [`StatusUpdate`].
	pub status_bar_provider: String,
	/// Client answers [`SlowTask`].
	pub slow_task_provider: bool,
	/// Client renders [`PublishDecorations`].
	pub decoration_provider: bool,
	/// Client handles [`ExecuteClientCommand`].
	pub execute_client_command_provider: bool,
	/// Client sends [`DidFocusTextDocument`].
	pub did_focus_provider: bool,
	/// Client answers [`InputBox`].
	pub input_box_provider: bool,
	/// Snapshot of the host settings.
	pub user_configuration: serde_json::Map<String, JsonValue>,
}

impl InitializationOptions {
	/// Options advertising every provider this client implements.
	pub fn with_settings(user_configuration: serde_json::Map<String, JsonValue>) -> Self {
		Self {
			status_bar_provider: "on".into(),
			slow_task_provider: true,
			decoration_provider: true,
			execute_client_command_provider: true,
			did_focus_provider: true,
			input_box_provider: true,
			user_configuration,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn slow_task_accepts_both_elapsed_spellings() {
		let a: SlowTaskParams = serde_json::from_value(json!({"message": "Indexing", "secondsElapsedSoFar": 4})).unwrap();
		let b: SlowTaskParams = serde_json::from_value(json!({"message": "Indexing", "secondsElapsed": 4})).unwrap();
		let c: SlowTaskParams = serde_json::from_value(json!({"message": "Indexing"})).unwrap();
		assert_eq!(a.seconds_elapsed_so_far, Some(4));
		assert_eq!(a, b);
		assert_eq!(c.seconds_elapsed_so_far, None);
	}

	#[test]
	fn decorations_use_camel_case() {
		let params: DecorationsParams = serde_json::from_value(json!({
			"documentUri": "file:///a.scala",
			"options": [{
				"range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 4}},
				"hoverText": "Int",
				"renderOptions": {"after": {"contentText": ": Int"}}
			}]
		}))
		.unwrap();
		assert_eq!(params.document_uri.as_str(), "file:///a.scala");
		assert_eq!(params.options[0].hover_text.as_deref(), Some("Int"));
	}

	#[test]
	fn status_flags_are_optional() {
		let params: StatusParams = serde_json::from_value(json!({"text": "$(sync) Indexing"})).unwrap();
		assert_eq!(
			params,
			StatusParams {
				text: "$(sync) Indexing".into(),
				..StatusParams::default()
			}
		);
	}
}
