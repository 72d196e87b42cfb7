//! Dispatch of inbound server notifications.
//!
//! Notifications are decoded into [`ServerNotification`], a closed set of the kinds this client
//! understands. Anything else, including payloads that fail to decode, is logged and dropped: a
//! malformed or unknown message never ends the session.

use std::sync::Arc;

use lsp_types::notification::{LogMessage, Notification, ShowMessage};
use lsp_types::{Location, LogMessageParams, ShowMessageParams};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tether_rpc::AnyNotification;
use tracing::{debug, error, info, trace, warn};

use crate::decorations::{DecorationOutcome, DecorationSynchronizer};
use crate::host::{Host, MessageLevel};
use crate::protocol::{
	ClientCommandParams, DecorationTypeDidChange, DecorationsParams, ExecuteClientCommand, OpenFolderParams,
	PublishDecorations, StatusParams, StatusUpdate, client_commands,
};
use crate::status::StatusPresenter;

/// Inbound notifications understood by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
	/// Perform a client-side action.
	ExecuteClientCommand(ClientCommand),
	/// Update the status line.
	Status(StatusParams),
	/// Replace the decoration style.
	DecorationTypeChanged(JsonValue),
	/// Replace a document's decorations.
	DecorationsChanged(DecorationsParams),
	/// Append to the output log.
	LogMessage(LogMessageParams),
	/// Show a transient message.
	ShowMessage(ShowMessageParams),
	/// A method this client does not handle.
	Unrecognized {
		/// The method name.
		method: String,
	},
}

/// Sub-kinds of `tether/executeClientCommand`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
	/// Reveal a location.
	GotoLocation(Location),
	/// Refresh views that depend on server state.
	RefreshViews,
	/// Open a folder.
	OpenFolder(OpenFolderParams),
	/// Focus the diagnostics panel.
	FocusDiagnostics,
	/// Show a rendered report.
	ShowReport(String),
	/// Run a host command.
	Echo {
		/// Host command id.
		command: String,
		/// Remaining arguments.
		arguments: Vec<JsonValue>,
	},
	/// A sub-kind this client does not handle, or one whose arguments did not decode.
	Unrecognized {
		/// The sub-kind.
		command: String,
	},
}

/// A notification payload failed to decode.
#[derive(Debug)]
struct Malformed {
	method: String,
	error: serde_json::Error,
}

impl ServerNotification {
	/// Decode an inbound notification.
	///
	/// Payloads that fail to decode yield [`ServerNotification::Unrecognized`] after logging.
	pub fn decode(notif: AnyNotification) -> Self {
		match Self::try_decode(notif) {
			Ok(decoded) => decoded,
			Err(Malformed { method, error }) => {
				warn!(target: "tether::router", method = %method, error = %error, "Malformed notification payload");
				Self::Unrecognized { method }
			}
		}
	}

	fn try_decode(notif: AnyNotification) -> Result<Self, Malformed> {
		let AnyNotification { method, params } = notif;
		let decoded = match method.as_str() {
			ExecuteClientCommand::METHOD => Self::ExecuteClientCommand(ClientCommand::decode(params_of(&method, params)?)),
			StatusUpdate::METHOD => Self::Status(params_of(&method, params)?),
			DecorationTypeDidChange::METHOD => Self::DecorationTypeChanged(params),
			PublishDecorations::METHOD => Self::DecorationsChanged(params_of(&method, params)?),
			LogMessage::METHOD => Self::LogMessage(params_of(&method, params)?),
			ShowMessage::METHOD => Self::ShowMessage(params_of(&method, params)?),
			_ => Self::Unrecognized { method },
		};
		Ok(decoded)
	}
}

fn params_of<T: DeserializeOwned>(method: &str, params: JsonValue) -> Result<T, Malformed> {
	serde_json::from_value(params).map_err(|error| Malformed {
		method: method.to_owned(),
		error,
	})
}

impl ClientCommand {
	/// Decode the sub-kind and its arguments.
	pub fn decode(params: ClientCommandParams) -> Self {
		let ClientCommandParams { command, arguments } = params;
		let mut args = arguments.into_iter();
		let first = args.next();
		let decoded = match command.as_str() {
			client_commands::GOTO_LOCATION => first.and_then(|arg| serde_json::from_value(arg).ok()).map(Self::GotoLocation),
			client_commands::MODEL_REFRESH => Some(Self::RefreshViews),
			client_commands::OPEN_FOLDER => first.and_then(|arg| serde_json::from_value(arg).ok()).map(Self::OpenFolder),
			client_commands::DIAGNOSTICS_FOCUS => Some(Self::FocusDiagnostics),
			client_commands::DOCTOR_RUN => first.and_then(|arg| arg.as_str().map(str::to_owned)).map(Self::ShowReport),
			client_commands::ECHO_COMMAND => first.and_then(|arg| arg.as_str().map(str::to_owned)).map(|id| Self::Echo {
				command: id,
				arguments: args.collect(),
			}),
			_ => None,
		};
		decoded.unwrap_or(Self::Unrecognized { command })
	}
}

/// What the router did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
	/// Delivered to its handler.
	Handled,
	/// A decoration push for an inactive document was dropped.
	Stale,
	/// Unknown or malformed, logged and ignored.
	Ignored {
		/// Method, or `method:sub-kind` for client commands.
		kind: String,
	},
}

/// Delivers notifications to the component owning each kind.
pub struct NotificationRouter {
	host: Arc<dyn Host>,
	status: Arc<StatusPresenter>,
	decorations: Arc<DecorationSynchronizer>,
}

impl std::fmt::Debug for NotificationRouter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NotificationRouter").finish_non_exhaustive()
	}
}

impl NotificationRouter {
	/// Create a router over the session's components.
	pub fn new(host: Arc<dyn Host>, status: Arc<StatusPresenter>, decorations: Arc<DecorationSynchronizer>) -> Self {
		Self {
			host,
			status,
			decorations,
		}
	}

	/// Decode and deliver a raw notification.
	pub fn route(&self, notif: AnyNotification) -> RouteOutcome {
		trace!(target: "tether::router", method = %notif.method, "Inbound notification");
		self.dispatch(ServerNotification::decode(notif))
	}

	/// Deliver a decoded notification.
	pub fn dispatch(&self, notification: ServerNotification) -> RouteOutcome {
		match notification {
			ServerNotification::ExecuteClientCommand(command) => self.client_command(command),
			ServerNotification::Status(params) => {
				self.status.update(&params);
				RouteOutcome::Handled
			}
			ServerNotification::DecorationTypeChanged(options) => {
				self.decorations.on_type_changed(&options);
				RouteOutcome::Handled
			}
			ServerNotification::DecorationsChanged(params) => match self.decorations.on_decorations(params) {
				DecorationOutcome::Rendered { .. } => RouteOutcome::Handled,
				DecorationOutcome::Stale { .. } => RouteOutcome::Stale,
			},
			ServerNotification::LogMessage(params) => {
				log_server_message(&params);
				self.host.append_log(&params.message);
				RouteOutcome::Handled
			}
			ServerNotification::ShowMessage(params) => {
				self.host.show_message(params.typ.into(), &params.message);
				RouteOutcome::Handled
			}
			ServerNotification::Unrecognized { method } => {
				debug!(target: "tether::router", method = %method, "Ignoring unrecognized notification");
				RouteOutcome::Ignored { kind: method }
			}
		}
	}

	fn client_command(&self, command: ClientCommand) -> RouteOutcome {
		match command {
			ClientCommand::GotoLocation(location) => self.host.open_location(&location),
			ClientCommand::RefreshViews => self.host.refresh_views(),
			ClientCommand::OpenFolder(params) => self.host.open_folder(&params.uri, params.new_window),
			ClientCommand::FocusDiagnostics => self.host.show_diagnostics_panel(),
			ClientCommand::ShowReport(content) => self.host.show_report(&content),
			ClientCommand::Echo { command, arguments } => self.host.execute_host_command(&command, arguments),
			ClientCommand::Unrecognized { command } => {
				debug!(target: "tether::router", command = %command, "Ignoring unrecognized client command");
				return RouteOutcome::Ignored {
					kind: format!("{}:{command}", ExecuteClientCommand::METHOD),
				};
			}
		}
		RouteOutcome::Handled
	}
}

fn log_server_message(params: &LogMessageParams) {
	match MessageLevel::from(params.typ) {
		MessageLevel::Error => error!(target: "tether::server", "{}", params.message),
		MessageLevel::Warning => warn!(target: "tether::server", "{}", params.message),
		MessageLevel::Info => info!(target: "tether::server", "{}", params.message),
		MessageLevel::Log => debug!(target: "tether::server", "{}", params.message),
	}
}

#[cfg(test)]
mod tests;
