//! Command dispatch to the server.
//!
//! Commands never compute anything locally: invoking one sends `workspace/executeCommand` and
//! resolves with whatever the server answers. Commands named by the server (for example as the
//! action of a status push) are bound lazily through [`CommandDispatcher::bind_if_absent`].

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use lsp_types::ExecuteCommandParams;
use lsp_types::request::ExecuteCommand;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tether_rpc::PeerSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::host::{CommandHandler, Host, MessageLevel};
use crate::session::{SessionState, wait_ready};
use crate::{Error, Result};

/// Server commands exposed to the user from the start of every session.
pub const STATIC_COMMANDS: &[&str] = &[
	"build-import",
	"build-connect",
	"build-restart",
	"sources-scan",
	"doctor-run",
	"cascade-compile",
	"cancel-compilation",
];

/// Forwards commands to the server and owns the set of bindings made for this session.
pub struct CommandDispatcher {
	socket: PeerSocket,
	host: Arc<dyn Host>,
	state: watch::Receiver<SessionState>,
	runtime: Handle,
	/// Ids registered with the host by this dispatcher.
	bound: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for CommandDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommandDispatcher")
			.field("bound", &*self.bound.lock())
			.finish_non_exhaustive()
	}
}

impl CommandDispatcher {
	/// Create a dispatcher. Must be called within a Tokio runtime.
	pub fn new(socket: PeerSocket, host: Arc<dyn Host>, state: watch::Receiver<SessionState>) -> Self {
		Self {
			socket,
			host,
			state,
			runtime: Handle::current(),
			bound: Mutex::new(BTreeSet::new()),
		}
	}

	/// Execute `command` on the server.
	///
	/// Waits for the session handshake first; fails with [`Error::NotReady`] if the session stops
	/// before becoming ready.
	pub async fn invoke(&self, command: &str, arguments: Vec<JsonValue>) -> Result<JsonValue> {
		wait_ready(self.state.clone()).await?;
		debug!(target: "tether::commands", command, "Executing server command");
		let params = ExecuteCommandParams {
			command: command.to_owned(),
			arguments,
			work_done_progress_params: Default::default(),
		};
		let result = self
			.socket
			.request::<ExecuteCommand>(params)
			.await
			.map_err(|source| Error::RequestFailure {
				command: command.to_owned(),
				source,
			})?;
		Ok(result.unwrap_or(JsonValue::Null))
	}

	/// [`invoke`](Self::invoke), reporting failures to the user instead of returning them.
	pub async fn invoke_reporting(&self, command: &str, arguments: Vec<JsonValue>) -> Option<JsonValue> {
		match self.invoke(command, arguments).await {
			Ok(value) => Some(value),
			Err(err) => {
				warn!(target: "tether::commands", command, error = %err, "Server command failed");
				self.host.show_message(MessageLevel::Error, &err.to_string());
				None
			}
		}
	}

	/// Bind `command` to a host command forwarding to the server, unless already bound.
	///
	/// Returns `true` only for the call that performed the registration. Repeated ids, and ids
	/// the host already knows, are absorbed silently.
	pub fn bind_if_absent(self: &Arc<Self>, command: &str) -> bool {
		let handler = forwarding_handler(Arc::downgrade(self), command.to_owned());
		let bound = self.bind(command, handler);
		if bound {
			debug!(target: "tether::commands", command, "Bound server command");
		}
		bound
	}

	/// Register a host command that runs locally instead of forwarding.
	pub(crate) fn bind_local(&self, command: &str, handler: CommandHandler) -> bool {
		self.bind(command, handler)
	}

	fn bind(&self, command: &str, handler: CommandHandler) -> bool {
		// Reserved before the host is consulted; concurrent callers see the id as taken.
		if !self.bound.lock().insert(command.to_owned()) {
			return false;
		}
		if self.host.has_command(command) || !self.host.register_command(command, handler) {
			debug!(target: "tether::commands", command, "Command already registered by host");
			self.bound.lock().remove(command);
			return false;
		}
		true
	}

	/// Whether `command` was bound by this dispatcher.
	pub fn is_bound(&self, command: &str) -> bool {
		self.bound.lock().contains(command)
	}

	/// Remove every binding made by this dispatcher from the host.
	pub(crate) fn unbind_all(&self) {
		let bound = std::mem::take(&mut *self.bound.lock());
		for command in &bound {
			self.host.unregister_command(command);
		}
	}
}

fn forwarding_handler(dispatcher: Weak<CommandDispatcher>, command: String) -> CommandHandler {
	Arc::new(move |arguments: Vec<JsonValue>| {
		let Some(dispatcher) = dispatcher.upgrade() else {
			debug!(target: "tether::commands", command = %command, "Command invoked after session ended");
			return;
		};
		let command = command.clone();
		dispatcher.runtime.clone().spawn(async move {
			dispatcher.invoke_reporting(&command, arguments).await;
		});
	})
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;
	use crate::testing::{FakeServer, RecordingHost};

	#[tokio::test]
	async fn binding_twice_registers_once() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		let (_tx, rx) = watch::channel(SessionState::Ready);
		let dispatcher = Arc::new(CommandDispatcher::new(server.socket(), host.clone(), rx));

		assert!(dispatcher.bind_if_absent("doctor-run"));
		assert!(!dispatcher.bind_if_absent("doctor-run"));
		assert_eq!(host.registration_count("doctor-run"), 1);

		host.run_command("doctor-run", vec![]);
		server.wait_for_commands(1).await;
		assert_eq!(server.executed_commands(), vec![("doctor-run".to_owned(), vec![])]);
	}

	#[tokio::test]
	async fn host_owned_command_is_not_rebound() {
		let host = RecordingHost::new();
		host.register_command("doctor-run", Arc::new(|_: Vec<JsonValue>| {}));
		let server = FakeServer::start();
		let (_tx, rx) = watch::channel(SessionState::Ready);
		let dispatcher = Arc::new(CommandDispatcher::new(server.socket(), host.clone(), rx));

		assert!(!dispatcher.bind_if_absent("doctor-run"));
		assert_eq!(host.registration_count("doctor-run"), 1);
	}

	#[tokio::test]
	async fn invoke_forwards_arguments_and_result() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		server.set_command_result(json!({"ok": true}));
		let (_tx, rx) = watch::channel(SessionState::Ready);
		let dispatcher = CommandDispatcher::new(server.socket(), host, rx);

		let result = dispatcher.invoke("sources-scan", vec![json!("a")]).await.unwrap();
		assert_eq!(result, json!({"ok": true}));
		assert_eq!(server.executed_commands(), vec![("sources-scan".to_owned(), vec![json!("a")])]);
	}

	#[tokio::test]
	async fn invoke_waits_for_ready() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		let (tx, rx) = watch::channel(SessionState::Starting);
		let dispatcher = Arc::new(CommandDispatcher::new(server.socket(), host, rx));

		let pending = tokio::spawn({
			let dispatcher = dispatcher.clone();
			async move { dispatcher.invoke("build-import", vec![]).await }
		});
		tokio::task::yield_now().await;
		assert!(server.executed_commands().is_empty());

		tx.send(SessionState::Ready).unwrap();
		pending.await.unwrap().unwrap();
		assert_eq!(server.executed_commands().len(), 1);
	}

	#[tokio::test]
	async fn invoke_fails_when_session_stops_first() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		let (tx, rx) = watch::channel(SessionState::Starting);
		let dispatcher = CommandDispatcher::new(server.socket(), host, rx);

		tx.send(SessionState::Stopped).unwrap();
		assert!(matches!(dispatcher.invoke("build-import", vec![]).await, Err(Error::NotReady)));
	}

	#[tokio::test]
	async fn failures_are_reported_not_propagated() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		server.fail_commands("compilation failed");
		let (_tx, rx) = watch::channel(SessionState::Ready);
		let dispatcher = CommandDispatcher::new(server.socket(), host.clone(), rx);

		assert_eq!(dispatcher.invoke_reporting("cascade-compile", vec![]).await, None);
		let messages = host.messages();
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].0, MessageLevel::Error);
		assert!(messages[0].1.contains("cascade-compile"));
	}

	#[tokio::test]
	async fn unbind_all_unregisters_from_host() {
		let host = RecordingHost::new();
		let server = FakeServer::start();
		let (_tx, rx) = watch::channel(SessionState::Ready);
		let dispatcher = Arc::new(CommandDispatcher::new(server.socket(), host.clone(), rx));

		dispatcher.bind_if_absent("build-import");
		dispatcher.unbind_all();
		assert!(!host.has_command("build-import"));
		assert!(!dispatcher.is_bound("build-import"));
		assert!(dispatcher.bind_if_absent("build-import"));
	}
}
