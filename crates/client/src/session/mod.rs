//! Session lifecycle.
//!
//! A [`Session`] owns one server connection and the components fed by it. [`SessionManager`]
//! keeps at most one session alive per workspace.

mod manager;
mod service;
mod state;
mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lsp_types::notification::{DidChangeConfiguration, Exit, Initialized};
use lsp_types::request::{Initialize, Shutdown};
use lsp_types::{
	ClientCapabilities, ClientInfo, DidChangeConfigurationParams, InitializeParams, InitializeResult, InitializedParams,
	ShowMessageRequestClientCapabilities, Uri, WindowClientCapabilities, WorkspaceClientCapabilities, WorkspaceFolder,
};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tether_rpc::{MainLoop, PeerSocket};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use manager::SessionManager;
use service::{ClientService, Components};
pub(crate) use state::wait_ready;
pub use state::SessionState;
pub use transport::Connection;

use crate::commands::{CommandDispatcher, STATIC_COMMANDS};
use crate::config::ClientConfig;
use crate::decorations::DecorationSynchronizer;
use crate::host::{Host, MessageLevel};
use crate::protocol::{DidFocusTextDocument, InitializationOptions, WindowStateDidChange, WindowStateParams};
use crate::router::NotificationRouter;
use crate::settings::Settings;
use crate::slow_task::SlowTaskTracker;
use crate::status::{StatusPresenter, TOGGLE_LOGS_COMMAND};
use crate::{Error, Result, uri_from_path};

/// Upper bound for each step of the shutdown handshake and for the process to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Title of the indicator shown while connecting.
pub const STARTING_TITLE: &str = "Starting analysis server";

/// One live connection to the analysis server.
pub struct Session {
	config: ClientConfig,
	host: Arc<dyn Host>,
	/// Socket without a request timeout, for the handshake.
	socket: PeerSocket,
	components: Components,
	state: Arc<watch::Sender<SessionState>>,
	stopping: Arc<AtomicBool>,
	main_loop: Mutex<Option<JoinHandle<()>>>,
	child: Mutex<Option<Child>>,
	server_info: Mutex<Option<InitializeResult>>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("server", &self.config.server.command)
			.field("root_path", &self.config.root_path)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl Session {
	/// Spawn the configured server and complete the handshake.
	///
	/// An indeterminate progress indicator is shown until the session is ready or has failed.
	pub async fn start(config: ClientConfig, host: Arc<dyn Host>, settings: Arc<dyn Settings>) -> Result<Arc<Self>> {
		Self::start_with(config, host, settings, |config| Connection::spawn(&config.server, &config.root_path)).await
	}

	/// [`start`](Self::start) over a connection produced by `connect`.
	pub async fn start_with(
		config: ClientConfig,
		host: Arc<dyn Host>,
		settings: Arc<dyn Settings>,
		connect: impl FnOnce(&ClientConfig) -> Result<Connection>,
	) -> Result<Arc<Self>> {
		let progress = host.begin_progress(STARTING_TITLE, None);
		let result = match connect(&config) {
			Ok(conn) => Self::connect(config, host, settings, conn).await,
			Err(err) => Err(err),
		};
		progress.finish();
		if let Err(err) = &result {
			error!(target: "tether::session", error = %err, "Session failed to start");
		}
		result
	}

	/// Run the handshake over an established connection.
	pub async fn connect(
		config: ClientConfig,
		host: Arc<dyn Host>,
		settings: Arc<dyn Settings>,
		conn: Connection,
	) -> Result<Arc<Self>> {
		let (state_tx, state_rx) = watch::channel(SessionState::Starting);
		let state = Arc::new(state_tx);

		let (main_loop, socket) = MainLoop::new(|socket| {
			let socket = socket.with_timeout(config.request_timeout());
			let commands = Arc::new(CommandDispatcher::new(socket, host.clone(), state_rx));
			let status = Arc::new(StatusPresenter::new(host.clone(), commands.clone()));
			let decorations = Arc::new(DecorationSynchronizer::new(host.clone()));
			let router = Arc::new(NotificationRouter::new(host.clone(), status.clone(), decorations.clone()));
			ClientService::new(Components {
				host: host.clone(),
				settings: settings.clone(),
				settings_section: config.settings_section.clone(),
				commands,
				status,
				decorations,
				slow_tasks: Arc::new(SlowTaskTracker::new(host.clone(), config.completion_delay())),
				router,
			})
		});
		let components = main_loop.get_ref().components().clone();

		let Connection { reader, writer, child } = conn;
		let stopping = Arc::new(AtomicBool::new(false));
		let handle = tokio::spawn({
			let state = state.clone();
			let host = host.clone();
			let stopping = stopping.clone();
			async move {
				let result = main_loop.run(reader, writer).await;
				let previous = state.send_replace(SessionState::Stopped);
				if stopping.load(Ordering::Acquire) || previous != SessionState::Ready {
					debug!(target: "tether::session", "Main loop finished");
					return;
				}
				match result {
					Ok(()) => info!(target: "tether::session", "Server connection closed"),
					Err(err) => {
						error!(target: "tether::session", error = %err, "Server connection lost");
						host.show_message(MessageLevel::Error, &format!("Analysis server stopped: {err}"));
					}
				}
			}
		});

		let session = Arc::new(Self {
			config,
			host,
			socket,
			components,
			state,
			stopping,
			main_loop: Mutex::new(Some(handle)),
			child: Mutex::new(child),
			server_info: Mutex::new(None),
		});

		match session.initialize(settings.as_ref()).await {
			Ok(info) => {
				*session.server_info.lock() = Some(info);
				session.state.send_replace(SessionState::Ready);
				session.register_commands();
				info!(target: "tether::session", server = %session.config.server.command, "Session ready");
				Ok(session)
			}
			Err(reason) => {
				session.teardown().await;
				Err(Error::ConnectionFailure {
					server: session.config.server.command.clone(),
					reason,
				})
			}
		}
	}

	async fn initialize(&self, settings: &dyn Settings) -> std::result::Result<InitializeResult, String> {
		let params = self.initialize_params(settings).map_err(|e| e.to_string())?;
		let request = self.socket.request::<Initialize>(params);
		let result = match self.config.startup_timeout() {
			Some(limit) => tokio::time::timeout(limit, request)
				.await
				.map_err(|_| format!("no response to initialize within {}s", limit.as_secs()))?,
			None => request.await,
		}
		.map_err(|e| e.to_string())?;

		self.socket
			.notify_flushed::<Initialized>(InitializedParams {})
			.await
			.map_err(|e| e.to_string())?;
		Ok(result)
	}

	fn initialize_params(&self, settings: &dyn Settings) -> Result<InitializeParams> {
		let root_uri = uri_from_path(&self.config.root_path);
		let name = self
			.config
			.root_path
			.file_name()
			.map_or_else(|| "workspace".to_owned(), |n| n.to_string_lossy().into_owned());
		let options = InitializationOptions::with_settings(settings.snapshot());

		#[allow(deprecated, reason = "root_uri deprecated but still read by some servers")]
		let params = InitializeParams {
			process_id: Some(std::process::id()),
			root_uri: root_uri.clone(),
			workspace_folders: root_uri.map(|uri| vec![WorkspaceFolder { uri, name }]),
			initialization_options: Some(serde_json::to_value(options).map_err(tether_rpc::Error::from)?),
			capabilities: client_capabilities(),
			client_info: Some(ClientInfo {
				name: String::from("tether"),
				version: Some(String::from(env!("CARGO_PKG_VERSION"))),
			}),
			..InitializeParams::default()
		};
		Ok(params)
	}

	fn register_commands(&self) {
		let commands = &self.components.commands;
		for command in STATIC_COMMANDS {
			commands.bind_if_absent(command);
		}
		let host = Arc::downgrade(&self.host);
		commands.bind_local(
			TOGGLE_LOGS_COMMAND,
			Arc::new(move |_: Vec<JsonValue>| {
				if let Some(host) = host.upgrade() {
					host.toggle_log_panel();
				}
			}),
		);
	}

	/// Shut the server down and release everything the session registered.
	///
	/// Calling it again, or after the connection dropped, has no further effect.
	pub async fn stop(&self) {
		if self.stopping.swap(true, Ordering::AcqRel) {
			return;
		}
		if self.state() == SessionState::Ready {
			debug!(target: "tether::session", "Sending shutdown");
			match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.socket.request::<Shutdown>(())).await {
				Ok(Ok(())) => {}
				Ok(Err(err)) => warn!(target: "tether::session", error = %err, "Shutdown request failed"),
				Err(_) => warn!(target: "tether::session", "Shutdown request timed out"),
			}
			if let Ok(Err(err)) = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.socket.notify_flushed::<Exit>(())).await {
				debug!(target: "tether::session", error = %err, "Exit notification not delivered");
			}
		}
		self.teardown().await;
		info!(target: "tether::session", "Session stopped");
	}

	async fn teardown(&self) {
		self.stopping.store(true, Ordering::Release);
		self.state.send_replace(SessionState::Stopped);

		// No status push can bind a command once the loop is gone.
		let main_loop = self.main_loop.lock().take();
		if let Some(handle) = main_loop {
			handle.abort();
			let _ = handle.await;
		}
		self.components.commands.unbind_all();

		let child = self.child.lock().take();
		if let Some(mut child) = child
			&& tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await.is_err()
		{
			warn!(target: "tether::session", "Server did not exit; killing it");
			if let Err(err) = child.kill().await {
				warn!(target: "tether::session", error = %err, "Failed to kill server");
			}
		}
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SessionState {
		*self.state.borrow()
	}

	/// Subscribe to lifecycle changes.
	pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
		self.state.subscribe()
	}

	/// Wait until the handshake completed. Fails if the session stopped instead.
	pub async fn wait_ready(&self) -> Result<()> {
		wait_ready(self.subscribe_state()).await
	}

	/// Wait until the session has stopped for any reason.
	pub async fn closed(&self) {
		let mut state = self.subscribe_state();
		let _ = state.wait_for(|s| *s == SessionState::Stopped).await;
	}

	/// The configuration the session was started with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// The server's `initialize` result.
	pub fn server_info(&self) -> Option<InitializeResult> {
		self.server_info.lock().clone()
	}

	/// The command dispatcher.
	pub fn commands(&self) -> &Arc<CommandDispatcher> {
		&self.components.commands
	}

	/// The status presenter.
	pub fn status(&self) -> &Arc<StatusPresenter> {
		&self.components.status
	}

	/// The decoration synchronizer.
	pub fn decorations(&self) -> &Arc<DecorationSynchronizer> {
		&self.components.decorations
	}

	/// The slow-task tracker.
	pub fn slow_tasks(&self) -> &Arc<SlowTaskTracker> {
		&self.components.slow_tasks
	}

	/// Execute a server command. See [`CommandDispatcher::invoke`].
	pub async fn execute_command(&self, command: &str, arguments: Vec<JsonValue>) -> Result<JsonValue> {
		self.components.commands.invoke(command, arguments).await
	}

	/// Tell the server which document has focus.
	pub fn did_focus(&self, uri: Uri) -> Result<()> {
		self.ensure_ready()?;
		Ok(self.socket.notify::<DidFocusTextDocument>(uri)?)
	}

	/// Tell the server whether the editor window has focus.
	pub fn window_state_changed(&self, focused: bool) -> Result<()> {
		self.ensure_ready()?;
		Ok(self.socket.notify::<WindowStateDidChange>(WindowStateParams { focused })?)
	}

	/// Push the current settings to the server.
	pub fn did_change_configuration(&self) -> Result<()> {
		self.ensure_ready()?;
		let c = &self.components;
		let mut settings = serde_json::Map::new();
		settings.insert(c.settings_section.clone(), JsonValue::Object(c.settings.snapshot()));
		Ok(self.socket.notify::<DidChangeConfiguration>(DidChangeConfigurationParams {
			settings: JsonValue::Object(settings),
		})?)
	}

	fn ensure_ready(&self) -> Result<()> {
		match self.state() {
			SessionState::Ready => Ok(()),
			_ => Err(Error::NotReady),
		}
	}
}

fn client_capabilities() -> ClientCapabilities {
	ClientCapabilities {
		workspace: Some(WorkspaceClientCapabilities {
			configuration: Some(true),
			..WorkspaceClientCapabilities::default()
		}),
		window: Some(WindowClientCapabilities {
			work_done_progress: Some(true),
			show_message: Some(ShowMessageRequestClientCapabilities::default()),
			..WindowClientCapabilities::default()
		}),
		..ClientCapabilities::default()
	}
}
