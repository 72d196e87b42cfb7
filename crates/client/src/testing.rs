//! Test doubles: a host that records every call and a scripted server.

use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use lsp_types::{Location, Uri};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tether_rpc::{AnyNotification, AnyRequest, CancellationToken, ErrorCode, MainLoop, PeerSocket, ResponseError, RpcService};
use tokio::io::{BufReader, duplex};
use tokio::task::JoinHandle;

use crate::host::{CommandHandler, DecorationStyleId, Host, MessageLevel, ProgressReporter};
use crate::protocol::{DecorationOptions, InputBoxParams};
use crate::session::Connection;
use crate::status::StatusState;

/// Poll `cond` until it holds, failing the test after a generous bound.
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) {
	for _ in 0..1000 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached");
}

/// Navigation and panel calls made on the host, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostCall {
	OpenLocation(Location),
	RefreshViews,
	OpenFolder(Uri, bool),
	ShowDiagnostics,
	ShowReport(String),
	ExecuteHostCommand(String, Vec<JsonValue>),
	ToggleLogPanel,
	OpenSettings,
}

struct ProgressRecord {
	title: String,
	cancel: Option<CancellationToken>,
	reports: Arc<Mutex<Vec<String>>>,
	finished: Arc<AtomicUsize>,
}

struct RecordedProgress {
	reports: Arc<Mutex<Vec<String>>>,
	finished: Arc<AtomicUsize>,
}

impl ProgressReporter for RecordedProgress {
	fn report(&self, message: &str) {
		self.reports.lock().push(message.to_owned());
	}

	fn finish(&self) {
		self.finished.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Default)]
struct HostState {
	commands: HashMap<String, CommandHandler>,
	registrations: HashMap<String, usize>,
	statuses: Vec<StatusState>,
	progress: Vec<ProgressRecord>,
	styles: Vec<JsonValue>,
	rendered: Vec<(DecorationStyleId, Uri, Vec<DecorationOptions>)>,
	active: Option<Uri>,
	messages: Vec<(MessageLevel, String)>,
	action_prompts: Vec<(String, Vec<String>)>,
	action_replies: VecDeque<Option<String>>,
	input_prompts: Vec<InputBoxParams>,
	input_replies: VecDeque<Option<String>>,
	log_lines: Vec<String>,
	calls: Vec<HostCall>,
}

/// [`Host`] recording everything it is asked to do.
#[derive(Default)]
pub(crate) struct RecordingHost {
	state: Mutex<HostState>,
}

impl RecordingHost {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn registration_count(&self, id: &str) -> usize {
		self.state.lock().registrations.get(id).copied().unwrap_or(0)
	}

	/// Invoke a registered command the way a user would.
	pub(crate) fn run_command(&self, id: &str, args: Vec<JsonValue>) {
		let handler = self.state.lock().commands.get(id).cloned();
		let handler = handler.unwrap_or_else(|| panic!("command {id} not registered"));
		handler(args);
	}

	pub(crate) fn statuses(&self) -> Vec<StatusState> {
		self.state.lock().statuses.clone()
	}

	pub(crate) fn progress_titles(&self) -> Vec<String> {
		self.state.lock().progress.iter().map(|p| p.title.clone()).collect()
	}

	fn with_progress<T>(&self, title: &str, f: impl FnOnce(&ProgressRecord) -> T) -> T {
		let state = self.state.lock();
		let record = state
			.progress
			.iter()
			.rev()
			.find(|p| p.title == title)
			.unwrap_or_else(|| panic!("no progress titled {title}"));
		f(record)
	}

	pub(crate) fn progress_reports(&self, title: &str) -> Vec<String> {
		self.with_progress(title, |p| p.reports.lock().clone())
	}

	pub(crate) fn progress_finish_count(&self, title: &str) -> usize {
		self.with_progress(title, |p| p.finished.load(Ordering::SeqCst))
	}

	pub(crate) fn progress_finished(&self, title: &str) -> bool {
		self.progress_finish_count(title) > 0
	}

	pub(crate) fn progress_cancellable(&self, title: &str) -> bool {
		self.with_progress(title, |p| p.cancel.is_some())
	}

	/// Dismiss a progress indicator the way a user would.
	pub(crate) fn cancel_progress(&self, title: &str) {
		let token = self.with_progress(title, |p| p.cancel.clone());
		token.unwrap_or_else(|| panic!("progress {title} is not cancellable")).cancel();
	}

	pub(crate) fn set_active_document(&self, uri: Option<Uri>) {
		self.state.lock().active = uri;
	}

	pub(crate) fn rendered_decorations(&self) -> Vec<(DecorationStyleId, Uri, Vec<DecorationOptions>)> {
		self.state.lock().rendered.clone()
	}

	pub(crate) fn created_styles(&self) -> Vec<JsonValue> {
		self.state.lock().styles.clone()
	}

	pub(crate) fn messages(&self) -> Vec<(MessageLevel, String)> {
		self.state.lock().messages.clone()
	}

	pub(crate) fn push_action_reply(&self, reply: Option<&str>) {
		self.state.lock().action_replies.push_back(reply.map(str::to_owned));
	}

	pub(crate) fn action_prompts(&self) -> Vec<(String, Vec<String>)> {
		self.state.lock().action_prompts.clone()
	}

	pub(crate) fn push_input_reply(&self, reply: Option<&str>) {
		self.state.lock().input_replies.push_back(reply.map(str::to_owned));
	}

	pub(crate) fn input_prompts(&self) -> Vec<InputBoxParams> {
		self.state.lock().input_prompts.clone()
	}

	pub(crate) fn log_lines(&self) -> Vec<String> {
		self.state.lock().log_lines.clone()
	}

	pub(crate) fn calls(&self) -> Vec<HostCall> {
		self.state.lock().calls.clone()
	}

	fn record(&self, call: HostCall) {
		self.state.lock().calls.push(call);
	}
}

#[async_trait]
impl Host for RecordingHost {
	fn has_command(&self, id: &str) -> bool {
		self.state.lock().commands.contains_key(id)
	}

	fn register_command(&self, id: &str, handler: CommandHandler) -> bool {
		let mut state = self.state.lock();
		if state.commands.contains_key(id) {
			return false;
		}
		state.commands.insert(id.to_owned(), handler);
		*state.registrations.entry(id.to_owned()).or_default() += 1;
		true
	}

	fn unregister_command(&self, id: &str) {
		self.state.lock().commands.remove(id);
	}

	fn execute_host_command(&self, id: &str, args: Vec<JsonValue>) {
		self.record(HostCall::ExecuteHostCommand(id.to_owned(), args));
	}

	fn update_status(&self, status: &StatusState) {
		self.state.lock().statuses.push(status.clone());
	}

	fn begin_progress(&self, title: &str, cancel: Option<CancellationToken>) -> Box<dyn ProgressReporter> {
		let reports = Arc::new(Mutex::new(Vec::new()));
		let finished = Arc::new(AtomicUsize::new(0));
		self.state.lock().progress.push(ProgressRecord {
			title: title.to_owned(),
			cancel,
			reports: reports.clone(),
			finished: finished.clone(),
		});
		Box::new(RecordedProgress { reports, finished })
	}

	fn create_decoration_style(&self, options: &JsonValue) -> DecorationStyleId {
		let mut state = self.state.lock();
		state.styles.push(options.clone());
		DecorationStyleId(state.styles.len() as u64)
	}

	fn render_decorations(&self, style: DecorationStyleId, uri: &Uri, decorations: &[DecorationOptions]) {
		self.state.lock().rendered.push((style, uri.clone(), decorations.to_vec()));
	}

	fn active_document(&self) -> Option<Uri> {
		self.state.lock().active.clone()
	}

	fn show_message(&self, level: MessageLevel, message: &str) {
		self.state.lock().messages.push((level, message.to_owned()));
	}

	async fn show_message_with_actions(&self, _level: MessageLevel, message: &str, actions: &[String]) -> Option<String> {
		let mut state = self.state.lock();
		state.action_prompts.push((message.to_owned(), actions.to_vec()));
		state.action_replies.pop_front().flatten()
	}

	fn append_log(&self, line: &str) {
		self.state.lock().log_lines.push(line.to_owned());
	}

	fn toggle_log_panel(&self) {
		self.record(HostCall::ToggleLogPanel);
	}

	fn open_settings(&self) {
		self.record(HostCall::OpenSettings);
	}

	fn open_location(&self, location: &Location) {
		self.record(HostCall::OpenLocation(location.clone()));
	}

	fn open_folder(&self, uri: &Uri, new_window: bool) {
		self.record(HostCall::OpenFolder(uri.clone(), new_window));
	}

	fn refresh_views(&self) {
		self.record(HostCall::RefreshViews);
	}

	fn show_diagnostics_panel(&self) {
		self.record(HostCall::ShowDiagnostics);
	}

	fn show_report(&self, content: &str) {
		self.record(HostCall::ShowReport(content.to_owned()));
	}

	/// Answers from the queued replies; waits forever once they run out.
	async fn input_box(&self, params: InputBoxParams) -> Option<String> {
		let reply = {
			let mut state = self.state.lock();
			state.input_prompts.push(params);
			state.input_replies.pop_front()
		};
		match reply {
			Some(reply) => reply,
			None => std::future::pending().await,
		}
	}
}

/// How the fake server answers `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitBehavior {
	Accept,
	Reject,
	Hang,
}

struct ServerState {
	init: Mutex<InitBehavior>,
	initialize_params: Mutex<Option<JsonValue>>,
	command_result: Mutex<Result<JsonValue, String>>,
	executed: Mutex<Vec<(String, Vec<JsonValue>)>>,
	notifications: Mutex<Vec<AnyNotification>>,
	shutdown: AtomicUsize,
	exit: AtomicUsize,
}

struct ServerService {
	state: Arc<ServerState>,
}

impl RpcService for ServerService {
	fn call(&mut self, req: AnyRequest, _cancel: CancellationToken) -> BoxFuture<'static, Result<JsonValue, ResponseError>> {
		let state = self.state.clone();
		Box::pin(async move {
			match req.method.as_str() {
				"initialize" => {
					*state.initialize_params.lock() = Some(req.params);
					let behavior = *state.init.lock();
					match behavior {
						InitBehavior::Accept => Ok(json!({"capabilities": {}, "serverInfo": {"name": "fake"}})),
						InitBehavior::Reject => Err(ResponseError::new(ErrorCode::INTERNAL_ERROR, "workspace not supported")),
						InitBehavior::Hang => std::future::pending().await,
					}
				}
				"workspace/executeCommand" => {
					let command = req.params["command"].as_str().unwrap_or_default().to_owned();
					let arguments = req.params["arguments"].as_array().cloned().unwrap_or_default();
					state.executed.lock().push((command, arguments));
					let result = state.command_result.lock().clone();
					result.map_err(|message| ResponseError::new(ErrorCode::REQUEST_FAILED, message))
				}
				"shutdown" => {
					state.shutdown.fetch_add(1, Ordering::SeqCst);
					Ok(JsonValue::Null)
				}
				method => Err(ResponseError::new(ErrorCode::METHOD_NOT_FOUND, method)),
			}
		})
	}

	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<tether_rpc::Result<()>> {
		let exit = notif.method == "exit";
		self.state.notifications.lock().push(notif);
		if exit {
			self.state.exit.fetch_add(1, Ordering::SeqCst);
			return ControlFlow::Break(Ok(()));
		}
		ControlFlow::Continue(())
	}
}

/// Client side of [`FakeServer::start`], which answers nothing.
struct NullService;

impl RpcService for NullService {
	fn call(&mut self, req: AnyRequest, _cancel: CancellationToken) -> BoxFuture<'static, Result<JsonValue, ResponseError>> {
		Box::pin(std::future::ready(Err(ResponseError::new(ErrorCode::METHOD_NOT_FOUND, req.method))))
	}

	fn notify(&mut self, _notif: AnyNotification) -> ControlFlow<tether_rpc::Result<()>> {
		ControlFlow::Continue(())
	}
}

/// Scripted server built on the same main loop as the client.
pub(crate) struct FakeServer {
	state: Arc<ServerState>,
	peer: PeerSocket,
	client: Option<PeerSocket>,
	task: JoinHandle<()>,
}

impl FakeServer {
	/// A server paired with a bare client socket.
	pub(crate) fn start() -> Self {
		let (mut server, conn) = Self::spawn();
		let (main_loop, socket) = MainLoop::new(|_| NullService);
		let Connection { reader, writer, .. } = conn;
		tokio::spawn(async move {
			let _ = main_loop.run(reader, writer).await;
		});
		server.client = Some(socket);
		server
	}

	/// A server and the connection a session should use to reach it.
	pub(crate) fn spawn() -> (Self, Connection) {
		let (client_io, server_io) = duplex(64 * 1024);
		let (server_read, server_write) = tokio::io::split(server_io);
		let (client_read, client_write) = tokio::io::split(client_io);

		let state = Arc::new(ServerState {
			init: Mutex::new(InitBehavior::Accept),
			initialize_params: Mutex::new(None),
			command_result: Mutex::new(Ok(JsonValue::Null)),
			executed: Mutex::new(Vec::new()),
			notifications: Mutex::new(Vec::new()),
			shutdown: AtomicUsize::new(0),
			exit: AtomicUsize::new(0),
		});
		let (main_loop, peer) = MainLoop::new(|_| ServerService { state: state.clone() });
		let task = tokio::spawn(async move {
			let _ = main_loop.run(BufReader::new(server_read), server_write).await;
		});

		let server = Self {
			state,
			peer,
			client: None,
			task,
		};
		(server, Connection::from_io(client_read, client_write))
	}

	/// Socket of the bare client created by [`FakeServer::start`].
	pub(crate) fn socket(&self) -> PeerSocket {
		self.client.clone().unwrap_or_else(|| panic!("FakeServer::socket requires FakeServer::start"))
	}

	/// Socket for server-initiated requests and notifications.
	pub(crate) fn peer(&self) -> PeerSocket {
		self.peer.clone()
	}

	pub(crate) fn set_init(&self, behavior: InitBehavior) {
		*self.state.init.lock() = behavior;
	}

	pub(crate) fn initialize_params(&self) -> Option<JsonValue> {
		self.state.initialize_params.lock().clone()
	}

	pub(crate) fn set_command_result(&self, result: JsonValue) {
		*self.state.command_result.lock() = Ok(result);
	}

	pub(crate) fn fail_commands(&self, message: &str) {
		*self.state.command_result.lock() = Err(message.to_owned());
	}

	pub(crate) fn executed_commands(&self) -> Vec<(String, Vec<JsonValue>)> {
		self.state.executed.lock().clone()
	}

	pub(crate) async fn wait_for_commands(&self, count: usize) {
		eventually(|| self.state.executed.lock().len() >= count).await;
	}

	/// Methods of the notifications received so far.
	pub(crate) fn notification_methods(&self) -> Vec<String> {
		self.state.notifications.lock().iter().map(|n| n.method.clone()).collect()
	}

	pub(crate) fn notifications(&self, method: &str) -> Vec<JsonValue> {
		self.state
			.notifications
			.lock()
			.iter()
			.filter(|n| n.method == method)
			.map(|n| n.params.clone())
			.collect()
	}

	pub(crate) async fn wait_for_notification(&self, method: &str) {
		eventually(|| self.state.notifications.lock().iter().any(|n| n.method == method)).await;
	}

	pub(crate) fn shutdown_count(&self) -> usize {
		self.state.shutdown.load(Ordering::SeqCst)
	}

	pub(crate) fn received_exit(&self) -> bool {
		self.state.exit.load(Ordering::SeqCst) > 0
	}

	/// Drop the connection without the shutdown handshake.
	pub(crate) fn disconnect(&self) {
		self.task.abort();
	}

	pub(crate) async fn wait_for_exit(&self) {
		eventually(|| self.received_exit()).await;
	}
}
