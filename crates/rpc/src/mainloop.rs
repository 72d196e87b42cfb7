//! Connection main loop.

use std::collections::HashMap;
use std::ops::ControlFlow;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinSet, Id as TaskId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::message::{Message, read_frame};
use crate::socket::{MainLoopEvent, PeerSocket};
use crate::types::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, RequestId, ResponseError};
use crate::{CANCEL_REQUEST_METHOD, Error, Result};

/// Handler for messages initiated by the peer.
pub trait RpcService: Send + 'static {
	/// Handle an inbound request.
	///
	/// The returned future runs concurrently with other requests. `cancel` fires when the peer
	/// sends `$/cancelRequest` for this request or the loop stops; the future must still resolve,
	/// and its output is the single response written for the request.
	fn call(&mut self, req: AnyRequest, cancel: CancellationToken) -> BoxFuture<'static, Result<JsonValue, ResponseError>>;

	/// Handle an inbound notification.
	///
	/// Notifications are delivered synchronously in arrival order. Breaking stops the loop.
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>>;
}

#[derive(Deserialize)]
struct CancelParams {
	id: RequestId,
}

struct OutgoingMessage {
	message: Message,
	barrier: Option<oneshot::Sender<()>>,
}

/// Main loop driving one connection.
pub struct MainLoop<S: RpcService> {
	service: S,
	rx: mpsc::UnboundedReceiver<MainLoopEvent>,
	/// Outgoing requests awaiting a response.
	outgoing: HashMap<RequestId, oneshot::Sender<AnyResponse>>,
	/// Inbound requests in flight.
	tasks: JoinSet<AnyResponse>,
	/// Request id and cancellation token per in-flight task.
	inflight: HashMap<TaskId, (RequestId, CancellationToken)>,
}

impl<S: RpcService> MainLoop<S> {
	/// Create a main loop; `builder` receives a socket usable from inside the service.
	#[must_use]
	pub fn new(builder: impl FnOnce(PeerSocket) -> S) -> (Self, PeerSocket) {
		let (tx, rx) = mpsc::unbounded_channel();
		let socket = PeerSocket::new(tx);
		let this = Self {
			service: builder(socket.clone()),
			rx,
			outgoing: HashMap::new(),
			tasks: JoinSet::new(),
			inflight: HashMap::new(),
		};
		(this, socket)
	}

	/// Get a reference to the inner service.
	#[must_use]
	pub fn get_ref(&self) -> &S {
		&self.service
	}

	/// Drive the connection until the peer disconnects, every socket is dropped, or a
	/// notification handler breaks.
	///
	/// # Errors
	///
	/// - `Error::Eof` when the peer closes its output.
	/// - `Error::Io` when reading or writing fails.
	/// - `Error::Protocol` when the framing is broken. Well-framed messages that fail to decode
	///   are logged and skipped.
	/// - Errors produced by breaking notification handlers.
	pub async fn run(
		mut self,
		input: impl AsyncBufRead + Unpin + Send + 'static,
		mut output: impl AsyncWrite + Unpin,
	) -> Result<()> {
		// Reading in a dedicated task keeps partially read frames safe from `select!` cancellation.
		let (inbound_tx, mut inbound_rx) = mpsc::channel::<Result<Message>>(64);
		let _reader = AbortOnDrop(tokio::spawn(read_loop(input, inbound_tx)));

		let ret = loop {
			let ctl = tokio::select! {
				biased;

				joined = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
					ControlFlow::Continue(self.complete_task(joined))
				}

				event = self.rx.recv() => match event {
					Some(event) => self.dispatch_event(event),
					None => break Ok(()),
				},

				msg = inbound_rx.recv() => match msg {
					Some(Ok(msg)) => self.dispatch_message(msg),
					Some(Err(err)) => break Err(err),
					None => break Err(Error::Eof),
				},
			};

			let msg = match ctl {
				ControlFlow::Continue(Some(msg)) => msg,
				ControlFlow::Continue(None) => continue,
				ControlFlow::Break(ret) => break ret,
			};

			if let Err(err) = msg.message.write(&mut output).await {
				error!(target: "tether::rpc", error = %err, "Outbound write failed; stopping main loop");
				break Err(err);
			}
			if let Some(barrier) = msg.barrier {
				let _ = barrier.send(());
			}
		};

		for (_, (_, token)) in self.inflight.drain() {
			token.cancel();
		}
		self.tasks.abort_all();
		// Dropping the senders fails every pending outgoing request with `ServiceStopped`.
		self.outgoing.clear();
		let _ = output.shutdown().await;
		ret
	}

	fn complete_task(
		&mut self,
		joined: Option<std::result::Result<(TaskId, AnyResponse), tokio::task::JoinError>>,
	) -> Option<OutgoingMessage> {
		let resp = match joined? {
			Ok((task_id, resp)) => {
				self.inflight.remove(&task_id);
				resp
			}
			Err(err) => {
				let (id, _) = self.inflight.remove(&err.id())?;
				error!(target: "tether::rpc", request_id = %id, error = %err, "Request handler panicked");
				AnyResponse::new(id, Err(ResponseError::new(ErrorCode::INTERNAL_ERROR, "request handler failed")))
			}
		};
		Some(OutgoingMessage {
			message: Message::Response(resp),
			barrier: None,
		})
	}

	fn dispatch_message(&mut self, msg: Message) -> ControlFlow<Result<()>, Option<OutgoingMessage>> {
		match msg {
			Message::Request(req) => {
				trace!(target: "tether::rpc", id = %req.id, method = %req.method, "Inbound request");
				let token = CancellationToken::new();
				let id = req.id.clone();
				let fut = self.service.call(req, token.clone());
				let resp_id = id.clone();
				let handle = self.tasks.spawn(async move { AnyResponse::new(resp_id, fut.await) });
				self.inflight.insert(handle.id(), (id, token));
			}
			Message::Response(resp) => match self.outgoing.remove(&resp.id) {
				Some(resp_tx) => {
					let _ = resp_tx.send(resp);
				}
				None => warn!(target: "tether::rpc", id = %resp.id, "Response for unknown request"),
			},
			Message::Notification(notif) if notif.method == CANCEL_REQUEST_METHOD => {
				self.cancel_inbound(notif.params);
			}
			Message::Notification(notif) => {
				trace!(target: "tether::rpc", method = %notif.method, "Inbound notification");
				self.service.notify(notif)?;
			}
		}
		ControlFlow::Continue(None)
	}

	fn cancel_inbound(&mut self, params: JsonValue) {
		let Ok(CancelParams { id }) = serde_json::from_value(params) else {
			warn!(target: "tether::rpc", "Malformed $/cancelRequest");
			return;
		};
		match self.inflight.values().find(|(req_id, _)| *req_id == id) {
			Some((_, token)) => {
				debug!(target: "tether::rpc", id = %id, "Peer cancelled request");
				token.cancel();
			}
			None => debug!(target: "tether::rpc", id = %id, "Cancel for request not in flight"),
		}
	}

	fn dispatch_event(&mut self, event: MainLoopEvent) -> ControlFlow<Result<()>, Option<OutgoingMessage>> {
		match event {
			MainLoopEvent::OutgoingRequest(req, resp_tx) => {
				self.outgoing.insert(req.id.clone(), resp_tx);
				ControlFlow::Continue(Some(OutgoingMessage {
					message: Message::Request(req),
					barrier: None,
				}))
			}
			MainLoopEvent::CancelOutgoing(id) => {
				// Already answered requests need no cancellation.
				if self.outgoing.remove(&id).is_none() {
					return ControlFlow::Continue(None);
				}
				debug!(target: "tether::rpc", id = %id, "Cancelling outgoing request");
				let params = serde_json::json!({ "id": id });
				ControlFlow::Continue(Some(OutgoingMessage {
					message: Message::Notification(AnyNotification {
						method: CANCEL_REQUEST_METHOD.into(),
						params,
					}),
					barrier: None,
				}))
			}
			MainLoopEvent::Outgoing(message) => ControlFlow::Continue(Some(OutgoingMessage { message, barrier: None })),
			MainLoopEvent::OutgoingWithBarrier(message, barrier) => ControlFlow::Continue(Some(OutgoingMessage {
				message,
				barrier: Some(barrier),
			})),
		}
	}
}

/// Aborts the reader when `run` returns or its future is dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		self.0.abort();
	}
}

/// Forward inbound messages until the stream or its framing breaks.
///
/// A frame that is delimited correctly but does not decode is dropped with a warning.
async fn read_loop(mut input: impl AsyncBufRead + Unpin, tx: mpsc::Sender<Result<Message>>) {
	loop {
		let body = match read_frame(&mut input).await {
			Ok(body) => body,
			Err(err) => {
				let _ = tx.send(Err(err)).await;
				break;
			}
		};
		let msg = match Message::decode(&body) {
			Ok(msg) => msg,
			Err(Error::Response(err)) => {
				warn!(target: "tether::rpc", code = %err.code, message = %err.message, "Peer reported an error without a request id");
				continue;
			}
			Err(err) => {
				warn!(target: "tether::rpc", error = %err, len = body.len(), "Dropping undecodable message");
				continue;
			}
		};
		if tx.send(Ok(msg)).await.is_err() {
			break;
		}
	}
}
