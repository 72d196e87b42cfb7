//! Outbound handle to the main loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

use crate::message::Message;
use crate::types::{AnyNotification, AnyRequest, AnyResponse, RequestId};
use crate::{Error, Result};

/// Events delivered from sockets to the main loop.
pub(crate) enum MainLoopEvent {
	/// A request awaiting a response.
	OutgoingRequest(AnyRequest, oneshot::Sender<AnyResponse>),
	/// The caller gave up on a request; the peer is told to cancel it.
	CancelOutgoing(RequestId),
	/// A message to write as-is.
	Outgoing(Message),
	/// A message to write, acknowledged once flushed.
	OutgoingWithBarrier(Message, oneshot::Sender<()>),
}

/// Cloneable sender for requests and notifications to the peer.
///
/// Every clone feeds the same main loop, which is the only writer of the connection.
#[derive(Debug, Clone)]
pub struct PeerSocket {
	pub(crate) tx: mpsc::UnboundedSender<MainLoopEvent>,
	/// Id counter shared by every clone, starting at zero.
	next_id: Arc<AtomicI32>,
	/// Per-request timeout; `None` waits forever.
	timeout: Option<Duration>,
}

impl std::fmt::Debug for MainLoopEvent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::OutgoingRequest(req, _) => f.debug_tuple("OutgoingRequest").field(&req.method).finish(),
			Self::CancelOutgoing(id) => f.debug_tuple("CancelOutgoing").field(id).finish(),
			Self::Outgoing(msg) => f.debug_tuple("Outgoing").field(msg).finish(),
			Self::OutgoingWithBarrier(msg, _) => f.debug_tuple("OutgoingWithBarrier").field(msg).finish(),
		}
	}
}

impl PeerSocket {
	pub(crate) fn new(tx: mpsc::UnboundedSender<MainLoopEvent>) -> Self {
		Self {
			tx,
			next_id: Arc::new(AtomicI32::new(0)),
			timeout: None,
		}
	}

	/// Return a socket whose requests fail with [`Error::RequestTimeout`] after `timeout`.
	///
	/// A zero duration disables the timeout.
	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = (!timeout.is_zero()).then_some(timeout);
		self
	}

	/// Whether the main loop has stopped.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	/// Send a typed request and decode its result.
	pub async fn request<R: Request>(&self, params: R::Params) -> Result<R::Result> {
		let result = self.request_raw(R::METHOD, serde_json::to_value(params)?).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Send an untyped request.
	///
	/// Resolves with the peer's result, or [`Error::Response`] when it replied with an error. If
	/// the request times out or this future is dropped first, the peer receives
	/// `$/cancelRequest` for it.
	pub async fn request_raw(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
		let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
		let req = AnyRequest {
			id: id.clone(),
			method: method.into(),
			params,
		};
		let (tx, rx) = oneshot::channel();
		self.send(MainLoopEvent::OutgoingRequest(req, tx))?;
		let mut pending = PendingRequest { socket: self, id: Some(id) };
		let resp = match self.timeout {
			None => rx.await.map_err(|_| Error::ServiceStopped)?,
			Some(timeout) => match tokio::time::timeout(timeout, rx).await {
				Ok(resp) => resp.map_err(|_| Error::ServiceStopped)?,
				Err(_) => return Err(Error::RequestTimeout(method.into())),
			},
		};
		pending.id = None;
		match resp.error {
			None => Ok(resp.result.unwrap_or_default()),
			Some(err) => Err(Error::Response(err)),
		}
	}

	/// Send a typed notification.
	pub fn notify<N: Notification>(&self, params: N::Params) -> Result<()> {
		self.notify_raw(N::METHOD, serde_json::to_value(params)?)
	}

	/// Send an untyped notification.
	pub fn notify_raw(&self, method: &str, params: JsonValue) -> Result<()> {
		self.send(MainLoopEvent::Outgoing(Message::Notification(AnyNotification {
			method: method.into(),
			params,
		})))
	}

	/// Send a typed notification and wait until it has been written to the connection.
	pub async fn notify_flushed<N: Notification>(&self, params: N::Params) -> Result<()> {
		let (tx, rx) = oneshot::channel();
		let notif = AnyNotification {
			method: N::METHOD.into(),
			params: serde_json::to_value(params)?,
		};
		self.send(MainLoopEvent::OutgoingWithBarrier(Message::Notification(notif), tx))?;
		rx.await.map_err(|_| Error::ServiceStopped)
	}

	fn send(&self, event: MainLoopEvent) -> Result<()> {
		self.tx.send(event).map_err(|_| Error::ServiceStopped)
	}
}

/// Cancels an outgoing request on drop unless its response arrived.
struct PendingRequest<'a> {
	socket: &'a PeerSocket,
	id: Option<RequestId>,
}

impl Drop for PendingRequest<'_> {
	fn drop(&mut self) {
		if let Some(id) = self.id.take() {
			let _ = self.socket.send(MainLoopEvent::CancelOutgoing(id));
		}
	}
}
