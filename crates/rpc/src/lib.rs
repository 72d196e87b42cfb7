//! JSON-RPC message pump for the tether client.
//!
//! This crate provides the connection-level primitives shared by the client and by the scripted
//! servers used in tests:
//! * [`Message`]: `Content-Length` framed JSON-RPC 2.0 messages
//! * [`MainLoop`]: a tokio-driven pump multiplexing one connection
//! * [`PeerSocket`]: cloneable handle for outgoing requests and notifications
//! * [`RpcService`]: the inbound side, receiving requests (with a per-request
//!   cancellation token) and in-order notifications
//!
//! All writes go through the main loop, so the connection has a single outbound path and callers
//! never need to lock around it.
#![warn(missing_docs)]

mod error;
mod mainloop;
mod message;
mod socket;
mod types;

pub use error::{Error, Result};
pub use mainloop::{MainLoop, RpcService};
pub use message::{MAX_CONTENT_LENGTH, Message};
pub use serde_json::Value as JsonValue;
pub use socket::PeerSocket;
pub use tokio_util::sync::CancellationToken;
pub use types::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, RequestId, ResponseError};

/// Method of the cancellation notification understood by both peers.
pub const CANCEL_REQUEST_METHOD: &str = "$/cancelRequest";
