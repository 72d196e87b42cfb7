//! Error type for the message pump.

use std::io;

use crate::types::ResponseError;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The main loop stopped; no further messages can be exchanged.
	#[error("service stopped")]
	ServiceStopped,
	/// The peer sent undecodable or invalid data.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The peer replied with an error.
	#[error("{0}")]
	Response(#[from] ResponseError),
	/// The request did not complete in time.
	#[error("request timed out: {0}")]
	RequestTimeout(String),
	/// The peer violated the framing or JSON-RPC rules.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Input/output errors from the underlying channels.
	#[error("{0}")]
	Io(String),
	/// The underlying channel reached EOF.
	#[error("the underlying channel reached EOF")]
	Eof,
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Self::Deserialize(e.to_string())
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e.to_string())
	}
}
