//! Client error taxonomy.

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the client.
///
/// Unrecognized messages, stale decoration pushes and duplicate command bindings are not errors:
/// they are logged where they occur and never propagate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The server process could not be spawned or the handshake did not complete.
	///
	/// Fatal to the session; never retried without the user asking.
	#[error("failed to connect to analysis server '{server}': {reason}")]
	ConnectionFailure {
		/// The server command.
		server: String,
		/// The failure reason.
		reason: String,
	},
	/// An outgoing request was rejected or could not be delivered.
	#[error("request '{command}' failed: {source}")]
	RequestFailure {
		/// Command or method that failed.
		command: String,
		/// Underlying transport or response error.
		#[source]
		source: tether_rpc::Error,
	},
	/// The session has not completed its handshake, or has already stopped.
	#[error("session is not ready")]
	NotReady,
	/// The configuration could not be read or parsed.
	#[error("invalid configuration: {0}")]
	Config(String),
	/// Transport-level error outside of a specific request.
	#[error(transparent)]
	Rpc(#[from] tether_rpc::Error),
}

impl Error {
	/// Whether this error ends the session.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::ConnectionFailure { .. })
	}
}
