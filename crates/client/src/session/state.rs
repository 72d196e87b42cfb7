//! Session lifecycle state.

use tokio::sync::watch;

use crate::{Error, Result};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
	/// Connection open, handshake in progress.
	Starting,
	/// `initialize`/`initialized` complete; components may talk to the server.
	Ready,
	/// Stopped, failed or disconnected.
	Stopped,
}

/// Wait until `state` becomes [`SessionState::Ready`].
///
/// Fails with [`Error::NotReady`] if the session stops first.
pub(crate) async fn wait_ready(mut state: watch::Receiver<SessionState>) -> Result<()> {
	loop {
		match *state.borrow_and_update() {
			SessionState::Ready => return Ok(()),
			SessionState::Stopped => return Err(Error::NotReady),
			SessionState::Starting => {}
		}
		if state.changed().await.is_err() {
			return Err(Error::NotReady);
		}
	}
}
