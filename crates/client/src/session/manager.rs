//! Single-session ownership per workspace.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Connection, Session};
use crate::config::ClientConfig;
use crate::host::{Host, MessageLevel};
use crate::settings::Settings;
use crate::{Error, Result};

/// Action offered after a connection failure.
pub const RETRY_ACTION: &str = "Retry";
/// Action offered after a connection failure.
pub const OPEN_SETTINGS_ACTION: &str = "Open Settings";

/// Owns the active session of a workspace.
///
/// Activation is serialized: the previous session is fully stopped before the next one starts.
pub struct SessionManager {
	host: Arc<dyn Host>,
	settings: Arc<dyn Settings>,
	current: Mutex<Option<Arc<Session>>>,
}

impl std::fmt::Debug for SessionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManager").finish_non_exhaustive()
	}
}

impl SessionManager {
	/// Create a manager with no active session.
	pub fn new(host: Arc<dyn Host>, settings: Arc<dyn Settings>) -> Self {
		Self {
			host,
			settings,
			current: Mutex::new(None),
		}
	}

	/// Replace the active session with one started from `config`.
	///
	/// On a connection failure the user may retry or open the settings; nothing is retried
	/// without their choice.
	pub async fn activate(&self, config: ClientConfig) -> Result<Arc<Session>> {
		self.activate_with(config, |config| Connection::spawn(&config.server, &config.root_path))
			.await
	}

	/// [`activate`](Self::activate) with a custom connection factory, called once per attempt.
	pub async fn activate_with(
		&self,
		config: ClientConfig,
		mut connect: impl FnMut(&ClientConfig) -> Result<Connection>,
	) -> Result<Arc<Session>> {
		let mut current = self.current.lock().await;
		if let Some(previous) = current.take() {
			debug!(target: "tether::session", "Stopping previous session");
			previous.stop().await;
		}

		loop {
			match Session::start_with(config.clone(), self.host.clone(), self.settings.clone(), &mut connect).await {
				Ok(session) => {
					*current = Some(session.clone());
					return Ok(session);
				}
				Err(err) if err.is_fatal() => {
					if !self.offer_recovery(&err).await {
						return Err(err);
					}
					info!(target: "tether::session", "Retrying session start");
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// Returns `true` when the user asked to retry.
	async fn offer_recovery(&self, err: &Error) -> bool {
		let actions = [RETRY_ACTION.to_owned(), OPEN_SETTINGS_ACTION.to_owned()];
		let choice = self
			.host
			.show_message_with_actions(MessageLevel::Error, &err.to_string(), &actions)
			.await;
		match choice.as_deref() {
			Some(RETRY_ACTION) => true,
			Some(OPEN_SETTINGS_ACTION) => {
				self.host.open_settings();
				false
			}
			_ => false,
		}
	}

	/// Stop the active session, if any.
	pub async fn deactivate(&self) {
		if let Some(session) = self.current.lock().await.take() {
			session.stop().await;
		}
	}

	/// The active session.
	pub async fn current(&self) -> Option<Arc<Session>> {
		self.current.lock().await.clone()
	}
}
