//! Editor-side client for a long-lived language analysis server.
//!
//! A [`Session`] owns the single connection to the server process and hands it to the components
//! that keep editor state in sync with server pushes:
//!
//! * [`commands::CommandDispatcher`]: forwards command invocations as `workspace/executeCommand`
//!   and binds server-named commands exactly once.
//! * [`router::NotificationRouter`]: decodes inbound notifications into a closed set of kinds.
//! * [`slow_task::SlowTaskTracker`]: elapsed-time progress for long server operations with
//!   cancellation from either side.
//! * [`decorations::DecorationSynchronizer`]: inline annotations for the active document only.
//! * [`status::StatusPresenter`]: the single status line and its bound action.
//!
//! Everything visible to the user goes through the [`Host`] trait, implemented by the embedding
//! editor. [`SessionManager`] guarantees at most one live session per workspace.
#![warn(missing_docs)]

pub mod commands;
pub mod config;
pub mod decorations;
mod error;
mod host;
pub mod protocol;
pub mod router;
mod session;
pub mod settings;
pub mod slow_task;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, ServerCommand};
pub use error::{Error, Result};
pub use host::{CommandHandler, DecorationStyleId, Host, MessageLevel, ProgressReporter};
pub use session::{Connection, Session, SessionManager, SessionState};
pub use settings::{MemorySettings, Settings};

/// Converts a filesystem path to an LSP URI.
///
/// Relative paths are resolved against the current directory. Returns `None` if the path cannot
/// be represented as a `file://` URI.
pub fn uri_from_path(path: &std::path::Path) -> Option<lsp_types::Uri> {
	use std::str::FromStr;

	let abs_path = if path.is_absolute() {
		path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
	} else {
		path.canonicalize().or_else(|_| std::env::current_dir().map(|cwd| cwd.join(path))).ok()?
	};

	let url = url::Url::from_file_path(abs_path).ok()?;
	lsp_types::Uri::from_str(url.as_str()).ok()
}
