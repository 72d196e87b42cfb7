//! Byte streams connecting a session to its server.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::ServerCommand;
use crate::{Error, Result};

/// The two halves of a server connection, plus the server process when one was spawned.
pub struct Connection {
	pub(crate) reader: Box<dyn AsyncBufRead + Unpin + Send>,
	pub(crate) writer: Box<dyn AsyncWrite + Unpin + Send>,
	pub(crate) child: Option<Child>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("pid", &self.child.as_ref().and_then(Child::id))
			.finish_non_exhaustive()
	}
}

impl Connection {
	/// Spawn the server and talk to it over stdio.
	///
	/// Stderr lines are forwarded to the log. The process is killed if the connection is dropped.
	pub fn spawn(server: &ServerCommand, root_path: &Path) -> Result<Self> {
		let failure = |reason: String| Error::ConnectionFailure {
			server: server.command.clone(),
			reason,
		};
		if server.command.is_empty() {
			return Err(failure("no server command configured".into()));
		}

		let mut cmd = Command::new(&server.command);
		cmd.args(&server.args)
			.envs(&server.env)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.current_dir(root_path)
			.kill_on_drop(true);

		#[cfg(unix)]
		cmd.process_group(0);

		let mut child = cmd.spawn().map_err(|e| failure(e.to_string()))?;
		let stdin = child.stdin.take().ok_or_else(|| failure("server stdin unavailable".into()))?;
		let stdout = child.stdout.take().ok_or_else(|| failure("server stdout unavailable".into()))?;
		debug!(target: "tether::session", command = %server.command, pid = child.id(), "Spawned analysis server");

		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(async move {
				let mut lines = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					info!(target: "tether::server", stderr = %line, "Server stderr");
				}
			});
		}

		Ok(Self {
			reader: Box::new(BufReader::new(stdout)),
			writer: Box::new(stdin),
			child: Some(child),
		})
	}

	/// Wrap existing streams, for servers reached without spawning a process.
	pub fn from_io(reader: impl AsyncRead + Unpin + Send + 'static, writer: impl AsyncWrite + Unpin + Send + 'static) -> Self {
		Self {
			reader: Box::new(BufReader::new(reader)),
			writer: Box::new(writer),
			child: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn empty_command_is_a_connection_failure() {
		let err = Connection::spawn(&ServerCommand::default(), Path::new(".")).unwrap_err();
		assert!(err.is_fatal());
	}

	#[tokio::test]
	async fn missing_binary_is_a_connection_failure() {
		let server = ServerCommand {
			command: "tether-test-no-such-server".into(),
			..ServerCommand::default()
		};
		let err = Connection::spawn(&server, Path::new(".")).unwrap_err();
		assert!(matches!(err, Error::ConnectionFailure { ref server, .. } if server == "tether-test-no-such-server"));
	}
}
