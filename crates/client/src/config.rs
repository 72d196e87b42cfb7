//! Client configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Section name under which host settings are exposed to the server.
pub const DEFAULT_SETTINGS_SECTION: &str = "tether";

/// How to launch the analysis server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCommand {
	/// Executable to spawn.
	pub command: String,
	/// Arguments to pass to the command.
	pub args: Vec<String>,
	/// Extra environment variables.
	pub env: HashMap<String, String>,
}

/// Slow-task presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowTaskConfig {
	/// How long the "Done" state stays visible after the server finishes a task.
	pub completion_delay_ms: u64,
}

impl Default for SlowTaskConfig {
	fn default() -> Self {
		Self {
			completion_delay_ms: 1000,
		}
	}
}

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Server launch command.
	pub server: ServerCommand,
	/// Workspace root; the server runs with this as its working directory.
	pub root_path: PathBuf,
	/// Timeout for ordinary requests in seconds; `0` waits forever.
	pub request_timeout_secs: u64,
	/// Timeout for the `initialize` handshake in seconds; `0` waits forever.
	pub startup_timeout_secs: u64,
	/// Slow-task presentation.
	pub slow_task: SlowTaskConfig,
	/// Settings section answered to `workspace/configuration`.
	pub settings_section: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server: ServerCommand::default(),
			root_path: PathBuf::from("."),
			request_timeout_secs: 30,
			startup_timeout_secs: 60,
			slow_task: SlowTaskConfig::default(),
			settings_section: DEFAULT_SETTINGS_SECTION.into(),
		}
	}
}

impl ClientConfig {
	/// Create a configuration for `command` running in `root_path`.
	pub fn new(command: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
		Self {
			server: ServerCommand {
				command: command.into(),
				..ServerCommand::default()
			},
			root_path: root_path.into(),
			..Self::default()
		}
	}

	/// Set command line arguments.
	pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.server.args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Set environment variables.
	pub fn env(mut self, env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
		self.server.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		self
	}

	/// Set the request timeout.
	pub fn timeout(mut self, secs: u64) -> Self {
		self.request_timeout_secs = secs;
		self
	}

	/// Set the slow-task completion display delay.
	pub fn with_completion_delay(mut self, delay: Duration) -> Self {
		self.slow_task.completion_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
		self
	}

	/// Parse a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self> {
		toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
	}

	/// Load a TOML file.
	///
	/// A relative `root_path` is resolved against the file's directory.
	pub fn load(path: &Path) -> Result<Self> {
		let source = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
		let mut config = Self::from_toml_str(&source)?;
		if config.root_path.is_relative()
			&& let Some(dir) = path.parent()
		{
			config.root_path = dir.join(&config.root_path);
		}
		Ok(config)
	}

	/// Per-request timeout.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	/// Handshake timeout, `None` when disabled.
	pub fn startup_timeout(&self) -> Option<Duration> {
		(self.startup_timeout_secs > 0).then(|| Duration::from_secs(self.startup_timeout_secs))
	}

	/// Slow-task completion display delay.
	pub fn completion_delay(&self) -> Duration {
		Duration::from_millis(self.slow_task.completion_delay_ms)
	}
}
