//! Tether command line driver.
//!
//! Starts one session against the configured analysis server with a logging host, optionally
//! runs server commands, and keeps the session alive until interrupted.

mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use host::LogHost;
use serde_json::Value as JsonValue;
use tether_client::{ClientConfig, MemorySettings, SessionManager, uri_from_path};
use tracing::{info, warn};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Run a tether session against a language analysis server")]
struct Args {
	/// Configuration file (defaults to the user config directory)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Server executable, overriding the configuration
	#[arg(long, value_name = "CMD")]
	server: Option<String>,

	/// Extra server argument (repeatable)
	#[arg(long = "server-arg", value_name = "ARG", allow_hyphen_values = true)]
	server_args: Vec<String>,

	/// Workspace root, overriding the configuration
	#[arg(short, long, value_name = "DIR")]
	root: Option<PathBuf>,

	/// Document to report as focused once the session is ready
	#[arg(long, value_name = "FILE")]
	focus: Option<PathBuf>,

	/// Server command to execute once ready (repeatable)
	#[arg(short = 'x', long = "exec", value_name = "COMMAND")]
	exec: Vec<String>,

	/// Stop after running the `--exec` commands instead of waiting for Ctrl-C
	#[arg(long)]
	once: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("tether").join("config.toml"))
}

/// Load the configuration file, if any, and apply command line overrides.
fn resolve_config(args: &Args, default_path: Option<&Path>) -> tether_client::Result<ClientConfig> {
	let mut config = match (&args.config, default_path) {
		(Some(path), _) => ClientConfig::load(path)?,
		(None, Some(path)) if path.is_file() => ClientConfig::load(path)?,
		_ => ClientConfig::default(),
	};
	if let Some(server) = &args.server {
		config.server.command.clone_from(server);
	}
	if !args.server_args.is_empty() {
		config.server.args.clone_from(&args.server_args);
	}
	if let Some(root) = &args.root {
		config.root_path.clone_from(root);
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(std::io::stderr)
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	let config = resolve_config(&args, default_config_path().as_deref())?;
	info!(server = %config.server.command, root = %config.root_path.display(), "Starting tether");

	let host = Arc::new(LogHost::default());
	let manager = SessionManager::new(host.clone(), Arc::new(MemorySettings::new()));
	let session = manager.activate(config).await?;

	if let Some(path) = &args.focus {
		match uri_from_path(path) {
			Some(uri) => {
				host.set_active_document(Some(uri.clone()));
				session.did_focus(uri)?;
			}
			None => warn!(path = %path.display(), "Cannot express path as a URI"),
		}
	}

	for command in &args.exec {
		match session.execute_command(command, Vec::new()).await {
			Ok(JsonValue::Null) => info!(command, "Command finished"),
			Ok(result) => println!("{result:#}"),
			Err(err) => warn!(command, error = %err, "Command failed"),
		}
	}

	if !args.once {
		info!(commands = ?host.command_ids(), "Session ready; press Ctrl-C to stop");
		tokio::select! {
			res = tokio::signal::ctrl_c() => res?,
			() = session.closed() => warn!("Session ended"),
		}
	}

	manager.deactivate().await;
	Ok(())
}
