use std::str::FromStr;

use lsp_types::{MessageType, Uri};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::watch;

use super::*;
use crate::commands::CommandDispatcher;
use crate::session::SessionState;
use crate::testing::{FakeServer, HostCall, RecordingHost};

struct Fixture {
	host: Arc<RecordingHost>,
	router: NotificationRouter,
	status: Arc<StatusPresenter>,
	_server: FakeServer,
	_state: watch::Sender<SessionState>,
}

fn fixture() -> Fixture {
	let host = RecordingHost::new();
	let server = FakeServer::start();
	let (state, rx) = watch::channel(SessionState::Ready);
	let commands = Arc::new(CommandDispatcher::new(server.socket(), host.clone(), rx));
	let status = Arc::new(StatusPresenter::new(host.clone(), commands));
	let decorations = Arc::new(DecorationSynchronizer::new(host.clone()));
	Fixture {
		router: NotificationRouter::new(host.clone(), status.clone(), decorations),
		host,
		status,
		_server: server,
		_state: state,
	}
}

fn notification(method: &str, params: JsonValue) -> AnyNotification {
	AnyNotification {
		method: method.into(),
		params,
	}
}

fn client_command(command: &str, arguments: JsonValue) -> AnyNotification {
	notification(
		ExecuteClientCommand::METHOD,
		json!({"command": command, "arguments": arguments}),
	)
}

#[tokio::test]
async fn status_push_reaches_presenter() {
	let f = fixture();
	let outcome = f.router.route(notification(
		"tether/status",
		json!({"text": "Indexing", "show": true, "command": "doctor-run"}),
	));
	assert_eq!(outcome, RouteOutcome::Handled);
	assert_eq!(f.status.snapshot().text, "Indexing");
	assert!(f.host.has_command("doctor-run"));
}

#[tokio::test]
async fn client_commands_reach_the_host() {
	let f = fixture();
	let location = json!({
		"uri": "file:///a.scala",
		"range": {"start": {"line": 3, "character": 0}, "end": {"line": 3, "character": 5}}
	});

	assert_eq!(f.router.route(client_command("tether-goto-location", json!([location]))), RouteOutcome::Handled);
	assert_eq!(f.router.route(client_command("tether-model-refresh", json!([]))), RouteOutcome::Handled);
	assert_eq!(
		f.router.route(client_command("tether-open-folder", json!([{"uri": "file:///work", "newWindow": true}]))),
		RouteOutcome::Handled
	);
	assert_eq!(f.router.route(client_command("tether-diagnostics-focus", json!([]))), RouteOutcome::Handled);
	assert_eq!(f.router.route(client_command("tether-doctor-run", json!(["<h1>ok</h1>"]))), RouteOutcome::Handled);
	assert_eq!(
		f.router.route(client_command("tether-echo-command", json!(["editor.save", 1]))),
		RouteOutcome::Handled
	);

	let calls = f.host.calls();
	assert_eq!(
		calls,
		vec![
			HostCall::OpenLocation(serde_json::from_value(location).unwrap()),
			HostCall::RefreshViews,
			HostCall::OpenFolder(Uri::from_str("file:///work").unwrap(), true),
			HostCall::ShowDiagnostics,
			HostCall::ShowReport("<h1>ok</h1>".into()),
			HostCall::ExecuteHostCommand("editor.save".into(), vec![json!(1)]),
		]
	);
}

#[tokio::test]
async fn unknown_client_command_is_ignored() {
	let f = fixture();
	let outcome = f.router.route(client_command("tether-launch-rockets", json!([])));
	assert_eq!(
		outcome,
		RouteOutcome::Ignored {
			kind: "tether/executeClientCommand:tether-launch-rockets".into()
		}
	);
	assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn client_command_with_bad_arguments_is_ignored() {
	let f = fixture();
	let outcome = f.router.route(client_command("tether-goto-location", json!([42])));
	assert!(matches!(outcome, RouteOutcome::Ignored { .. }));
	assert!(f.host.calls().is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_notifications_are_ignored() {
	let f = fixture();
	assert_eq!(
		f.router.route(notification("tether/unheardOf", json!({}))),
		RouteOutcome::Ignored {
			kind: "tether/unheardOf".into()
		}
	);
	assert_eq!(
		f.router.route(notification("tether/status", json!({"show": "yes"}))),
		RouteOutcome::Ignored {
			kind: "tether/status".into()
		}
	);
	assert!(f.host.statuses().is_empty());
}

#[tokio::test]
async fn decorations_for_inactive_document_are_stale() {
	let f = fixture();
	f.host.set_active_document(Some(Uri::from_str("file:///a.scala").unwrap()));

	let push = |uri: &str| notification("tether/publishDecorations", json!({"documentUri": uri, "options": []}));
	assert_eq!(f.router.route(push("file:///a.scala")), RouteOutcome::Handled);
	assert_eq!(f.router.route(push("file:///b.scala")), RouteOutcome::Stale);

	assert_eq!(
		f.router.route(notification("tether/decorationTypeDidChange", json!({"after": {}}))),
		RouteOutcome::Handled
	);
	assert_eq!(f.host.created_styles().last(), Some(&json!({"after": {}})));
}

#[tokio::test]
async fn server_messages_reach_log_and_user() {
	let f = fixture();
	f.router.route(notification(
		LogMessage::METHOD,
		json!({"type": MessageType::INFO, "message": "compiled 3 files"}),
	));
	f.router.route(notification(
		ShowMessage::METHOD,
		json!({"type": MessageType::WARNING, "message": "build changed"}),
	));

	assert_eq!(f.host.log_lines(), vec!["compiled 3 files"]);
	assert_eq!(f.host.messages(), vec![(MessageLevel::Warning, "build changed".to_owned())]);
}
