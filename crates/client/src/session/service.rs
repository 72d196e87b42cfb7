//! Inbound side of the session connection.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::future::BoxFuture;
use lsp_types::request::{Request, ShowMessageRequest, WorkDoneProgressCreate, WorkspaceConfiguration};
use lsp_types::{ConfigurationParams, MessageActionItem, ShowMessageRequestParams};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tether_rpc::{AnyNotification, AnyRequest, CancellationToken, ErrorCode, ResponseError, RpcService};
use tracing::debug;

use crate::commands::CommandDispatcher;
use crate::decorations::DecorationSynchronizer;
use crate::host::Host;
use crate::protocol::{InputBox, InputBoxResult, SlowTask, SlowTaskResult};
use crate::router::NotificationRouter;
use crate::settings::{Settings, resolve_section};
use crate::slow_task::{SlowTaskOutcome, SlowTaskTracker};
use crate::status::StatusPresenter;

type HandlerResult = Result<JsonValue, ResponseError>;

/// Components sharing one session connection.
#[derive(Clone)]
pub(crate) struct Components {
	pub(crate) host: Arc<dyn Host>,
	pub(crate) settings: Arc<dyn Settings>,
	pub(crate) settings_section: String,
	pub(crate) commands: Arc<CommandDispatcher>,
	pub(crate) status: Arc<StatusPresenter>,
	pub(crate) decorations: Arc<DecorationSynchronizer>,
	pub(crate) slow_tasks: Arc<SlowTaskTracker>,
	pub(crate) router: Arc<NotificationRouter>,
}

/// Answers server requests and routes server notifications.
pub(crate) struct ClientService {
	components: Components,
}

impl ClientService {
	pub(crate) fn new(components: Components) -> Self {
		Self { components }
	}

	pub(crate) fn components(&self) -> &Components {
		&self.components
	}
}

impl RpcService for ClientService {
	fn call(&mut self, req: AnyRequest, cancel: CancellationToken) -> BoxFuture<'static, HandlerResult> {
		let c = &self.components;
		match req.method.as_str() {
			SlowTask::METHOD => {
				let tracker = c.slow_tasks.clone();
				Box::pin(async move {
					match tracker.run(params(req.params)?, cancel).await {
						SlowTaskOutcome::UserCancelled => result(SlowTaskResult { cancel: true }),
						SlowTaskOutcome::ServerCancelled => {
							Err(ResponseError::new(ErrorCode::REQUEST_CANCELLED, "slow task cancelled by server"))
						}
					}
				})
			}
			InputBox::METHOD => {
				let host = c.host.clone();
				Box::pin(async move {
					let prompt = params(req.params)?;
					let answer = tokio::select! {
						biased;
						_ = cancel.cancelled() => None,
						answer = host.input_box(prompt) => Some(answer),
					};
					match answer {
						Some(Some(value)) => result(InputBoxResult {
							value: Some(value),
							cancelled: None,
						}),
						_ => result(InputBoxResult::cancelled()),
					}
				})
			}
			WorkspaceConfiguration::METHOD => {
				let answer = params::<ConfigurationParams>(req.params).map(|config| {
					let values: Vec<JsonValue> = config
						.items
						.iter()
						.map(|item| resolve_section(c.settings.as_ref(), &c.settings_section, item.section.as_deref()))
						.collect();
					JsonValue::Array(values)
				});
				Box::pin(std::future::ready(answer))
			}
			ShowMessageRequest::METHOD => {
				let host = c.host.clone();
				Box::pin(async move {
					let request: ShowMessageRequestParams = params(req.params)?;
					let actions: Vec<String> = request.actions.unwrap_or_default().into_iter().map(|a| a.title).collect();
					let chosen = host.show_message_with_actions(request.typ.into(), &request.message, &actions).await;
					result(chosen.map(|title| MessageActionItem {
						title,
						properties: Default::default(),
					}))
				})
			}
			WorkDoneProgressCreate::METHOD => Box::pin(std::future::ready(Ok(JsonValue::Null))),
			method => {
				debug!(target: "tether::session", method, "Unhandled server request");
				let err = ResponseError::new(ErrorCode::METHOD_NOT_FOUND, format!("method not found: {method}"));
				Box::pin(std::future::ready(Err(err)))
			}
		}
	}

	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<tether_rpc::Result<()>> {
		self.components.router.route(notif);
		ControlFlow::Continue(())
	}
}

fn params<T: DeserializeOwned>(value: JsonValue) -> Result<T, ResponseError> {
	serde_json::from_value(value).map_err(|e| ResponseError::new(ErrorCode::INVALID_PARAMS, e))
}

fn result(value: impl Serialize) -> HandlerResult {
	serde_json::to_value(value).map_err(|e| ResponseError::new(ErrorCode::INTERNAL_ERROR, e))
}
