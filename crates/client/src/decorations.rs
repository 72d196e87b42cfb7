//! Inline annotations for the active document.

use std::sync::Arc;

use lsp_types::Uri;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::host::{DecorationStyleId, Host};
use crate::protocol::{DecorationOptions, DecorationsParams};

/// Decorations rendered for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecorationSet {
	/// Document the set belongs to.
	pub uri: Uri,
	/// Decorations in render order.
	pub decorations: Vec<DecorationOptions>,
}

/// Result of applying a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationOutcome {
	/// The push replaced the active document's decorations.
	Rendered {
		/// Number of decorations rendered.
		count: usize,
	},
	/// The push targeted a document that is not active and was dropped.
	Stale {
		/// Document named by the push.
		uri: String,
	},
}

/// Keeps the active document's decorations in sync with server pushes.
///
/// Pushes for other documents are dropped rather than buffered; the server re-sends them when
/// that document gains focus.
pub struct DecorationSynchronizer {
	host: Arc<dyn Host>,
	style: Mutex<Option<DecorationStyleId>>,
	current: Mutex<Option<DecorationSet>>,
}

impl std::fmt::Debug for DecorationSynchronizer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DecorationSynchronizer")
			.field("style", &*self.style.lock())
			.field("current", &self.current.lock().as_ref().map(|set| set.uri.as_str().to_owned()))
			.finish_non_exhaustive()
	}
}

impl DecorationSynchronizer {
	/// Create a synchronizer. The default style is created on the first push.
	pub fn new(host: Arc<dyn Host>) -> Self {
		Self {
			host,
			style: Mutex::new(None),
			current: Mutex::new(None),
		}
	}

	/// Replace the style used for subsequent pushes.
	///
	/// Decorations already on screen keep their old style until the next push.
	pub fn on_type_changed(&self, options: &JsonValue) -> DecorationStyleId {
		let style = self.host.create_decoration_style(options);
		debug!(target: "tether::decorations", style = style.0, "Decoration style replaced");
		*self.style.lock() = Some(style);
		style
	}

	/// Apply a push if it targets the active document.
	pub fn on_decorations(&self, params: DecorationsParams) -> DecorationOutcome {
		let active = self.host.active_document();
		if active.as_ref().map(|uri| uri.as_str()) != Some(params.document_uri.as_str()) {
			info!(
				target: "tether::decorations",
				uri = params.document_uri.as_str(),
				active = active.as_ref().map(|uri| uri.as_str()),
				"Ignoring decorations for inactive document"
			);
			return DecorationOutcome::Stale {
				uri: params.document_uri.as_str().to_owned(),
			};
		}

		let style = self.current_style();
		let count = params.options.len();
		self.host.render_decorations(style, &params.document_uri, &params.options);
		*self.current.lock() = Some(DecorationSet {
			uri: params.document_uri,
			decorations: params.options,
		});
		debug!(target: "tether::decorations", count, style = style.0, "Rendered decorations");
		DecorationOutcome::Rendered { count }
	}

	/// The last set rendered.
	pub fn current(&self) -> Option<DecorationSet> {
		self.current.lock().clone()
	}

	fn current_style(&self) -> DecorationStyleId {
		let mut style = self.style.lock();
		if let Some(style) = *style {
			return style;
		}
		let created = self.host.create_decoration_style(&JsonValue::Null);
		*style = Some(created);
		created
	}
}
