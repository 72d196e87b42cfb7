//! Opaque key-value settings owned by the host.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};

/// Host settings storage.
///
/// The client never interprets values; it only relays them to the server.
pub trait Settings: Send + Sync {
	/// Read a single key.
	fn get(&self, key: &str) -> Option<JsonValue>;

	/// Write a single key.
	fn set(&self, key: &str, value: JsonValue);

	/// All keys as a JSON object.
	fn snapshot(&self) -> Map<String, JsonValue>;
}

/// In-memory [`Settings`].
#[derive(Debug, Default)]
pub struct MemorySettings {
	values: RwLock<BTreeMap<String, JsonValue>>,
}

impl MemorySettings {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a store prefilled with `values`.
	pub fn with_values(values: impl IntoIterator<Item = (impl Into<String>, JsonValue)>) -> Self {
		Self {
			values: RwLock::new(values.into_iter().map(|(k, v)| (k.into(), v)).collect()),
		}
	}
}

impl Settings for MemorySettings {
	fn get(&self, key: &str) -> Option<JsonValue> {
		self.values.read().get(key).cloned()
	}

	fn set(&self, key: &str, value: JsonValue) {
		self.values.write().insert(key.to_owned(), value);
	}

	fn snapshot(&self) -> Map<String, JsonValue> {
		self.values.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}
}

/// Resolve a `workspace/configuration` item against `settings`.
///
/// `section` itself yields the whole snapshot, `section.key` a single value, and anything else
/// `null`.
pub fn resolve_section(settings: &dyn Settings, root: &str, section: Option<&str>) -> JsonValue {
	match section {
		None => JsonValue::Null,
		Some(s) if s == root => JsonValue::Object(settings.snapshot()),
		Some(s) => s
			.strip_prefix(root)
			.and_then(|rest| rest.strip_prefix('.'))
			.and_then(|key| settings.get(key))
			.unwrap_or(JsonValue::Null),
	}
}
