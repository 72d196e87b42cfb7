//! Untyped JSON-RPC payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A request id, either numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	/// Numeric id; the main loop assigns these to outgoing requests.
	Number(i32),
	/// Textual id, used by some peers.
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::String(s) => f.write_str(s),
		}
	}
}

/// A request whose params have not been decoded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyRequest {
	/// The request id.
	pub id: RequestId,
	/// The method name.
	pub method: String,
	/// Raw params; `null` when the peer sent none.
	#[serde(default)]
	#[serde(skip_serializing_if = "serde_json::Value::is_null")]
	pub params: JsonValue,
}

/// A notification whose params have not been decoded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyNotification {
	/// The method name.
	pub method: String,
	/// Raw params; `null` when the peer sent none.
	#[serde(default)]
	#[serde(skip_serializing_if = "serde_json::Value::is_null")]
	pub params: JsonValue,
}

/// A response carrying either a result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyResponse {
	/// Id of the request this answers.
	pub id: RequestId,
	/// Successful result.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// Error result.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

impl AnyResponse {
	/// Build a response from a handler outcome.
	pub fn new(id: RequestId, outcome: Result<JsonValue, ResponseError>) -> Self {
		match outcome {
			Ok(result) => Self {
				id,
				result: Some(result),
				error: None,
			},
			Err(error) => Self {
				id,
				result: None,
				error: Some(error),
			},
		}
	}
}

/// JSON-RPC error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
	/// Invalid JSON was received.
	pub const PARSE_ERROR: Self = Self(-32700);
	/// The JSON sent is not a valid request object.
	pub const INVALID_REQUEST: Self = Self(-32600);
	/// The method does not exist or is not available.
	pub const METHOD_NOT_FOUND: Self = Self(-32601);
	/// Invalid method parameters.
	pub const INVALID_PARAMS: Self = Self(-32602);
	/// Internal JSON-RPC error.
	pub const INTERNAL_ERROR: Self = Self(-32603);
	/// The request was cancelled by the peer.
	pub const REQUEST_CANCELLED: Self = Self(-32800);
	/// A request failed but was syntactically correct.
	pub const REQUEST_FAILED: Self = Self(-32803);
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Error payload of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ResponseError {
	/// The error code.
	pub code: ErrorCode,
	/// Human readable message.
	pub message: String,
	/// Extra data defined by the server.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	/// Create an error without extra data.
	pub fn new(code: ErrorCode, message: impl fmt::Display) -> Self {
		Self {
			code,
			message: message.to_string(),
			data: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn request_id_accepts_numbers_and_strings() {
		let ids: Vec<RequestId> = serde_json::from_value(json!([7, "abc"])).unwrap();
		assert_eq!(ids, vec![RequestId::Number(7), RequestId::String("abc".into())]);
		assert_eq!(ids[1].to_string(), "abc");
	}

	#[test]
	fn response_error_skips_missing_data() {
		let err = ResponseError::new(ErrorCode::REQUEST_CANCELLED, "cancelled");
		assert_eq!(serde_json::to_value(&err).unwrap(), json!({"code": -32800, "message": "cancelled"}));
	}
}
