//! Wire framing for JSON-RPC messages.

use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{AnyNotification, AnyRequest, AnyResponse};
use crate::{Error, Result};

const JSONRPC_VERSION: &str = "2.0";
const CONTENT_LENGTH: &str = "content-length";

/// Largest message body accepted from a peer.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// A framed JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	/// A request expecting a correlated response.
	Request(AnyRequest),
	/// A response to an earlier request.
	Response(AnyResponse),
	/// A one-way notification.
	Notification(AnyNotification),
}

impl Message {
	/// Classify a decoded JSON object.
	///
	/// Objects with both `id` and `method` are requests, `method` alone marks a notification and
	/// `id` alone a response. An error response with a null id answers no request and is returned
	/// as [`Error::Response`].
	pub fn from_value(value: JsonValue) -> Result<Self> {
		let has_id = value.get("id").is_some_and(|id| !id.is_null());
		let has_method = value.get("method").is_some();
		let msg = match (has_id, has_method) {
			(true, true) => Self::Request(serde_json::from_value(value)?),
			(false, true) => Self::Notification(serde_json::from_value(value)?),
			(true, false) => Self::Response(serde_json::from_value(value)?),
			(false, false) => {
				return Err(match value.get("error") {
					Some(error) => Error::Response(serde_json::from_value(error.clone())?),
					None => Error::Protocol("message has neither id nor method".into()),
				});
			}
		};
		Ok(msg)
	}

	/// Decode a frame body.
	pub fn decode(body: &[u8]) -> Result<Self> {
		let value: JsonValue = serde_json::from_slice(body)?;
		Self::from_value(value)
	}

	/// Encode to a JSON object including the `jsonrpc` marker.
	pub fn to_value(&self) -> Result<JsonValue> {
		let mut value = match self {
			Self::Request(req) => serde_json::to_value(req)?,
			Self::Response(resp) => serde_json::to_value(resp)?,
			Self::Notification(notif) => serde_json::to_value(notif)?,
		};
		if let JsonValue::Object(map) = &mut value {
			map.insert("jsonrpc".into(), JSONRPC_VERSION.into());
		}
		Ok(value)
	}

	/// Read one message, returning [`Error::Eof`] when the stream ends before a header.
	pub async fn read(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Self> {
		let body = read_frame(input).await?;
		Self::decode(&body)
	}

	/// Write this message with its `Content-Length` header and flush.
	pub async fn write(&self, output: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
		let json = serde_json::to_string(&self.to_value()?)?;
		let header = format!("Content-Length: {}\r\n\r\n", json.len());
		output.write_all(header.as_bytes()).await?;
		output.write_all(json.as_bytes()).await?;
		output.flush().await?;
		Ok(())
	}
}

/// Read the body of one frame without decoding it.
pub(crate) async fn read_frame(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Vec<u8>> {
	let mut line = String::new();
	let mut content_length: Option<usize> = None;
	let mut header_seen = false;
	loop {
		line.clear();
		if input.read_line(&mut line).await? == 0 {
			return Err(if header_seen {
				Error::Protocol("stream ended inside headers".into())
			} else {
				Error::Eof
			});
		}
		let trimmed = line.trim();
		if trimmed.is_empty() {
			if header_seen {
				break;
			}
			continue;
		}
		header_seen = true;
		let Some((name, value)) = trimmed.split_once(':') else {
			return Err(Error::Protocol(format!("malformed header: {trimmed}")));
		};
		if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
			let len = value
				.trim()
				.parse()
				.map_err(|_| Error::Protocol(format!("invalid Content-Length: {}", value.trim())))?;
			content_length = Some(len);
		}
	}

	let length = content_length.ok_or_else(|| Error::Protocol("missing Content-Length".into()))?;
	if length > MAX_CONTENT_LENGTH {
		return Err(Error::Protocol(format!("Content-Length {length} exceeds {MAX_CONTENT_LENGTH}")));
	}
	let mut body = vec![0u8; length];
	input.read_exact(&mut body).await?;
	Ok(body)
}
