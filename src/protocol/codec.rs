// src/protocol/codec.rs — Line codec for request/response envelopes
//
// One JSON object per line. Responses are flushed as soon as they are written:
// the protocol is strictly synchronous, so the reader must see each response
// before it sends the next request.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::infra::errors::ToolError;
use crate::protocol::types::{Kind, Request, Response};

/// Decode one request line.
pub fn decode(line: &str) -> Result<Request, ToolError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| ToolError::MalformedMessage(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ToolError::MalformedMessage("message is not a JSON object".into()))?;

    let id = obj
        .get("id")
        .cloned()
        .ok_or_else(|| ToolError::MalformedMessage("missing field 'id'".into()))?;
    let kind = obj
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| ToolError::MalformedMessage("missing or non-string field 'kind'".into()))?;

    let string_field = |name: &str| -> Result<String, ToolError> {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                ToolError::MalformedMessage(format!(
                    "'{kind}' message is missing string field '{name}'"
                ))
            })
    };

    match Kind::parse(kind) {
        Kind::Start => Ok(Request::Start { id }),
        Kind::Define => Ok(Request::Define {
            id,
            module: string_field("module")?,
        }),
        Kind::Evaluate => {
            let module = string_field("module")?;
            let function = string_field("function")?;
            let input = obj.get("input").cloned().ok_or_else(|| {
                ToolError::MalformedMessage("'evaluate' message is missing field 'input'".into())
            })?;
            Ok(Request::Evaluate {
                id,
                module,
                function,
                input,
            })
        }
        Kind::Other(kind) => Ok(Request::Other { id, kind }),
    }
}

/// Encode a response as exactly one newline-terminated line.
pub fn encode(response: &Response) -> String {
    // Serializing a response cannot fail: every field is a JSON value, a string,
    // a bool or a list of timings.
    let mut line = serde_json::to_string(response).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize response: {}", e);
        format!("{{\"id\":{}}}", response.id)
    });
    line.push('\n');
    line
}

/// Write one response line and flush it.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(encode(response).as_bytes()).await?;
    writer.flush().await
}
