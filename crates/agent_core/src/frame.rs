use serde::Deserialize;
use serde_json::Value;

/// Default per-line size limit enforced by the transport reader: 10 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcNotification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// An inbound frame, classified per the header-fields-only rule: a non-null
/// `id` with no `method` is a response, a non-null `id` with a `method` is a
/// request, and a `method` with no `id` (or a `null` id) is a notification.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response(RpcResponse),
    Request(RpcRequest),
    Notification(RpcNotification),
}

/// Classifies and fully decodes one already-parsed JSON value.
///
/// Returns `None` for malformed frames (missing required fields for the
/// shape the header implies, or neither `id` nor `method` present) — callers
/// skip these rather than treat them as fatal.
pub(crate) fn classify(value: Value) -> Option<Incoming> {
    let has_id = value.get("id").map(|v| !v.is_null()).unwrap_or(false);
    let has_method = value.get("method").is_some();

    if has_id && !has_method {
        return serde_json::from_value(value).ok().map(Incoming::Response);
    }
    if has_id {
        return serde_json::from_value(value).ok().map(Incoming::Request);
    }
    if has_method {
        return serde_json::from_value(value)
            .ok()
            .map(Incoming::Notification);
    }
    None
}

/// Extracts just the `id` field from an otherwise-undecodable frame, so a
/// parse failure can still be turned into a synthesized error response
/// instead of leaving the caller hanging.
///
/// Works lexically rather than through a full parse: the frame this exists
/// for is, by definition, not valid JSON (or `serde_json` would have decoded
/// it already), so scanning for the `"id"` key and reading the token that
/// follows its colon is the only way to recover it.
pub(crate) fn recover_id(raw: &str) -> Option<Value> {
    let key_pos = raw.find("\"id\"")?;
    let after_key = &raw[key_pos + 4..];
    let colon_pos = after_key.find(':')?;
    let value_text = after_key[colon_pos + 1..].trim_start();

    if let Some(rest) = value_text.strip_prefix('"') {
        let mut end = None;
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let end = end?;
        return Some(Value::String(rest[..end].to_string()));
    }

    let end = value_text
        .find(|c: char| c == ',' || c == '}' || c.is_whitespace())
        .unwrap_or(value_text.len());
    let token = &value_text[..end];
    if token.is_empty() || token == "null" {
        return None;
    }
    if let Ok(n) = token.parse::<i64>() {
        return Some(Value::from(n));
    }
    token.parse::<f64>().ok().map(Value::from)
}

/// Serializes a JSON-RPC envelope followed by a single newline.
pub(crate) fn encode(value: &Value) -> serde_json::Result<String> {
    let mut text = serde_json::to_string(value)?;
    text.push('\n');
    Ok(text)
}

pub(crate) fn request_envelope(id: &Value, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

pub(crate) fn notification_envelope(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

pub(crate) fn response_envelope(id: &Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub(crate) fn error_envelope(id: &Value, code: i64, message: impl Into<String>) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

pub mod error_code {
    pub const PARSE: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}
