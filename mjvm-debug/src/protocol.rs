// Front-end message types
//
// One JSON object per line in each direction: requests on stdin, responses
// and events on stdout.

use mjvm_client::DebuggerEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: Value,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok(id: Value, body: Value) -> Self {
        Self {
            id,
            success: true,
            body: if body.is_null() { None } else { Some(body) },
            message: None,
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            body: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadClassesArguments {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: String,
    #[serde(default)]
    pub lines: Vec<u32>,
}

/// Events go out in the same framing as `DebuggerEvent` serializes
pub fn event_line(event: &DebuggerEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
