//! HTTP request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionSummary;

/// Session id used by function invocations that name none.
pub const INVOKE_SESSION: &str = "invoke";

/// Request to evaluate one command line.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// Target session; the configured default session when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// The command line to evaluate.
    pub cmd: String,
}

/// Result of a command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl CommandResponse {
    pub fn out(out: impl Into<String>) -> Self {
        Self {
            ok: true,
            out: Some(out.into()),
            err: None,
        }
    }

    pub fn err(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            out: None,
            err: Some(err.into()),
        }
    }
}

/// A cloud-function invocation event.
///
/// `body` is either the message object itself or its JSON text.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeEvent {
    #[serde(default)]
    pub body: Value,
}

impl InvokeEvent {
    /// The message carried by the event, decoding a string body.
    pub fn message(&self) -> Result<Value, String> {
        match &self.body {
            Value::String(text) => {
                serde_json::from_str(text).map_err(|e| format!("invalid body: {}", e))
            }
            Value::Object(_) => Ok(self.body.clone()),
            Value::Null => Err("missing body".to_string()),
            other => Err(format!("body must be an object, got {}", other)),
        }
    }
}

/// A cloud-function style response: the body is JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub status_code: u16,
    pub body: String,
}

impl InvokeResponse {
    pub fn ok(out: &Value) -> Self {
        Self {
            status_code: 200,
            body: out.to_string(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            status_code: 500,
            body: serde_json::json!({ "error$": { "code": code, "message": message } })
                .to_string(),
        }
    }
}

/// Server information with the current sessions.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub sessions: Vec<SessionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_request_id_optional() {
        let req: CommandRequest = serde_json::from_str(r#"{"cmd":"1+1"}"#).unwrap();
        assert_eq!(req.id, None);
        assert_eq!(req.cmd, "1+1");
    }

    #[test]
    fn test_command_response_shape() {
        assert_eq!(
            serde_json::to_value(CommandResponse::out("3")).unwrap(),
            json!({"ok": true, "out": "3"})
        );
        assert_eq!(
            serde_json::to_value(CommandResponse::err("boom")).unwrap(),
            json!({"ok": false, "err": "boom"})
        );
    }

    #[test]
    fn test_invoke_body_forms() {
        let event: InvokeEvent =
            serde_json::from_value(json!({"body": {"sys": "repl"}})).unwrap();
        assert_eq!(event.message().unwrap(), json!({"sys": "repl"}));

        let event: InvokeEvent =
            serde_json::from_value(json!({"body": "{\"sys\":\"repl\"}"})).unwrap();
        assert_eq!(event.message().unwrap(), json!({"sys": "repl"}));

        let event: InvokeEvent = serde_json::from_value(json!({})).unwrap();
        assert!(event.message().is_err());
    }

    #[test]
    fn test_invoke_response_camel_case() {
        let res = InvokeResponse::error("unknown_session", "nope");
        let value = serde_json::to_value(&res).unwrap();
        assert_eq!(value["statusCode"], 500);
        let body: Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(body["error$"]["code"], "unknown_session");
    }
}
