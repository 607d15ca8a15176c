//! Host actions that expose the session registry as messages.
//!
//! - `sys:repl,use:repl` opens (or reuses) an in-process session.
//! - `sys:repl,send:cmd` submits one command line to a session.
//!
//! Closing the host closes every session and listener.

use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::ReplError;
use crate::host::{HostError, LocalHost};
use crate::session::{SessionRegistry, SessionStreams};

pub const PLUGIN_NAME: &str = "repl";

/// Map a registry error onto a host error code.
pub fn host_error(err: ReplError) -> HostError {
    let code = match &err {
        ReplError::UnknownSession(_) => "unknown_session",
        ReplError::InvalidStatus { .. } => "invalid_status",
        ReplError::ConnectionClosed(_) => "connection_closed",
        ReplError::SubmissionPending(_) => "submission_pending",
        ReplError::InvalidCommand(_) => "invalid_cmd",
        ReplError::Host(e) => return e.clone(),
        _ => "repl_failed",
    };
    HostError::new(code, err.to_string())
}

fn registry_gone() -> HostError {
    HostError::new("repl_closed", "session registry is closed")
}

fn text_field(message: &Value, key: &str) -> Option<String> {
    match message.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Install the `repl` plugin on `host`.
pub fn install(host: &Arc<LocalHost>, registry: &Arc<SessionRegistry>) -> Result<(), HostError> {
    host.register_plugin(PLUGIN_NAME);

    let weak = Arc::downgrade(registry);
    host.add("sys:repl,use:repl", PLUGIN_NAME, move |msg, _meta| {
        let registry = weak.clone();
        async move {
            let registry = registry.upgrade().ok_or_else(registry_gone)?;
            let id = text_field(&msg, "id");
            let session = registry
                .use_session(id.as_deref(), SessionStreams::in_process())
                .await
                .map_err(host_error)?;
            Ok::<Value, HostError>(json!({ "ok": true, "id": session.id().as_str() }))
        }
    })?;

    let weak = Arc::downgrade(registry);
    host.add("sys:repl,send:cmd", PLUGIN_NAME, move |msg, _meta| {
        let registry = weak.clone();
        async move {
            let registry = registry.upgrade().ok_or_else(registry_gone)?;
            let id = text_field(&msg, "id")
                .unwrap_or_else(|| registry.default_id().to_string());
            let cmd = text_field(&msg, "cmd").ok_or_else(|| {
                HostError::new("invalid_cmd", "send:cmd requires a cmd field")
            })?;
            let out = registry
                .send_command(&id, &cmd)
                .await
                .map_err(host_error)?;
            Ok::<Value, HostError>(json!({ "out": out }))
        }
    })?;

    let weak: Weak<SessionRegistry> = Arc::downgrade(registry);
    host.on_close(Box::new(move || {
        async move {
            let Some(registry) = weak.upgrade() else {
                return;
            };
            match registry.close_all().await {
                Ok(()) => info!("All REPL sessions closed"),
                Err(e) => error!("Closing REPL sessions: {}", e),
            }
        }
        .boxed()
    }));

    Ok(())
}
