//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::debug;

use super::types::{
    CommandRequest, CommandResponse, InfoResponse, InvokeEvent, InvokeResponse, INVOKE_SESSION,
};
use crate::error::ReplError;
use crate::host::Pattern;
use crate::service::host_error;
use crate::session::{SessionRegistry, SessionStreams};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Session used by command requests that name none.
    pub default_session: String,
    /// Function name answered by `/invoke/{function}`.
    pub function: String,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            default_session: "web".to_string(),
            function: "repl".to_string(),
        }
    }

    pub fn with_default_session(mut self, id: impl Into<String>) -> Self {
        self.default_session = id.into();
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = name.into();
        self
    }
}

type ApiError = (StatusCode, Json<CommandResponse>);

fn status_for(err: &ReplError) -> StatusCode {
    match err {
        ReplError::UnknownSession(_) => StatusCode::NOT_FOUND,
        ReplError::InvalidStatus { .. } | ReplError::SubmissionPending(_) => StatusCode::CONFLICT,
        ReplError::ConnectionClosed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: ReplError) -> ApiError {
    (status_for(&err), Json(CommandResponse::err(err.to_string())))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Server information and session summaries.
pub async fn info(State(state): State<AppState>) -> Result<Json<InfoResponse>, ApiError> {
    let sessions = state.registry.sessions().map_err(api_error)?;
    Ok(Json(InfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        sessions,
    }))
}

/// Evaluate one command line in a session, opening the session on demand.
pub async fn command(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse::err(rejection.body_text())),
        )
    })?;
    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.default_session.clone());
    debug!("HTTP command for {}: {:?}", id, req.cmd);

    let session = state
        .registry
        .use_session(Some(&id), SessionStreams::in_process())
        .await
        .map_err(api_error)?;
    let out = state
        .registry
        .send_command(session.id().as_str(), &req.cmd)
        .await
        .map_err(api_error)?;

    Ok(Json(CommandResponse::out(out)))
}

/// Cloud-function style invocation: the event body is a host message.
///
/// Session-control messages open their session first, so a `send:cmd`
/// message works without a prior `use:repl`.
pub async fn invoke(
    State(state): State<AppState>,
    Path(function): Path<String>,
    payload: Result<Json<InvokeEvent>, JsonRejection>,
) -> (StatusCode, Json<InvokeResponse>) {
    if function != state.function {
        return (
            StatusCode::NOT_FOUND,
            Json(InvokeResponse::error(
                "unknown_function",
                &format!("no function named {}", function),
            )),
        );
    }

    let message = match payload {
        Ok(Json(event)) => event.message(),
        Err(rejection) => Err(rejection.body_text()),
    };
    let mut message = match message {
        Ok(message) => message,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(InvokeResponse::error("invalid_event", &e)),
            )
        }
    };

    if is_send_command(&message) {
        if message.get("id").map_or(true, Value::is_null) {
            message["id"] = Value::String(INVOKE_SESSION.to_string());
        }
        let id = match &message["id"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if let Err(e) = state
            .registry
            .use_session(Some(&id), SessionStreams::in_process())
            .await
        {
            let e = host_error(e);
            return (
                StatusCode::OK,
                Json(InvokeResponse::error(&e.code, &e.message)),
            );
        }
    }

    let meta = crate::host::ActMeta::default();
    let response = match state.registry.host().act(message, meta).await {
        Ok(out) => InvokeResponse::ok(&out),
        Err(e) => InvokeResponse::error(&e.code, &e.message),
    };
    (StatusCode::OK, Json(response))
}

fn is_send_command(message: &Value) -> bool {
    Pattern::parse("sys:repl,send:cmd").is_ok_and(|p| p.matches(message))
}
