//! HTTP transport.
//!
//! A thin shim over the session registry: each request evaluates one
//! command line in a named in-process session.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /` - Server information and session summaries
//! - `POST <path>` - `{id?, cmd}` → `{ok: true, out}` or `{ok: false, err}`
//! - `POST /invoke/{function}` - cloud-function event `{body}` →
//!   `{statusCode, body}`

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::AppState;
pub use router::{create_router, serve};
pub use types::{CommandRequest, CommandResponse, InfoResponse, InvokeEvent, InvokeResponse};
