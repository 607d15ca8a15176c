//! # repl-tunnel
//!
//! Remote command evaluator: interactive, line-oriented REPL sessions
//! multiplexed in one process and reachable over a raw TCP socket, HTTP,
//! or cloud-function style invocation.
//!
//! ## Features
//!
//! - **Framing**: newline-terminated requests, responses terminated by one
//!   zero byte, over any duplex byte stream
//! - **Session registry**: named concurrent sessions with open/closed
//!   lifecycle and in-process submission
//! - **Dispatch**: aliases, built-in commands, structured messages to the
//!   host, and a restricted script fallback, in that order
//! - **Transports**: TCP listener, HTTP and invoke endpoints, and an
//!   interactive client
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use repl_tunnel::command::CommandTable;
//! use repl_tunnel::config::ReplOptions;
//! use repl_tunnel::host::LocalHost;
//! use repl_tunnel::script::Interpreter;
//! use repl_tunnel::{SessionId, SessionRegistry, SessionStreams};
//!
//! #[tokio::main]
//! async fn main() -> repl_tunnel::Result<()> {
//!     repl_tunnel::logging::try_init().ok();
//!
//!     let host = LocalHost::new(serde_json::json!({}));
//!     let registry = SessionRegistry::new(
//!         host,
//!         Arc::new(Interpreter),
//!         CommandTable::builtin(),
//!         ReplOptions::default(),
//!         SessionId::new("local"),
//!     );
//!
//!     registry
//!         .use_session(Some("demo"), SessionStreams::in_process())
//!         .await?;
//!     let out = registry.send_command("demo", "1+2").await?;
//!     assert_eq!(out, "3");
//!
//!     registry.close_all().await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod listener;
pub mod logging;
pub mod protocol;
pub mod script;
pub mod service;
pub mod session;
pub mod value;

// Re-export commonly used types
pub use command::{Command, CommandTable, Reply};
pub use error::{ReplError, Result};
pub use host::{Host, HostError, LocalHost};
pub use listener::ListenerHandle;
pub use protocol::{FrameDecoder, FrameReader, OutputSink};
pub use script::{Interpreter, ScriptEvaluator};
pub use session::{
    Session, SessionContext, SessionId, SessionRegistry, SessionStatus, SessionStreams,
    SessionSummary,
};
