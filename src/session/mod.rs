//! Session management module.
//!
//! A session is one REPL conversation: an input stream of lines, an output
//! stream of frames, and the per-session state that evaluation reads and
//! updates. The [`SessionRegistry`] owns every session of the process.

mod context;
mod id;
mod registry;
mod state;
mod streams;
mod worker;

pub use context::{Delegate, SessionContext, ROOT_DELEGATE};
pub use id::SessionId;
pub use registry::{Session, SessionRegistry, SessionSummary};
pub use state::SessionStatus;
pub use streams::SessionStreams;
