//! Command dispatch: deciding what one input line means.
//!
//! A line goes through these phases, in order:
//!
//! 1. history: `last` repeats the previous line
//! 2. whole-line alias, then leading-token alias
//! 3. built-in command lookup
//! 4. structured message (`a:1,b:2`), submitted to the host
//! 5. script fallback

mod alias;
mod evaluator;
mod message;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::command::Command;
use crate::host::HostError;

pub use alias::{resolve, Resolved};
pub use evaluator::Dispatcher;
pub use message::{Binding, Message};

/// Messages delivered to a running session from outside its input stream.
pub enum Control {
    /// Add a command to this session's table.
    AddCommand {
        name: String,
        command: Arc<dyn Command>,
    },
    /// A structured message finished.
    ActResult {
        binding: Option<Binding>,
        result: Result<Value, HostError>,
    },
    /// Stop the session.
    Shutdown,
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::AddCommand { name, .. } => {
                f.debug_struct("AddCommand").field("name", name).finish()
            }
            Control::ActResult { binding, result } => f
                .debug_struct("ActResult")
                .field("binding", binding)
                .field("ok", &result.is_ok())
                .finish(),
            Control::Shutdown => f.write_str("Shutdown"),
        }
    }
}
