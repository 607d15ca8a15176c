//! Built-in command table.
//!
//! Every command implements [`Command`] and receives one [`Invocation`]:
//! the resolved name, the argument text, the session's context and
//! options, and a single-use [`Respond`] handle. A command answers by
//! consuming `respond` exactly once, or by dropping it (as `quit` does) to
//! write nothing at all.

mod builtin;
mod entity;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ReplOptions;
use crate::error::ReplError;
use crate::host::Host;
use crate::protocol::OutputSink;
use crate::session::SessionContext;
use crate::value::Inspector;

pub use builtin::Builtin;
pub use entity::EntityCommand;

/// What a command answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A value, rendered with the session's inspector.
    Value(Value),
    /// Text written as-is.
    Text(String),
    /// No result; renders as `undefined`.
    Undefined,
    /// An empty response frame.
    Empty,
}

impl From<Option<Value>> for Reply {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Reply::Undefined, Reply::Value)
    }
}

/// Single-use response handle.
///
/// Consuming methods make a second response impossible. Responses written
/// after the session's stream is gone are dropped silently.
#[derive(Debug)]
pub struct Respond {
    output: OutputSink,
    inspector: Inspector,
}

impl Respond {
    pub fn new(output: OutputSink, inspector: Inspector) -> Self {
        Self { output, inspector }
    }

    pub fn ok(self, reply: Reply) {
        let text = match reply {
            Reply::Value(value) => self.inspector.inspect(&value),
            Reply::Text(text) => text,
            Reply::Undefined => "undefined".to_string(),
            Reply::Empty => String::new(),
        };
        self.output.frame(&text);
    }

    pub fn error(self, message: impl fmt::Display) {
        self.output.frame(&message.to_string());
    }

    pub fn result<E: fmt::Display>(self, result: Result<Reply, E>) {
        match result {
            Ok(reply) => self.ok(reply),
            Err(e) => self.error(e),
        }
    }
}

/// Everything a command handler gets for one evaluated line.
pub struct Invocation<'a> {
    /// Command name after alias resolution.
    pub name: &'a str,
    /// Text after the command name, leading whitespace included.
    pub args: &'a str,
    pub context: &'a mut SessionContext,
    pub options: &'a mut ReplOptions,
    pub host: &'a Arc<dyn Host>,
    pub commands: &'a CommandTable,
    /// For streaming output that bypasses `respond`.
    pub output: &'a OutputSink,
    pub respond: Respond,
}

/// A command handler.
#[async_trait]
pub trait Command: Send + Sync {
    /// One-line usage shown by `help`.
    fn usage(&self) -> &str;

    async fn invoke(&self, call: Invocation<'_>);
}

/// A command built from a plain function of the argument text.
pub struct FnCommand<F> {
    usage: String,
    handler: F,
}

impl<F> FnCommand<F>
where
    F: Fn(&str) -> Result<Reply, String> + Send + Sync,
{
    pub fn new(usage: impl Into<String>, handler: F) -> Self {
        Self {
            usage: usage.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> Command for FnCommand<F>
where
    F: Fn(&str) -> Result<Reply, String> + Send + Sync,
{
    fn usage(&self) -> &str {
        &self.usage
    }

    async fn invoke(&self, call: Invocation<'_>) {
        call.respond.result((self.handler)(call.args));
    }
}

/// Mapping from command name to handler.
///
/// The process-wide default table is built once; each session gets its own
/// clone, so commands registered on one session stay there.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table every session starts from.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for builtin in Builtin::ALL {
            table
                .commands
                .insert(builtin.name().to_string(), Arc::new(builtin));
        }
        for entity in EntityCommand::ALL {
            table
                .commands
                .insert(entity.name().to_string(), Arc::new(entity));
        }
        table
    }

    /// Add or replace a command.
    ///
    /// Names must be non-empty and free of whitespace, since dispatch looks
    /// commands up by the first token of a line.
    pub fn insert(&mut self, name: &str, command: Arc<dyn Command>) -> crate::Result<()> {
        validate_name(name)?;
        self.commands.insert(name.to_string(), command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Command)> {
        self.commands
            .iter()
            .map(|(name, command)| (name.as_str(), command.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.commands.keys()).finish()
    }
}

/// Check that `name` can be dispatched to.
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ReplError::InvalidCommand(format!(
            "command name must be a single word: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving a single command.

    use super::*;
    use crate::host::LocalHost;
    use crate::session::SessionId;
    use serde_json::json;
    use tokio::sync::mpsc;

    pub struct Harness {
        pub context: SessionContext,
        pub options: ReplOptions,
        pub host: Arc<dyn Host>,
        pub commands: CommandTable,
        pub output: OutputSink,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl Harness {
        pub fn new() -> Self {
            let options = ReplOptions::default();
            let (output, rx) = OutputSink::channel();
            Self {
                context: SessionContext::new(SessionId::new("t1"), "test", &options),
                options,
                host: LocalHost::new(json!({"a": {"b": 1}})),
                commands: CommandTable::builtin(),
                output,
                rx,
            }
        }

        /// Run `name` with `args` and return every byte written, as text.
        pub async fn run(&mut self, name: &str, args: &str) -> String {
            let command = self.commands.get(name).expect("command exists");
            let respond = Respond::new(self.output.clone(), self.context.inspector());
            let commands = self.commands.clone();
            command
                .invoke(Invocation {
                    name,
                    args,
                    context: &mut self.context,
                    options: &mut self.options,
                    host: &self.host,
                    commands: &commands,
                    output: &self.output,
                    respond,
                })
                .await;
            self.drain()
        }

        pub fn drain(&mut self) -> String {
            let mut bytes = Vec::new();
            while let Ok(chunk) = self.rx.try_recv() {
                bytes.extend(chunk);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}
