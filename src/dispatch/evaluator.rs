//! Per-line evaluation.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::alias;
use super::message::{self, Binding, Message};
use super::Control;
use crate::command::{CommandTable, Invocation, Reply, Respond};
use crate::config::ReplOptions;
use crate::host::{ActMeta, Host, HostError, HostEvent};
use crate::protocol::OutputSink;
use crate::script::{EvalError, ScriptEvaluator};
use crate::session::SessionContext;
use crate::value::reach;

/// Evaluates the lines of one session.
///
/// Owned by the session task. Each line is resolved through aliases, then
/// the command table, then structured-message syntax, and finally the
/// script evaluator.
pub struct Dispatcher {
    context: SessionContext,
    options: ReplOptions,
    commands: CommandTable,
    host: Arc<dyn Host>,
    scripts: Arc<dyn ScriptEvaluator>,
    output: OutputSink,
    control: mpsc::UnboundedSender<Control>,
}

impl Dispatcher {
    pub fn new(
        context: SessionContext,
        options: ReplOptions,
        commands: CommandTable,
        host: Arc<dyn Host>,
        scripts: Arc<dyn ScriptEvaluator>,
        output: OutputSink,
        control: mpsc::UnboundedSender<Control>,
    ) -> Self {
        Self {
            context,
            options,
            commands,
            host,
            scripts,
            output,
            control,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Evaluate one input line. Every path but `quit` ends in a frame,
    /// though the structured-message frame arrives later.
    pub async fn evaluate(&mut self, raw: &str) {
        let line = self.context.record(raw);
        if line.is_empty() {
            self.output.frame("");
            return;
        }

        let resolved = alias::resolve(&line, &self.context.aliases);
        debug!(
            "Session {} evaluating {:?} as {:?}",
            self.context.id(),
            line,
            resolved.line()
        );

        if let Some(command) = self.commands.get(resolved.name()) {
            let respond = Respond::new(self.output.clone(), self.context.inspector());
            command
                .invoke(Invocation {
                    name: resolved.name(),
                    args: resolved.args(),
                    context: &mut self.context,
                    options: &mut self.options,
                    host: &self.host,
                    commands: &self.commands,
                    output: &self.output,
                    respond,
                })
                .await;
            return;
        }

        let scope = self.context.scope();
        if let Some(message) = message::parse(resolved.line(), &scope) {
            self.submit(message);
            return;
        }

        self.run_script(resolved.line()).await;
    }

    /// Send a message to the host without waiting; the result comes back
    /// through the control channel.
    fn submit(&self, message: Message) {
        let Message { mut body, binding } = message;
        if let Some(fixed) = self.context.fixed_fields() {
            for (key, value) in fixed {
                body.insert(key.clone(), value.clone());
            }
        }

        let host = Arc::clone(&self.host);
        let control = self.control.clone();
        let meta = ActMeta::for_session(self.context.id().as_str());
        tokio::spawn(async move {
            let result = host.act(Value::Object(body), meta).await;
            // The session may already be gone.
            let _ = control.send(Control::ActResult { binding, result });
        });
    }

    async fn run_script(&mut self, source: &str) {
        let mut scope = self.context.scope();
        let mut result = self
            .scripts
            .evaluate(source, &mut scope, self.host.as_ref());

        if matches!(result, Err(EvalError::AwaitPending)) {
            debug!("Retrying {:?} asynchronously", source);
            scope = self.context.scope();
            let meta = ActMeta::for_session(self.context.id().as_str());
            result = self
                .scripts
                .evaluate_async(source, &mut scope, self.host.as_ref(), meta)
                .await;
        }

        self.context.absorb(scope);
        let respond = Respond::new(self.output.clone(), self.context.inspector());
        match result {
            Ok(value) => respond.ok(Reply::from(value)),
            Err(e) => respond.error(e),
        }
    }

    /// Apply a message from outside the evaluation path. Returns `false`
    /// when the session should stop.
    pub fn on_control(&mut self, control: Control) -> bool {
        match control {
            Control::AddCommand { name, command } => {
                if let Err(e) = self.commands.insert(&name, command) {
                    warn!("Session {}: {}", self.context.id(), e);
                }
                true
            }
            Control::ActResult { binding, result } => {
                self.on_act_result(binding, result);
                true
            }
            Control::Shutdown => false,
        }
    }

    fn on_act_result(&mut self, binding: Option<Binding>, result: Result<Value, HostError>) {
        let inspector = self.context.inspector();
        let text = match &result {
            Ok(out) => {
                self.context.out = Some(out.clone());
                self.context.err = None;
                if self.context.trace {
                    String::new()
                } else {
                    inspector.inspect(out)
                }
            }
            Err(e) => {
                self.context.out = None;
                self.context.err = Some(e.to_value());
                inspector.inspect(&e.to_value())
            }
        };

        if let Some(Binding { name, path }) = binding {
            let root = json!({ "out": self.context.out, "err": self.context.err });
            let value = reach(&root, &path).cloned().unwrap_or(Value::Null);
            self.context.bind(&name, value);
        }

        self.output.frame(&text);
    }

    /// Write trace and captured log lines for a host event.
    pub fn on_host_event(&mut self, event: &HostEvent) {
        if let Some(line) = self.context.trace_line(event) {
            self.output.write(&format!("{}\n", line));
        }
        if let Some(line) = self.context.log_line(event) {
            self.output.write(&format!("{}\n", line));
        }
    }

    pub fn close_requested(&self) -> bool {
        self.context.close_requested()
    }
}
