//! Per-session evaluation state.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};

use super::SessionId;
use crate::config::ReplOptions;
use crate::host::HostEvent;
use crate::script::Scope;
use crate::value::{Inspector, Map};

/// Name of the implicit top-level delegate.
pub const ROOT_DELEGATE: &str = "root";

const FIRST_ACT_INDEX: u64 = 1_000_000;

/// A named sub-context whose fixed fields are merged into every message
/// submitted while it is current.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegate {
    pub name: String,
    pub fixed: Map,
}

/// State owned by one session's evaluation task.
///
/// Only the task running the session touches this, so nothing here is
/// synchronised.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: SessionId,
    address: String,
    /// Render results as compact JSON.
    pub plain: bool,
    /// Write act trace lines to the output stream.
    pub trace: bool,
    /// Write host log lines to the output stream.
    pub log_capture: bool,
    /// Substring a log line must contain to be captured.
    pub log_match: Option<String>,
    /// Inspection depth; `None` is unlimited.
    pub depth: Option<usize>,
    /// Alias text to expansion text.
    pub aliases: BTreeMap<String, String>,
    /// Result of the last structured message.
    pub out: Option<Value>,
    /// Error of the last structured message.
    pub err: Option<Value>,
    history: Vec<String>,
    delegates: BTreeMap<String, Delegate>,
    current: Option<String>,
    bindings: BTreeMap<String, Value>,
    close_requested: bool,
    act_index: u64,
    act_indexes: HashMap<String, u64>,
}

impl SessionContext {
    pub fn new(id: SessionId, address: impl Into<String>, options: &ReplOptions) -> Self {
        Self {
            id,
            address: address.into(),
            plain: false,
            trace: options.trace,
            log_capture: false,
            log_match: None,
            depth: options.depth,
            aliases: options.alias.clone(),
            out: None,
            err: None,
            history: Vec::new(),
            delegates: BTreeMap::new(),
            current: None,
            bindings: BTreeMap::new(),
            close_requested: false,
            act_index: FIRST_ACT_INDEX,
            act_indexes: HashMap::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn inspector(&self) -> Inspector {
        Inspector::new(self.depth, self.plain)
    }

    /// Record a trimmed input line in history.
    ///
    /// `last` is replaced by the most recent recorded line and is never
    /// recorded itself. Returns the text to evaluate.
    pub fn record(&mut self, line: &str) -> String {
        let line = line.trim();
        if line == "last" {
            return self
                .history
                .last()
                .cloned()
                .unwrap_or_else(|| line.to_string());
        }
        if !line.is_empty() {
            self.history.push(line.to_string());
        }
        line.to_string()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Ask the session task to stop after the current line.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    /// Scope for a script: the session's bindings plus read-only built-ins.
    pub fn scope(&self) -> Scope {
        let mut scope = Scope::new(self.bindings.clone())
            .with_builtin("session", json!(self.id.as_str()))
            .with_builtin("history", json!(self.history))
            .with_builtin("depth", json!(self.depth))
            .with_builtin("plain", json!(self.plain));
        if let Some(out) = &self.out {
            scope = scope.with_builtin("out", out.clone());
        }
        if let Some(err) = &self.err {
            scope = scope.with_builtin("err", err.clone());
        }
        scope
    }

    /// Keep the bindings a script left behind.
    pub fn absorb(&mut self, scope: Scope) {
        self.bindings = scope.into_bindings();
    }

    /// Name of the current delegate.
    pub fn delegate_name(&self) -> &str {
        self.current.as_deref().unwrap_or(ROOT_DELEGATE)
    }

    pub fn delegate_names(&self) -> Vec<&str> {
        std::iter::once(ROOT_DELEGATE)
            .chain(self.delegates.keys().map(String::as_str))
            .collect()
    }

    /// Fields merged into messages by the current delegate.
    pub fn fixed_fields(&self) -> Option<&Map> {
        self.current
            .as_ref()
            .and_then(|name| self.delegates.get(name))
            .map(|d| &d.fixed)
    }

    /// Create a delegate. Fails on the reserved name and on duplicates.
    pub fn create_delegate(&mut self, name: &str, fixed: Map) -> Result<(), String> {
        if name == ROOT_DELEGATE {
            return Err(format!("ERROR: delegate name {} is reserved", name));
        }
        if self.delegates.contains_key(name) {
            return Err(format!("ERROR: delegate {} already exists", name));
        }
        self.delegates.insert(
            name.to_string(),
            Delegate {
                name: name.to_string(),
                fixed,
            },
        );
        Ok(())
    }

    /// Switch to a delegate by name; `root` switches back to the top level.
    pub fn use_delegate(&mut self, name: &str) -> Result<(), String> {
        if name == ROOT_DELEGATE {
            self.current = None;
            return Ok(());
        }
        if !self.delegates.contains_key(name) {
            return Err(format!("ERROR: unknown delegate {}", name));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// The trace line for a host event, if tracing applies to it.
    ///
    /// Act indexes are assigned for every event of this session so that
    /// `OUT` lines pair with their `IN` line even when tracing was toggled
    /// in between.
    pub fn trace_line(&mut self, event: &HostEvent) -> Option<String> {
        if event.session() != Some(self.id.as_str()) {
            return None;
        }

        let line = match event {
            HostEvent::ActIn {
                act_id,
                pattern,
                action_id,
                message,
                ..
            } => {
                self.act_index += 1;
                self.act_indexes.insert(act_id.clone(), self.act_index);
                format!(
                    "IN  {}: {} # {} {} {}",
                    fmt_index(self.act_index),
                    self.single_line(message),
                    act_id,
                    pattern,
                    action_id
                )
            }
            HostEvent::ActOut { act_id, result, .. } => {
                let index = self.act_indexes.remove(act_id)?;
                format!("OUT {}: {}", fmt_index(index), self.single_line(result))
            }
            HostEvent::ActErr {
                act_id, message, ..
            } => {
                let index = self.act_indexes.remove(act_id)?;
                format!("ERR {}: {}", fmt_index(index), message)
            }
            HostEvent::Log { .. } => return None,
        };

        self.trace.then_some(line)
    }

    /// The captured form of a host log event, if capture applies to it.
    pub fn log_line(&self, event: &HostEvent) -> Option<String> {
        let HostEvent::Log { line, .. } = event else {
            return None;
        };
        if !self.log_capture {
            return None;
        }
        match &self.log_match {
            Some(filter) if !line.contains(filter.as_str()) => None,
            _ => Some(format!("LOG: {}", line)),
        }
    }

    fn single_line(&self, value: &Value) -> String {
        let mut inspector = self.inspector();
        inspector.break_length = usize::MAX;
        inspector.inspect(value)
    }
}

fn fmt_index(index: u64) -> String {
    index.to_string().chars().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SessionContext {
        SessionContext::new(SessionId::new("s1"), "127.0.0.1:30303", &ReplOptions::default())
    }

    fn act_in(session: &str, act_id: &str) -> HostEvent {
        HostEvent::ActIn {
            act_id: act_id.into(),
            session: Some(session.into()),
            pattern: "a:1".into(),
            action_id: "root/0".into(),
            message: json!({"a": 1}),
        }
    }

    #[test]
    fn test_defaults_from_options() {
        let ctx = context();
        assert_eq!(ctx.depth, Some(11));
        assert!(ctx.aliases.contains_key("stats"));
        assert!(!ctx.trace);
        assert_eq!(ctx.delegate_name(), "root");
    }

    #[test]
    fn test_record_last() {
        let mut ctx = context();
        assert_eq!(ctx.record("last"), "last");
        assert!(ctx.history().is_empty());

        assert_eq!(ctx.record("  x:1 "), "x:1");
        assert_eq!(ctx.record("last"), "x:1");
        assert_eq!(ctx.record("last"), "x:1");
        assert_eq!(ctx.history(), ["x:1"]);
    }

    #[test]
    fn test_scope_builtins_and_bindings() {
        let mut ctx = context();
        ctx.out = Some(json!({"x": 1}));
        ctx.bind("a", json!(2));

        let mut scope = ctx.scope();
        assert_eq!(scope.get("session"), Some(&json!("s1")));
        assert_eq!(scope.get("out"), Some(&json!({"x": 1})));
        assert_eq!(scope.get("err"), None);
        assert_eq!(scope.get("a"), Some(&json!(2)));

        scope.set("b", json!(3));
        ctx.absorb(scope);
        assert_eq!(ctx.binding("b"), Some(&json!(3)));
    }

    #[test]
    fn test_delegates() {
        let mut ctx = context();
        let mut fixed = Map::new();
        fixed.insert("zone".into(), json!("z1"));

        assert!(ctx.create_delegate("root", Map::new()).is_err());
        ctx.create_delegate("d1", fixed).unwrap();
        assert!(ctx.create_delegate("d1", Map::new()).is_err());
        assert!(ctx.use_delegate("nope").is_err());

        assert!(ctx.fixed_fields().is_none());
        ctx.use_delegate("d1").unwrap();
        assert_eq!(ctx.delegate_name(), "d1");
        assert_eq!(ctx.fixed_fields().unwrap()["zone"], json!("z1"));
        assert_eq!(ctx.delegate_names(), vec!["root", "d1"]);

        ctx.use_delegate("root").unwrap();
        assert!(ctx.fixed_fields().is_none());
    }

    #[test]
    fn test_trace_lines() {
        let mut ctx = context();
        assert_eq!(ctx.trace_line(&act_in("s1", "a")), None);

        ctx.trace = true;
        let line = ctx.trace_line(&act_in("s1", "b")).unwrap();
        assert_eq!(line, "IN  000002: { a: 1 } # b a:1 root/0");

        let out = HostEvent::ActOut {
            act_id: "b".into(),
            session: Some("s1".into()),
            result: json!({"ok": true}),
        };
        assert_eq!(ctx.trace_line(&out).unwrap(), "OUT 000002: { ok: true }");

        let err = HostEvent::ActErr {
            act_id: "a".into(),
            session: Some("s1".into()),
            message: "boom".into(),
        };
        assert_eq!(ctx.trace_line(&err).unwrap(), "ERR 000001: boom");
    }

    #[test]
    fn test_trace_ignores_other_sessions() {
        let mut ctx = context();
        ctx.trace = true;
        assert_eq!(ctx.trace_line(&act_in("other", "a")), None);
    }

    #[test]
    fn test_log_capture_and_match() {
        let mut ctx = context();
        let event = HostEvent::Log {
            session: None,
            line: "act 1 OUT a:1".into(),
        };
        assert_eq!(ctx.log_line(&event), None);

        ctx.log_capture = true;
        assert_eq!(ctx.log_line(&event).unwrap(), "LOG: act 1 OUT a:1");

        ctx.log_match = Some("ERR".into());
        assert_eq!(ctx.log_line(&event), None);
    }
}
