//! The host system that structured messages are submitted to.
//!
//! The REPL core only talks to the host through the [`Host`] trait: submit
//! a message and await its result, read and merge options, introspect the
//! registered patterns, run entity operations and watch the event stream
//! for tracing. [`LocalHost`] is the in-process implementation.

mod local;
mod pattern;

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;

pub use local::{ActionFn, CloseHook, LocalHost};
pub use pattern::Pattern;

/// Error reported by the host for a message or entity operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct HostError {
    pub code: String,
    pub message: String,
}

impl HostError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The error as a structured value, `{code, message}`.
    pub fn to_value(&self) -> Value {
        json!({ "code": self.code, "message": self.message })
    }
}

/// Who the host is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub version: String,
}

/// Per-submission metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActMeta {
    /// The session the message originated from, for trace attribution.
    pub session: Option<String>,
}

impl ActMeta {
    pub fn for_session(id: impl Into<String>) -> Self {
        Self {
            session: Some(id.into()),
        }
    }
}

/// Description of a registered action and its prior definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub id: String,
    pub pattern: String,
    pub plugin: String,
    pub prior: Option<Box<ActionInfo>>,
}

impl ActionInfo {
    pub fn to_value(&self) -> Value {
        json!({ "id": self.id, "plugin": self.plugin, "pattern": self.pattern })
    }

    /// This definition followed by each prior, newest first.
    pub fn chain(&self) -> Vec<&ActionInfo> {
        let mut out = vec![self];
        let mut current = self;
        while let Some(prior) = current.prior.as_deref() {
            out.push(prior);
            current = prior;
        }
        out
    }
}

/// Events broadcast by the host while it processes messages.
#[derive(Debug, Clone)]
pub enum HostEvent {
    ActIn {
        act_id: String,
        session: Option<String>,
        pattern: String,
        action_id: String,
        message: Value,
    },
    ActOut {
        act_id: String,
        session: Option<String>,
        result: Value,
    },
    ActErr {
        act_id: String,
        session: Option<String>,
        message: String,
    },
    Log {
        session: Option<String>,
        line: String,
    },
}

impl HostEvent {
    /// The session this event belongs to, if any.
    pub fn session(&self) -> Option<&str> {
        match self {
            HostEvent::ActIn { session, .. }
            | HostEvent::ActOut { session, .. }
            | HostEvent::ActErr { session, .. }
            | HostEvent::Log { session, .. } => session.as_deref(),
        }
    }
}

/// Entity persistence operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOp {
    List,
    Load,
    Save,
    Remove,
}

impl EntityOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityOp::List => "list$",
            EntityOp::Load => "load$",
            EntityOp::Save => "save$",
            EntityOp::Remove => "remove$",
        }
    }
}

impl fmt::Display for EntityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static CANON_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(([^\s/]+)/?([^\s/]+)?/?([^\s/]+)?)(\s+.+)?$")
        .expect("canon pattern is valid")
});

/// An entity type address: `[[zone/]base/]name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Canon {
    pub zone: Option<String>,
    pub base: Option<String>,
    pub name: String,
}

impl Canon {
    /// Split `[[zone/]base/]name [query]` into the canon and the query text.
    pub fn parse_with_query(text: &str) -> Option<(Canon, String)> {
        let caps = CANON_QUERY.captures(text)?;
        let parts: Vec<String> = [2, 3, 4]
            .iter()
            .filter_map(|i| caps.get(*i).map(|m| m.as_str().to_string()))
            .collect();
        let query = caps
            .get(5)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let canon = match parts.as_slice() {
            [name] => Canon {
                zone: None,
                base: None,
                name: name.clone(),
            },
            [base, name] => Canon {
                zone: None,
                base: Some(base.clone()),
                name: name.clone(),
            },
            [zone, base, name] => Canon {
                zone: Some(zone.clone()),
                base: Some(base.clone()),
                name: name.clone(),
            },
            _ => return None,
        };
        Some((canon, query))
    }
}

impl fmt::Display for Canon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.zone.as_deref().unwrap_or("-"),
            self.base.as_deref().unwrap_or("-"),
            self.name
        )
    }
}

/// The narrow interface the REPL uses to reach the host system.
#[async_trait]
pub trait Host: Send + Sync {
    fn identity(&self) -> Identity;

    /// Submit a message and wait for its result.
    async fn act(&self, message: Value, meta: ActMeta) -> Result<Value, HostError>;

    /// Current options tree.
    fn options(&self) -> Value;

    /// Deep-merge `patch` into the options tree; returns the merged tree.
    fn set_options(&self, patch: Value) -> Value;

    /// Registered patterns that include every pair of `narrow`.
    fn list(&self, narrow: &Value) -> Vec<Value>;

    /// The action an exact or matching pattern resolves to.
    fn find(&self, narrow: &Value) -> Option<ActionInfo>;

    fn plugins(&self) -> Vec<String>;

    async fn entity(&self, op: EntityOp, canon: &Canon, query: Value) -> Result<Value, HostError>;

    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    /// Emit a log line, attributed to a session when known.
    fn log(&self, session: Option<&str>, line: &str);

    /// Run the host's own shutdown chain.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canon_forms() {
        let (c, q) = Canon::parse_with_query("foo").unwrap();
        assert_eq!(c.to_string(), "-/-/foo");
        assert_eq!(q, "");

        let (c, q) = Canon::parse_with_query("sys/user id:1").unwrap();
        assert_eq!(c.base.as_deref(), Some("sys"));
        assert_eq!(c.name, "user");
        assert_eq!(q, "id:1");

        let (c, _) = Canon::parse_with_query(" z/b/n").unwrap();
        assert_eq!(c.to_string(), "z/b/n");
    }

    #[test]
    fn test_canon_rejects_empty() {
        assert!(Canon::parse_with_query("").is_none());
        assert!(Canon::parse_with_query("   ").is_none());
    }

    #[test]
    fn test_action_chain() {
        let info = ActionInfo {
            id: "a2".into(),
            pattern: "a:1".into(),
            plugin: "p".into(),
            prior: Some(Box::new(ActionInfo {
                id: "a1".into(),
                pattern: "a:1".into(),
                plugin: "p".into(),
                prior: None,
            })),
        };
        let ids: Vec<&str> = info.chain().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
    }

    #[test]
    fn test_host_error_value() {
        let err = HostError::new("act_not_found", "no match");
        assert_eq!(err.to_string(), "act_not_found: no match");
        assert_eq!(err.to_value()["code"], "act_not_found");
    }
}
