//! Structured-message recognition.
//!
//! `a:1,b:2` submits `{a:1,b:2}`. A suffix `=> name = path` stores
//! `path` of `{out, err}` under `name` once the result arrives. Backtick
//! references such as `` `out.id` `` are replaced with session values
//! before parsing.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::script::Scope;
use crate::value::{self, reach, Map};

static BINDING_ARROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*=>\s*").expect("arrow pattern is valid"));

static BINDING_ASSIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*=\s*").expect("assign pattern is valid"));

static INJECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("injection pattern is valid"));

/// Where to store part of a message result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    /// Dotted path into `{out, err}`.
    pub path: String,
}

/// A line recognised as a message for the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub body: Map,
    pub binding: Option<Binding>,
}

/// Try to read `line` as a structured message.
///
/// Returns `None` when the text does not parse, or parses to anything other
/// than an object; such lines fall through to script evaluation.
pub fn parse(line: &str, scope: &Scope) -> Option<Message> {
    let parts: Vec<&str> = BINDING_ARROW.split(line).collect();
    let (text, binding) = match parts.as_slice() {
        [text, target] => (*text, parse_binding(target)),
        _ => (line, None),
    };

    match value::parse(&inject(text, scope)) {
        Ok(Value::Object(body)) if !body.is_empty() => Some(Message { body, binding }),
        _ => None,
    }
}

fn parse_binding(target: &str) -> Option<Binding> {
    let parts: Vec<&str> = BINDING_ASSIGN.split(target.trim()).collect();
    match parts.as_slice() {
        [name, path] if !name.is_empty() => Some(Binding {
            name: name.to_string(),
            path: path.to_string(),
        }),
        _ => None,
    }
}

/// Replace each `` `name.path` `` with the value it names in `scope`.
///
/// Strings are inserted bare, other values as JSON. Unknown references are
/// left untouched.
fn inject(text: &str, scope: &Scope) -> String {
    INJECTION
        .replace_all(text, |caps: &Captures| {
            let reference = &caps[1];
            let (head, rest) = reference.split_once('.').unwrap_or((reference, ""));
            match scope.get(head).and_then(|root| reach(root, rest)) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
