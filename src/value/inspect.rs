//! Human-readable rendering of values for REPL output.

use serde_json::Value;

/// Renders values the way an interactive console prints them:
/// `{ a: 1, b: 'two' }`, with nesting cut off at a configurable depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspector {
    /// Nesting depth below which objects render as `[Object]`.
    /// `None` means unlimited.
    pub depth: Option<usize>,
    /// Render compact JSON instead of console style.
    pub plain: bool,
    /// Width beyond which containers are broken over several lines.
    pub break_length: usize,
}

impl Default for Inspector {
    fn default() -> Self {
        Self {
            depth: Some(2),
            plain: false,
            break_length: 80,
        }
    }
}

impl Inspector {
    pub fn new(depth: Option<usize>, plain: bool) -> Self {
        Self {
            depth,
            plain,
            ..Self::default()
        }
    }

    /// Render a value.
    pub fn inspect(&self, value: &Value) -> String {
        if self.plain {
            return serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        }
        self.render(value, 0)
    }

    /// Render an optional value, using `undefined` for `None`.
    pub fn inspect_opt(&self, value: Option<&Value>) -> String {
        match value {
            Some(value) => self.inspect(value),
            None => "undefined".to_string(),
        }
    }

    fn render(&self, value: &Value, level: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::String(s) => quote(s),
            Value::Array(items) if items.is_empty() => "[]".to_string(),
            Value::Object(map) if map.is_empty() => "{}".to_string(),
            Value::Array(_) if self.too_deep(level) => "[Array]".to_string(),
            Value::Object(_) if self.too_deep(level) => "[Object]".to_string(),
            Value::Array(items) => {
                let entries: Vec<String> = items
                    .iter()
                    .map(|item| self.render(item, level + 1))
                    .collect();
                self.wrap('[', ']', entries)
            }
            Value::Object(map) => {
                let entries: Vec<String> = map
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key_text(key), self.render(value, level + 1)))
                    .collect();
                self.wrap('{', '}', entries)
            }
        }
    }

    fn too_deep(&self, level: usize) -> bool {
        self.depth.is_some_and(|depth| level > depth)
    }

    fn wrap(&self, open: char, close: char, entries: Vec<String>) -> String {
        let width: usize = entries.iter().map(|e| e.len() + 2).sum::<usize>() + 2;
        if width <= self.break_length && !entries.iter().any(|e| e.contains('\n')) {
            return format!("{} {} {}", open, entries.join(", "), close);
        }

        let body: Vec<String> = entries
            .iter()
            .map(|entry| format!("  {}", entry.replace('\n', "\n  ")))
            .collect();
        format!("{}\n{}\n{}", open, body.join(",\n"), close)
    }
}

/// Format a number the way a JavaScript console does (`3`, not `3.0`).
pub(crate) fn format_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() => f.to_string(),
        _ => n.to_string(),
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn key_text(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}
