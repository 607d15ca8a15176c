//! Alias resolution.

use std::collections::BTreeMap;

/// A line after alias resolution, split into command name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    line: String,
    name_end: usize,
}

impl Resolved {
    fn split(line: String) -> Self {
        let name_end = line.find(char::is_whitespace).unwrap_or(line.len());
        Self { line, name_end }
    }

    /// The full line to dispatch.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The leading token.
    pub fn name(&self) -> &str {
        &self.line[..self.name_end]
    }

    /// Everything after the leading token, leading whitespace included.
    pub fn args(&self) -> &str {
        &self.line[self.name_end..]
    }
}

/// Resolve a trimmed line against `aliases`.
///
/// A whole-line alias is applied first. Then the leading token is checked
/// on its own, and when it is an alias the expansion replaces just that
/// token. Each step runs once: a token expansion is never matched against
/// the whole-line aliases again.
pub fn resolve(line: &str, aliases: &BTreeMap<String, String>) -> Resolved {
    let line = aliases
        .get(line)
        .map_or_else(|| line.to_string(), |expansion| expansion.clone());

    let first = Resolved::split(line);
    match aliases.get(first.name()) {
        Some(expansion) => Resolved::split(format!("{}{}", expansion, first.args())),
        None => first,
    }
}
