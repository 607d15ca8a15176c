//! Structured values: permissive parsing, dotted paths, and rendering.
//!
//! All structured data in repl-tunnel is carried as [`serde_json::Value`]
//! with insertion order preserved, so a message echoes back with its fields
//! in the order they were typed.

mod inspect;
mod jsonic;
mod path;

pub use inspect::Inspector;
pub(crate) use inspect::format_number;
pub use jsonic::{parse, parse_value, ParseError};
pub use path::{build_path, deep_merge, reach};

/// Deepest nesting accepted from parsed input.
///
/// Parsers and path builders recurse once per level, so input past this
/// depth is rejected instead of exhausting the stack.
pub const MAX_DEPTH: usize = 128;

/// An ordered JSON object.
pub type Map = serde_json::Map<String, serde_json::Value>;
