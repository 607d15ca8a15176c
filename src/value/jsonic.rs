//! Permissive structured-data parser.
//!
//! Accepts a relaxed superset of JSON as typed at a prompt:
//!
//! - top-level objects without braces: `a:1,b:2` or `a:1 b:2`
//! - path sugar: `a:b:1` is `{a:{b:1}}`
//! - bare text values and keys, single or double quoted strings
//! - trailing and repeated commas
//! - top-level value sequences (`1 2 3`), parsed as an array
//!
//! Empty input parses to an empty object.

use serde_json::{Number, Value};
use thiserror::Error;

use super::{deep_merge, Map, MAX_DEPTH};

/// Failure to parse permissive structured text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Colon,
    Comma,
    Quoted(String),
    Text(String),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

/// Parse a complete permissive expression.
pub fn parse(src: &str) -> Result<Value, ParseError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
        depth: 0,
    };
    let value = parser.top()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::new("unexpected trailing input", token.offset));
    }
    Ok(value)
}

/// Parse a single value, as used for the right-hand side of `set`.
///
/// Unlike [`parse`], only one value is accepted: `a:1` must be braced to
/// be read as an object.
pub fn parse_value(src: &str) -> Result<Value, ParseError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Ok(Value::Null);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
        depth: 0,
    };
    let value = parser.value()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::new("unexpected trailing input", token.offset));
    }
    Ok(value)
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '{' | '}' | '[' | ']' | ':' | ',')
}

fn lex(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let tok = match c {
            '{' => Tok::OpenBrace,
            '}' => Tok::CloseBrace,
            '[' => Tok::OpenBracket,
            ']' => Tok::CloseBracket,
            ':' => Tok::Colon,
            ',' => Tok::Comma,
            '"' | '\'' => {
                chars.next();
                let text = lex_quoted(&mut chars, c, offset)?;
                tokens.push(Token {
                    tok: Tok::Quoted(text),
                    offset,
                });
                continue;
            }
            _ => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || is_delimiter(c) {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    tok: Tok::Text(text),
                    offset,
                });
                continue;
            }
        };

        chars.next();
        tokens.push(Token { tok, offset });
    }

    Ok(tokens)
}

fn lex_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, ParseError> {
    let mut out = String::new();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c == quote => return Ok(out),
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or_else(|| ParseError::new("unterminated escape", offset))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => {
                        let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| ParseError::new("invalid unicode escape", offset))?;
                        out.push(code);
                    }
                    other => out.push(other),
                }
            }
            c => out.push(c),
        }
    }

    Err(ParseError::new("unterminated string", start))
}

/// Classify bare text as a number, literal, or plain string.
fn bare_value(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if looks_numeric(text) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    Value::String(text.to_string())
}

fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_tok(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        offset: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new("nesting too deep", offset));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn at_key(&self) -> bool {
        matches!(self.peek_tok(0), Some(Tok::Text(_) | Tok::Quoted(_)))
            && matches!(self.peek_tok(1), Some(Tok::Colon))
    }

    fn top(&mut self) -> Result<Value, ParseError> {
        if self.at_key() {
            return self.pairs(None).map(Value::Object);
        }

        let first = self.value()?;
        while matches!(self.peek_tok(0), Some(Tok::Comma)) {
            self.advance();
        }
        if self.peek().is_none() {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.peek().is_some() {
            if matches!(self.peek_tok(0), Some(Tok::Comma)) {
                self.advance();
                continue;
            }
            items.push(self.value()?);
        }
        Ok(Value::Array(items))
    }

    /// Parse key/value pairs until `end` (or end of input when `None`).
    fn pairs(&mut self, end: Option<Tok>) -> Result<Map, ParseError> {
        let mut map = Map::new();

        loop {
            match (self.peek_tok(0), &end) {
                (Some(Tok::Comma), _) => {
                    self.advance();
                    continue;
                }
                (None, None) => break,
                (Some(tok), Some(end)) if tok == end => break,
                (None, Some(_)) => {
                    return Err(ParseError::new("unterminated object", self.len));
                }
                _ => {}
            }

            let offset = self.offset();
            let key = match self.advance().map(|t| t.tok) {
                Some(Tok::Text(key)) | Some(Tok::Quoted(key)) => key,
                _ => return Err(ParseError::new("expected key", offset)),
            };

            match self.advance().map(|t| t.tok) {
                Some(Tok::Colon) => {}
                _ => return Err(ParseError::new("expected ':' after key", self.offset())),
            }

            let value = self.pair_value(&end)?;
            insert_merged(&mut map, key, value);
        }

        Ok(map)
    }

    fn pair_value(&mut self, end: &Option<Tok>) -> Result<Value, ParseError> {
        if self.at_key() {
            let offset = self.offset();
            let key = match self.advance().map(|t| t.tok) {
                Some(Tok::Text(key)) | Some(Tok::Quoted(key)) => key,
                _ => return Err(ParseError::new("expected key", offset)),
            };
            self.advance();
            let inner = self.nested(offset, |p| p.pair_value(end))?;
            let mut nested = Map::new();
            nested.insert(key, inner);
            return Ok(Value::Object(nested));
        }

        match (self.peek_tok(0), end) {
            (None, _) | (Some(Tok::Comma), _) => Ok(Value::Null),
            (Some(tok), Some(end)) if tok == end => Ok(Value::Null),
            _ => self.value(),
        }
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        let offset = self.offset();
        let token = self
            .advance()
            .ok_or_else(|| ParseError::new("unexpected end of input", offset))?;

        match token.tok {
            Tok::OpenBrace => self.nested(token.offset, |p| {
                let map = p.pairs(Some(Tok::CloseBrace))?;
                p.advance();
                Ok(Value::Object(map))
            }),
            Tok::OpenBracket => self.nested(token.offset, |p| {
                let mut items = Vec::new();
                loop {
                    match p.peek_tok(0) {
                        Some(Tok::CloseBracket) => {
                            p.advance();
                            break;
                        }
                        Some(Tok::Comma) => {
                            p.advance();
                        }
                        None => {
                            return Err(ParseError::new("unterminated array", p.len));
                        }
                        _ => items.push(p.value()?),
                    }
                }
                Ok(Value::Array(items))
            }),
            Tok::Quoted(text) => Ok(Value::String(text)),
            Tok::Text(text) => Ok(bare_value(&text)),
            other => Err(ParseError::new(
                format!("unexpected {}", describe(&other)),
                token.offset,
            )),
        }
    }
}

fn describe(tok: &Tok) -> &'static str {
    match tok {
        Tok::OpenBrace => "'{'",
        Tok::CloseBrace => "'}'",
        Tok::OpenBracket => "'['",
        Tok::CloseBracket => "']'",
        Tok::Colon => "':'",
        Tok::Comma => "','",
        Tok::Quoted(_) => "string",
        Tok::Text(_) => "text",
    }
}

fn insert_merged(map: &mut Map, key: String, value: Value) {
    if value.is_object() {
        if let Some(existing @ Value::Object(_)) = map.get_mut(&key) {
            deep_merge(existing, value);
            return;
        }
    }
    map.insert(key, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_braceless_object() {
        let v = parse("a:1,x:2").unwrap();
        assert_eq!(v, json!({"a": 1, "x": 2}));
    }

    #[test]
    fn test_space_separated_pairs() {
        let v = parse("a:1 x:3").unwrap();
        assert_eq!(v, json!({"a": 1, "x": 3}));
    }

    #[test]
    fn test_field_order_preserved() {
        let v = parse("sys:repl,echo:true,x:1").unwrap();
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["sys", "echo", "x"]);
    }

    #[test]
    fn test_path_sugar() {
        let v = parse("a:b:c:1").unwrap();
        assert_eq!(v, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_nested_and_trailing_commas() {
        let v = parse("{a:[1,2,],b:{c:'x y',},}").unwrap();
        assert_eq!(v, json!({"a": [1, 2], "b": {"c": "x y"}}));
    }

    #[test]
    fn test_literals() {
        let v = parse("a:true,b:false,c:null,d:-1.5,e:text").unwrap();
        assert_eq!(
            v,
            json!({"a": true, "b": false, "c": null, "d": -1.5, "e": "text"})
        );
    }

    #[test]
    fn test_bare_scalar_is_not_object() {
        assert_eq!(parse("1+2").unwrap(), json!("1+2"));
        assert_eq!(parse("42").unwrap(), json!(42));
    }

    #[test]
    fn test_value_sequence_is_array() {
        assert!(parse("1 + 2").unwrap().is_array());
        assert!(parse("x = 1").unwrap().is_array());
    }

    #[test]
    fn test_braced_object_with_trailing_comma() {
        assert_eq!(parse("{a:1},").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_empty_is_empty_object() {
        assert_eq!(parse("   ").unwrap(), json!({}));
    }

    #[test]
    fn test_missing_value_is_null() {
        assert_eq!(parse("a:,b:1").unwrap(), json!({"a": null, "b": 1}));
    }

    #[test]
    fn test_duplicate_objects_merge() {
        let v = parse("a:b:1,a:c:2").unwrap();
        assert_eq!(v, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_errors() {
        assert!(parse("{a:1").is_err());
        assert!(parse("a:1 b").is_err());
        assert!(parse("'open").is_err());
        assert!(parse(":1").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());

        let err = parse(&"[".repeat(200_000)).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
        assert!(parse(&"{a:".repeat(200_000)).is_err());
        assert!(parse(&"a:".repeat(200_000)).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("5").unwrap(), json!(5));
        assert_eq!(parse_value("red").unwrap(), json!("red"));
        assert_eq!(parse_value("{x:1}").unwrap(), json!({"x": 1}));
        assert_eq!(parse_value("").unwrap(), Value::Null);
        assert!(parse_value("a b").is_err());
    }
}
