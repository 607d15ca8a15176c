//! Tokenizer for script expressions.

use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

const PUNCT: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
    "=", "(", ")", "[", "]", "{", "}", ",", ".", ":", ";",
];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| EvalError::Syntax(format!("Invalid number {}", text)))?;
            tokens.push(Token::Num(n));
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match PUNCT.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.len();
            }
            None => return Err(EvalError::Syntax(format!("Invalid or unexpected token '{}'", c))),
        }
    }

    Ok(tokens)
}

fn string(chars: &[char], start: usize) -> Result<(String, usize), EvalError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => {
                i += 1;
                match chars.get(i) {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(*c),
                    None => break,
                }
            }
            c => out.push(c),
        }
        i += 1;
    }

    Err(EvalError::Syntax("Invalid or unexpected token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let tokens = tokenize("x = a.b[0] + 'q\\'s' >= 1.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".into()),
                Token::Punct("="),
                Token::Ident("a".into()),
                Token::Punct("."),
                Token::Ident("b".into()),
                Token::Punct("["),
                Token::Num(0.0),
                Token::Punct("]"),
                Token::Punct("+"),
                Token::Str("q's".into()),
                Token::Punct(">="),
                Token::Num(1.5),
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        let tokens = tokenize("a === b !== c").unwrap();
        assert_eq!(tokens[1], Token::Punct("==="));
        assert_eq!(tokens[3], Token::Punct("!=="));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(tokenize("'open"), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn test_unexpected_char() {
        assert!(matches!(tokenize("a # b"), Err(EvalError::Syntax(_))));
    }
}
