//! Pratt parser producing the expression tree.

use super::lexer::{tokenize, Token};
use super::EvalError;
use crate::value::MAX_DEPTH;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Await(Box<Expr>),
}

/// A parsed script: an expression, optionally assigned to a binding.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub target: Option<String>,
    pub expr: Expr,
}

pub(crate) fn parse(src: &str) -> Result<Program, EvalError> {
    let mut tokens = tokenize(src)?;
    while tokens.last() == Some(&Token::Punct(";")) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Ok(Program {
            target: None,
            expr: Expr::Undefined,
        });
    }

    let target = match (tokens.first(), tokens.get(1)) {
        (Some(Token::Ident(name)), Some(Token::Punct("="))) => Some(name.clone()),
        _ => None,
    };
    let skip = if target.is_some() { 2 } else { 0 };

    let mut parser = Parser {
        tokens,
        pos: skip,
        depth: 0,
    };
    let expr = parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(EvalError::Syntax(format!("Unexpected token {}", describe(token))));
    }
    Ok(Program { target, expr })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Num(n) => format!("number {}", n),
        Token::Str(_) => "string".to_string(),
        Token::Ident(name) => format!("identifier '{}'", name),
        Token::Punct(p) => format!("'{}'", p),
    }
}

fn binding_power(op: &str) -> Option<u8> {
    match op {
        "||" => Some(1),
        "&&" => Some(2),
        "==" | "!=" | "===" | "!==" => Some(3),
        "<" | "<=" | ">" | ">=" => Some(4),
        "+" | "-" => Some(5),
        "*" | "/" | "%" => Some(6),
        _ => None,
    }
}

const PREFIX_POWER: u8 = 7;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, EvalError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| EvalError::Syntax("Unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), EvalError> {
        if self.eat(punct) {
            Ok(())
        } else {
            match self.peek() {
                Some(token) => Err(EvalError::Syntax(format!(
                    "Unexpected token {}, expected '{}'",
                    describe(token),
                    punct
                ))),
                None => Err(EvalError::Syntax("Unexpected end of input".to_string())),
            }
        }
    }

    fn expr(&mut self, min_power: u8) -> Result<Expr, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::Syntax("Expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let expr = self.binary(min_power);
        self.depth -= 1;
        expr
    }

    fn binary(&mut self, min_power: u8) -> Result<Expr, EvalError> {
        let mut lhs = self.prefix()?;

        loop {
            let op = match self.peek() {
                Some(Token::Punct(p)) => *p,
                _ => break,
            };
            let Some(power) = binding_power(op) else {
                break;
            };
            if power <= min_power {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(power)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, EvalError> {
        let expr = match self.next()? {
            Token::Num(n) => Expr::Num(n),
            Token::Str(s) => Expr::Str(s),
            Token::Ident(name) => match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                "undefined" => Expr::Undefined,
                "await" => Expr::Await(Box::new(self.expr(PREFIX_POWER)?)),
                _ if self.eat("(") => Expr::Call(name, self.list(")")?),
                _ => Expr::Ident(name),
            },
            Token::Punct("-") => Expr::Unary("-", Box::new(self.expr(PREFIX_POWER)?)),
            Token::Punct("!") => Expr::Unary("!", Box::new(self.expr(PREFIX_POWER)?)),
            Token::Punct("(") => {
                let inner = self.expr(0)?;
                self.expect(")")?;
                inner
            }
            Token::Punct("[") => Expr::Array(self.list("]")?),
            Token::Punct("{") => self.object()?,
            token => {
                return Err(EvalError::Syntax(format!(
                    "Unexpected token {}",
                    describe(&token)
                )))
            }
        };
        self.postfix(expr)
    }

    fn postfix(&mut self, mut expr: Expr) -> Result<Expr, EvalError> {
        loop {
            if self.eat(".") {
                match self.next()? {
                    Token::Ident(name) => {
                        expr = Expr::Member(Box::new(expr), Box::new(Expr::Str(name)));
                    }
                    token => {
                        return Err(EvalError::Syntax(format!(
                            "Unexpected token {}",
                            describe(&token)
                        )))
                    }
                }
            } else if self.eat("[") {
                let index = self.expr(0)?;
                self.expect("]")?;
                expr = Expr::Member(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn list(&mut self, close: &str) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expr(0)?);
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn object(&mut self) -> Result<Expr, EvalError> {
        let mut fields = Vec::new();
        while !self.eat("}") {
            let key = match self.next()? {
                Token::Ident(name) | Token::Str(name) => name,
                Token::Num(n) => n.to_string(),
                token => {
                    return Err(EvalError::Syntax(format!(
                        "Unexpected token {}",
                        describe(&token)
                    )))
                }
            };
            self.expect(":")?;
            fields.push((key, self.expr(0)?));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(fields))
    }
}
