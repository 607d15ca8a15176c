//! Tree-walking interpreter.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{Number, Value};

use super::parser::{parse, Expr};
use super::{EvalError, Scope, ScriptEvaluator};
use crate::host::{ActMeta, Host};
use crate::value::{self, Map};

/// The default [`ScriptEvaluator`]: a small expression language over
/// JSON values with access to the host through `act()` and `options()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptEvaluator for Interpreter {
    fn evaluate(
        &self,
        source: &str,
        scope: &mut Scope,
        host: &dyn Host,
    ) -> Result<Option<Value>, EvalError> {
        let program = parse(source)?;
        let env = Env { host, meta: None };
        let value = eval(&program.expr, scope, env)
            .now_or_never()
            .ok_or(EvalError::AwaitPending)??;
        Ok(assign(scope, program.target, value))
    }

    async fn evaluate_async(
        &self,
        source: &str,
        scope: &mut Scope,
        host: &dyn Host,
        meta: ActMeta,
    ) -> Result<Option<Value>, EvalError> {
        let program = parse(source)?;
        let env = Env {
            host,
            meta: Some(&meta),
        };
        let value = eval(&program.expr, scope, env).await?;
        Ok(assign(scope, program.target, value))
    }
}

fn assign(scope: &mut Scope, target: Option<String>, value: Option<Value>) -> Option<Value> {
    if let Some(name) = target {
        scope.set(&name, value.clone().unwrap_or(Value::Null));
    }
    value
}

/// What the expression can reach. `meta` is present only when evaluating
/// asynchronously; without it host calls report [`EvalError::AwaitPending`].
#[derive(Clone, Copy)]
struct Env<'a> {
    host: &'a dyn Host,
    meta: Option<&'a ActMeta>,
}

type Eval<'a> = BoxFuture<'a, Result<Option<Value>, EvalError>>;

fn eval<'a>(expr: &'a Expr, scope: &'a mut Scope, env: Env<'a>) -> Eval<'a> {
    async move {
        let value = match expr {
            Expr::Num(n) => Some(number(*n)),
            Expr::Str(s) => Some(Value::String(s.clone())),
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Null => Some(Value::Null),
            Expr::Undefined => None,
            Expr::Ident(name) => match scope.get(name) {
                Some(value) => Some(value.clone()),
                None => {
                    return Err(EvalError::Runtime(format!(
                        "ReferenceError: {} is not defined",
                        name
                    )))
                }
            },
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(eval(item, scope, env).await?.unwrap_or(Value::Null));
                }
                Some(Value::Array(out))
            }
            Expr::Object(fields) => {
                let mut out = Map::new();
                for (key, item) in fields {
                    if let Some(value) = eval(item, scope, env).await? {
                        out.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(out))
            }
            Expr::Member(target, key) => {
                let target = eval(target, scope, env).await?;
                let key = eval(key, scope, env).await?;
                member(target, key)?
            }
            Expr::Unary(op, operand) => {
                let operand = eval(operand, scope, env).await?;
                Some(unary(op, operand)?)
            }
            Expr::Binary("&&", lhs, rhs) => {
                let left = eval(lhs, scope, env).await?;
                if truthy(left.as_ref()) {
                    eval(rhs, scope, env).await?
                } else {
                    left
                }
            }
            Expr::Binary("||", lhs, rhs) => {
                let left = eval(lhs, scope, env).await?;
                if truthy(left.as_ref()) {
                    left
                } else {
                    eval(rhs, scope, env).await?
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = eval(lhs, scope, env).await?;
                let right = eval(rhs, scope, env).await?;
                Some(binary(op, left, right)?)
            }
            Expr::Await(inner) => {
                if env.meta.is_none() {
                    return Err(EvalError::AwaitPending);
                }
                eval(inner, scope, env).await?
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval(arg, scope, env).await?);
                }
                call(name, values, env).await?
            }
        };
        Ok(value)
    }
    .boxed()
}

async fn call(
    name: &str,
    mut args: Vec<Option<Value>>,
    env: Env<'_>,
) -> Result<Option<Value>, EvalError> {
    let first = if args.is_empty() { None } else { args.swap_remove(0) };

    match name {
        "act" => {
            let Some(meta) = env.meta else {
                return Err(EvalError::AwaitPending);
            };
            let message = match first {
                Some(Value::String(text)) => {
                    value::parse(&text).map_err(|e| EvalError::Runtime(e.to_string()))?
                }
                Some(other) => other,
                None => Value::Null,
            };
            if !message.is_object() {
                return Err(EvalError::Runtime(
                    "TypeError: act expects a message object".to_string(),
                ));
            }
            Ok(Some(env.host.act(message, meta.clone()).await?))
        }
        "options" => Ok(Some(env.host.options())),
        "len" => match first {
            Some(Value::String(s)) => Ok(Some(Value::from(s.chars().count()))),
            Some(Value::Array(items)) => Ok(Some(Value::from(items.len()))),
            Some(Value::Object(map)) => Ok(Some(Value::from(map.len()))),
            _ => Err(EvalError::Runtime(
                "TypeError: len expects a string, array or object".to_string(),
            )),
        },
        "keys" => match first {
            Some(Value::Object(map)) => Ok(Some(Value::Array(
                map.keys().cloned().map(Value::String).collect(),
            ))),
            _ => Err(EvalError::Runtime("TypeError: keys expects an object".to_string())),
        },
        _ => Err(EvalError::Runtime(format!(
            "TypeError: {} is not a function",
            name
        ))),
    }
}

/// Convert an f64 result to a JSON number, preferring integers.
pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::Null) => Some(0.0),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => crate::value::format_number(n),
        Some(other) => other.to_string(),
    }
}

fn member(target: Option<Value>, key: Option<Value>) -> Result<Option<Value>, EvalError> {
    let key_text = text(key.as_ref());
    match target {
        None | Some(Value::Null) => Err(EvalError::Runtime(format!(
            "TypeError: Cannot read properties of {} (reading '{}')",
            text(target.as_ref()),
            key_text
        ))),
        Some(Value::Object(map)) => Ok(map.get(&key_text).cloned()),
        Some(Value::Array(mut items)) => match key_text.as_str() {
            "length" => Ok(Some(Value::from(items.len()))),
            index => Ok(index
                .parse::<usize>()
                .ok()
                .filter(|i| *i < items.len())
                .map(|i| items.swap_remove(i))),
        },
        Some(Value::String(s)) => match key_text.as_str() {
            "length" => Ok(Some(Value::from(s.chars().count()))),
            index => Ok(index
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))),
        },
        Some(_) => Ok(None),
    }
}

fn unary(op: &str, operand: Option<Value>) -> Result<Value, EvalError> {
    match op {
        "!" => Ok(Value::Bool(!truthy(operand.as_ref()))),
        _ => as_number(operand.as_ref())
            .map(|n| number(-n))
            .ok_or_else(|| type_error(op, &[operand.as_ref()])),
    }
}

fn binary(op: &str, left: Option<Value>, right: Option<Value>) -> Result<Value, EvalError> {
    let (l, r) = (left.as_ref(), right.as_ref());
    match op {
        "==" | "===" => Ok(Value::Bool(l == r)),
        "!=" | "!==" => Ok(Value::Bool(l != r)),
        "+" if matches!(l, Some(Value::String(_))) || matches!(r, Some(Value::String(_))) => {
            Ok(Value::String(format!("{}{}", text(l), text(r))))
        }
        "<" | "<=" | ">" | ">=" => {
            let ordering = match (l, r) {
                (Some(Value::String(a)), Some(Value::String(b))) => a.partial_cmp(b),
                _ => match (as_number(l), as_number(r)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            let result = ordering.is_some_and(|o| match op {
                "<" => o.is_lt(),
                "<=" => o.is_le(),
                ">" => o.is_gt(),
                _ => o.is_ge(),
            });
            Ok(Value::Bool(result))
        }
        _ => {
            let (Some(a), Some(b)) = (as_number(l), as_number(r)) else {
                return Err(type_error(op, &[l, r]));
            };
            let n = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" | "%" if b == 0.0 => {
                    return Err(EvalError::Runtime("RangeError: Division by zero".to_string()))
                }
                "/" => a / b,
                "%" => a % b,
                _ => return Err(type_error(op, &[l, r])),
            };
            Ok(number(n))
        }
    }
}

fn type_error(op: &str, operands: &[Option<&Value>]) -> EvalError {
    let kinds: Vec<&str> = operands.iter().map(|v| kind(*v)).collect();
    EvalError::Runtime(format!(
        "TypeError: unsupported operand for {}: {}",
        op,
        kinds.join(", ")
    ))
}

fn kind(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}
