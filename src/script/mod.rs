//! Fallback script evaluation.
//!
//! Input that is neither a command nor a structured message is handed to a
//! [`ScriptEvaluator`]. Evaluation is attempted immediately first; when the
//! expression needs to wait on the host (`await`, `act(...)`) the immediate
//! attempt fails with [`EvalError::AwaitPending`] and the caller retries
//! with [`ScriptEvaluator::evaluate_async`].
//!
//! The bundled [`Interpreter`] is a restricted expression language, not a
//! general-purpose scripting engine:
//!
//! ```text
//! 1 + 2                  arithmetic, comparison, && || !
//! x = out.items[0]       top-level assignment to a session binding
//! await act('a:1')       submit a message through the host
//! len(keys(options()))   built-in functions: act options len keys
//! ```

mod eval;
mod lexer;
mod parser;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::host::{ActMeta, Host, HostError};

pub use eval::Interpreter;

/// Script evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// The expression must suspend; retry asynchronously.
    #[error("await is only valid in async functions")]
    AwaitPending,

    #[error("{0}")]
    Runtime(String),

    #[error("{}", .0.message)]
    Host(#[from] HostError),
}

/// Variables visible to a script.
///
/// Built-ins (the session id, the last `out`/`err`, and so on) are
/// read-only; assignments always land in the bindings, which the session
/// keeps between lines.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    builtins: BTreeMap<String, Value>,
    bindings: BTreeMap<String, Value>,
}

impl Scope {
    pub fn new(bindings: BTreeMap<String, Value>) -> Self {
        Self {
            builtins: BTreeMap::new(),
            bindings,
        }
    }

    pub fn with_builtin(mut self, name: &str, value: Value) -> Self {
        self.builtins.insert(name.to_string(), value);
        self
    }

    /// Bindings shadow built-ins.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .get(name)
            .or_else(|| self.builtins.get(name))
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    pub fn into_bindings(self) -> BTreeMap<String, Value> {
        self.bindings
    }
}

/// Evaluates fallback script text.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    /// Evaluate without suspending. Returns `Ok(None)` for `undefined`.
    fn evaluate(
        &self,
        source: &str,
        scope: &mut Scope,
        host: &dyn Host,
    ) -> Result<Option<Value>, EvalError>;

    /// Evaluate as an asynchronous block, awaiting host calls.
    async fn evaluate_async(
        &self,
        source: &str,
        scope: &mut Scope,
        host: &dyn Host,
        meta: ActMeta,
    ) -> Result<Option<Value>, EvalError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;
    use serde_json::json;

    fn run(src: &str) -> Result<Option<Value>, EvalError> {
        let host = LocalHost::new(json!({"a": {"b": 1}}));
        let mut scope = Scope::new(BTreeMap::new()).with_builtin("session", json!("s1"));
        Interpreter.evaluate(src, &mut scope, host.as_ref())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("1+2"), Ok(Some(json!(3))));
        assert_eq!(run("7 % 4 * 2"), Ok(Some(json!(6))));
        assert_eq!(run("1 / 4"), Ok(Some(json!(0.25))));
        assert_eq!(run("-(2 - 5)"), Ok(Some(json!(3))));
    }

    #[test]
    fn test_strings_and_logic() {
        assert_eq!(run("'a' + 1"), Ok(Some(json!("a1"))));
        assert_eq!(run("1 < 2 && 'x' || 'y'"), Ok(Some(json!("x"))));
        assert_eq!(run("!0"), Ok(Some(json!(true))));
        assert_eq!(run("'abc'.length"), Ok(Some(json!(3))));
    }

    #[test]
    fn test_literals_and_member_access() {
        assert_eq!(run("{a: [1, {b: 2}]}.a[1].b"), Ok(Some(json!(2))));
        assert_eq!(run("[1,2,3].length"), Ok(Some(json!(3))));
        assert_eq!(run("{a: 1}.zed"), Ok(None));
        assert_eq!(run("undefined"), Ok(None));
        assert_eq!(run(""), Ok(None));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(run("session"), Ok(Some(json!("s1"))));
        assert_eq!(run("options().a.b"), Ok(Some(json!(1))));
        assert_eq!(run("len(keys({x: 1, y: 2}))"), Ok(Some(json!(2))));
    }

    #[test]
    fn test_errors_are_values() {
        let err = run("zed + 1").unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: zed is not defined");
        assert!(matches!(run("1 +"), Err(EvalError::Syntax(_))));
        assert!(matches!(run("1 / 0"), Err(EvalError::Runtime(_))));
        assert!(matches!(run("null.x"), Err(EvalError::Runtime(_))));
    }

    #[test]
    fn test_assignment_persists_in_bindings() {
        let host = LocalHost::new(json!({}));
        let mut scope = Scope::new(BTreeMap::new());
        let out = Interpreter.evaluate("x = 40 + 2", &mut scope, host.as_ref());
        assert_eq!(out, Ok(Some(json!(42))));
        assert_eq!(Interpreter.evaluate("x", &mut scope, host.as_ref()), Ok(Some(json!(42))));
        assert_eq!(scope.into_bindings().get("x"), Some(&json!(42)));
    }

    #[test]
    fn test_await_requires_async() {
        assert_eq!(run("await 1"), Err(EvalError::AwaitPending));
        assert_eq!(run("act('sys:repl,echo:true')"), Err(EvalError::AwaitPending));
    }

    #[tokio::test]
    async fn test_async_act() {
        let host = LocalHost::new(json!({}));
        let mut scope = Scope::new(BTreeMap::new());
        let out = Interpreter
            .evaluate_async(
                "r = await act('sys:repl,echo:true,x:7')",
                &mut scope,
                host.as_ref(),
                ActMeta::for_session("s1"),
            )
            .await
            .unwrap();
        assert_eq!(out.unwrap()["x"], json!(7));
        assert_eq!(scope.get("r").unwrap()["echo"], json!(true));
    }

    #[tokio::test]
    async fn test_async_host_error() {
        let host = LocalHost::new(json!({}));
        let mut scope = Scope::default();
        let err = Interpreter
            .evaluate_async("await act({zed: 1})", &mut scope, host.as_ref(), ActMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Host(_)));
    }
}
