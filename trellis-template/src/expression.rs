use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use trellis_core::{Scope, Value};

use crate::error::{EvalError, ExprError};
use crate::eval::{self, Env};
use crate::expr_ast::Expr;
use crate::expr_parse::parse_expression;

/// A compiled expression, cheap to clone and evaluated against a [`Scope`].
#[derive(Clone)]
pub struct Evaluator {
    source: Rc<str>,
    params: Rc<[String]>,
    expr: Rc<Expr>,
}

/// Compile a read-only expression. `extra_params` name positional arguments
/// (such as `$event`) that shadow scope names.
pub fn compile(source: &str, extra_params: &[&str]) -> Result<Evaluator, ExprError> {
    let evaluator = Evaluator::build(source, extra_params)?;
    if evaluator.expr.contains_assignment() {
        return Err(ExprError::AssignmentNotAllowed {
            expression: source.to_string(),
        });
    }
    Ok(evaluator)
}

/// Compile an expression that may write through assignments.
pub fn compile_assignable(source: &str, extra_params: &[&str]) -> Result<Evaluator, ExprError> {
    Evaluator::build(source, extra_params)
}

impl Evaluator {
    fn build(source: &str, extra_params: &[&str]) -> Result<Self, ExprError> {
        let expr = parse_expression(source)?;
        trace!(expression = source, "compiled expression");
        Ok(Self {
            source: Rc::from(source),
            params: extra_params.iter().map(|p| p.to_string()).collect(),
            expr: Rc::new(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Scope names the expression reads or writes, extra parameters excluded.
    pub fn free_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.expr.collect_names(&mut names);
        names
            .into_iter()
            .filter(|name| !self.params.contains(name))
            .collect()
    }

    pub fn is_assignment(&self) -> bool {
        matches!(*self.expr, Expr::Assign(..))
    }

    /// Evaluate with `args` bound positionally to the extra parameters.
    pub fn evaluate(&self, scope: &Scope, args: &[Value]) -> Result<Value, EvalError> {
        eval::evaluate(&self.expr, &self.env(scope, args))
    }

    /// Run as an event handler.
    ///
    /// A call expression receives `payload` as an extra final argument; an
    /// expression that evaluates to a function is called with `payload` alone.
    /// Anything else is evaluated for its side effects.
    pub fn invoke(&self, scope: &Scope, payload: Value) -> Result<Value, EvalError> {
        let args = [payload.clone()];
        let env = self.env(scope, &args);
        match &*self.expr {
            Expr::Call(callee, call_args) => {
                let func = eval::evaluate(callee, &env)?;
                let mut values = call_args
                    .iter()
                    .map(|arg| eval::evaluate(arg, &env))
                    .collect::<Result<Vec<_>, _>>()?;
                values.push(payload);
                eval::call(&func, callee, &values)
            }
            expr => match eval::evaluate(expr, &env)? {
                func @ Value::Function(_) => eval::call(&func, expr, &[payload]),
                other => Ok(other),
            },
        }
    }

    fn env<'a>(&'a self, scope: &'a Scope, args: &'a [Value]) -> Env<'a> {
        Env {
            scope,
            params: &self.params,
            args,
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("source", &self.source)
            .field("params", &self.params)
            .finish()
    }
}
