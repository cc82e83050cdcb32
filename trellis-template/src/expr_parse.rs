use std::sync::LazyLock;

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use trellis_core::Value;

use crate::error::ExprError;
use crate::expr_ast::{Accessor, AssignOp, BinaryOp, Expr, LogicalOp, Target, UnaryOp};

#[derive(pest_derive::Parser)]
#[grammar = "expression.pest"]
struct ExprParser;

type Build<T> = Result<T, String>;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::nullish, Assoc::Left))
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left)
            | Op::infix(Rule::ne, Assoc::Left)
            | Op::infix(Rule::strict_eq, Assoc::Left)
            | Op::infix(Rule::strict_ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::not) | Op::prefix(Rule::neg))
        .op(Op::postfix(Rule::member) | Op::postfix(Rule::index) | Op::postfix(Rule::call))
});

/// Parse expression text into an AST.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let syntax = |message: String| ExprError::Syntax {
        expression: source.to_string(),
        message,
    };

    let mut pairs = ExprParser::parse(Rule::program, source).map_err(|e| {
        let column = match e.line_col {
            LineColLocation::Pos((_, col)) => col,
            LineColLocation::Span((_, col), _) => col,
        };
        syntax(format!("{} at column {}", e.variant.message(), column))
    })?;
    let program = next(&mut pairs, "program").map_err(syntax)?;
    let expression = next(&mut program.into_inner(), "expression").map_err(syntax)?;
    build_expression(expression).map_err(syntax)
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Build<Pair<'i, Rule>> {
    pairs.next().ok_or_else(|| format!("missing {what}"))
}

fn unexpected(rule: Rule) -> String {
    format!("unexpected {rule:?}")
}

fn build_expression(pair: Pair<'_, Rule>) -> Build<Expr> {
    let inner = next(&mut pair.into_inner(), "expression")?;
    match inner.as_rule() {
        Rule::assignment => build_assignment(inner),
        Rule::conditional => build_conditional(inner),
        rule => Err(unexpected(rule)),
    }
}

fn build_assignment(pair: Pair<'_, Rule>) -> Build<Expr> {
    let mut inner = pair.into_inner();
    let target = build_target(next(&mut inner, "assignment target")?)?;
    let op = match next(&mut inner, "assignment operator")?.as_rule() {
        Rule::assign => AssignOp::Set,
        Rule::assign_add => AssignOp::Add,
        Rule::assign_sub => AssignOp::Sub,
        rule => return Err(unexpected(rule)),
    };
    let value = build_expression(next(&mut inner, "assigned value")?)?;
    Ok(Expr::Assign(op, target, Box::new(value)))
}

fn build_target(pair: Pair<'_, Rule>) -> Build<Target> {
    let mut inner = pair.into_inner();
    let root = next(&mut inner, "name")?.as_str().to_string();
    let path = inner
        .map(|step| match step.as_rule() {
            Rule::member => Ok(Accessor::Field(member_name(step)?)),
            Rule::index => Ok(Accessor::Index(build_expression(next(
                &mut step.into_inner(),
                "index",
            )?)?)),
            rule => Err(unexpected(rule)),
        })
        .collect::<Build<Vec<_>>>()?;
    Ok(Target { root, path })
}

fn member_name(pair: Pair<'_, Rule>) -> Build<String> {
    Ok(next(&mut pair.into_inner(), "property name")?
        .as_str()
        .to_string())
}

fn build_conditional(pair: Pair<'_, Rule>) -> Build<Expr> {
    let mut inner = pair.into_inner();
    let test = build_binary(next(&mut inner, "operand")?)?;
    let Some(then) = inner.next() else {
        return Ok(test);
    };
    let otherwise = next(&mut inner, "else branch")?;
    Ok(Expr::Conditional(
        Box::new(test),
        Box::new(build_expression(then)?),
        Box::new(build_expression(otherwise)?),
    ))
}

fn build_binary(pair: Pair<'_, Rule>) -> Build<Expr> {
    PRATT
        .map_primary(build_primary)
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::not => UnaryOp::Not,
                Rule::neg => UnaryOp::Neg,
                rule => return Err(unexpected(rule)),
            };
            Ok(Expr::Unary(op, Box::new(rhs?)))
        })
        .map_postfix(|lhs, op| {
            let lhs = Box::new(lhs?);
            match op.as_rule() {
                Rule::member => Ok(Expr::Member(lhs, member_name(op)?)),
                Rule::index => {
                    let key = build_expression(next(&mut op.into_inner(), "index")?)?;
                    Ok(Expr::Index(lhs, Box::new(key)))
                }
                Rule::call => {
                    let args = op
                        .into_inner()
                        .map(build_expression)
                        .collect::<Build<Vec<_>>>()?;
                    Ok(Expr::Call(lhs, args))
                }
                rule => Err(unexpected(rule)),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (Box::new(lhs?), Box::new(rhs?));
            let binary = match op.as_rule() {
                Rule::nullish => return Ok(Expr::Logical(LogicalOp::Nullish, lhs, rhs)),
                Rule::or => return Ok(Expr::Logical(LogicalOp::Or, lhs, rhs)),
                Rule::and => return Ok(Expr::Logical(LogicalOp::And, lhs, rhs)),
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::strict_eq => BinaryOp::StrictEq,
                Rule::strict_ne => BinaryOp::StrictNe,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                rule => return Err(unexpected(rule)),
            };
            Ok(Expr::Binary(binary, lhs, rhs))
        })
        .parse(pair.into_inner())
}

fn build_primary(pair: Pair<'_, Rule>) -> Build<Expr> {
    match pair.as_rule() {
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(|n| Expr::Literal(Value::Number(n)))
            .map_err(|e| e.to_string()),
        Rule::string => Ok(Expr::Literal(Value::String(string_literal(pair)))),
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::null => Ok(Expr::Literal(Value::Null)),
        Rule::identifier => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::array => pair
            .into_inner()
            .map(build_expression)
            .collect::<Build<Vec<_>>>()
            .map(Expr::Array),
        Rule::object => pair
            .into_inner()
            .map(|prop| {
                let mut inner = prop.into_inner();
                let key = next(&mut inner, "property key")?;
                let key = match key.as_rule() {
                    Rule::string => string_literal(key),
                    _ => key.as_str().to_string(),
                };
                let value = build_expression(next(&mut inner, "property value")?)?;
                Ok((key, value))
            })
            .collect::<Build<Vec<_>>>()
            .map(Expr::Object),
        Rule::expression => build_expression(pair),
        rule => Err(unexpected(rule)),
    }
}

fn string_literal(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|chars| unescape(chars.as_str()))
        .unwrap_or_default()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
