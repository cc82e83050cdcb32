use std::collections::BTreeSet;

use trellis_core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuiting operators; they return one of their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Field(String),
    Index(Expr),
}

/// Left-hand side of an assignment: a name followed by member/index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub root: String,
    pub path: Vec<Accessor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Target, Box<Expr>),
}

impl Expr {
    /// Whether evaluating this expression can write through an assignment.
    pub fn contains_assignment(&self) -> bool {
        match self {
            Expr::Assign(..) => true,
            Expr::Literal(_) | Expr::Ident(_) => false,
            Expr::Array(items) => items.iter().any(Expr::contains_assignment),
            Expr::Object(props) => props.iter().any(|(_, e)| e.contains_assignment()),
            Expr::Member(obj, _) => obj.contains_assignment(),
            Expr::Index(obj, key) => obj.contains_assignment() || key.contains_assignment(),
            Expr::Call(callee, args) => {
                callee.contains_assignment() || args.iter().any(Expr::contains_assignment)
            }
            Expr::Unary(_, e) => e.contains_assignment(),
            Expr::Binary(_, l, r) | Expr::Logical(_, l, r) => {
                l.contains_assignment() || r.contains_assignment()
            }
            Expr::Conditional(t, a, b) => {
                t.contains_assignment() || a.contains_assignment() || b.contains_assignment()
            }
        }
    }

    /// Every identifier the expression resolves by name, including the root
    /// of assignment targets.
    pub fn collect_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => {
                names.insert(name.clone());
            }
            Expr::Array(items) => items.iter().for_each(|e| e.collect_names(names)),
            Expr::Object(props) => props.iter().for_each(|(_, e)| e.collect_names(names)),
            Expr::Member(obj, _) | Expr::Unary(_, obj) => obj.collect_names(names),
            Expr::Index(obj, key) => {
                obj.collect_names(names);
                key.collect_names(names);
            }
            Expr::Call(callee, args) => {
                callee.collect_names(names);
                args.iter().for_each(|e| e.collect_names(names));
            }
            Expr::Binary(_, l, r) | Expr::Logical(_, l, r) => {
                l.collect_names(names);
                r.collect_names(names);
            }
            Expr::Conditional(t, a, b) => {
                t.collect_names(names);
                a.collect_names(names);
                b.collect_names(names);
            }
            Expr::Assign(_, target, value) => {
                names.insert(target.root.clone());
                for step in &target.path {
                    if let Accessor::Index(e) = step {
                        e.collect_names(names);
                    }
                }
                value.collect_names(names);
            }
        }
    }

    /// Short human-readable form used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Expr::Ident(name) => name.clone(),
            Expr::Member(obj, field) => format!("{}.{}", obj.describe(), field),
            Expr::Index(obj, _) => format!("{}[..]", obj.describe()),
            Expr::Call(callee, _) => format!("{}()", callee.describe()),
            Expr::Literal(v) => v.to_display_string(),
            _ => "expression".to_string(),
        }
    }
}
