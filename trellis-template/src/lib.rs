pub mod error;
mod eval;
pub mod expr_ast;
mod expr_parse;
pub mod expression;
pub mod instantiate;
pub mod template_ast;
pub mod template_parse;

pub use error::{EvalError, ExprError, TemplateError};
pub use expr_ast::Expr;
pub use expr_parse::parse_expression;
pub use expression::{Evaluator, compile, compile_assignable};
pub use instantiate::instantiate;
pub use template_ast::{AttrKind, Node, TemplateAttr};
pub use template_parse::parse_template_to_ast;
