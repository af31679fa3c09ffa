//! enquete-core: the computed-formula language.
//!
//! Survey designers write formulas over variable names
//! (`POIDS / (TAILLE * TAILLE)`). This crate turns them into an operand
//! list plus a placeholder formula ([`ComputedParser`]), then lexes and
//! parses the placeholder formula into an [`Expr`] tree ([`compile`]).
//!
//! The grammar is closed: operands, `_temporaries`, literals, arithmetic,
//! comparison and logical operators, and the `~IN`, `~UNDEF`, `~NA`,
//! `~MEM` and `$()` intrinsics. Anything else fails to lex or parse, so a
//! formula stored in survey data can never reach outside the evaluator.
//!
//! Evaluation lives in `enquete-eval`.

pub mod ast;
pub mod computed;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, Intrinsic, LogicalOp, UnaryOp};
pub use computed::{ComputedParser, ParsedFormula};
pub use error::FormulaError;
pub use parser::{compile, Formula};
