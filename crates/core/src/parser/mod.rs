//! Recursive-descent parser for placeholder formulas.
//!
//! Input is the output of [`crate::computed::ComputedParser`] (or a
//! hand-written formula over `$1..$n`). Output is an [`Expr`] tree; the
//! evaluator crate interprets it.
use crate::ast::Expr;
use crate::error::FormulaError;
use crate::lexer::{lex, Spanned, Token};

mod expressions;

// ──────────────────────────────────────────────
// Compiled formula
// ──────────────────────────────────────────────

/// Deepest expression tree a formula may build.
pub const MAX_DEPTH: usize = 256;

/// Longest formula accepted, in tokens.
pub const MAX_TOKENS: usize = 4096;

/// A parsed formula together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub source: String,
    pub expr: Expr,
    /// Highest `$n` the formula references.
    pub arity: usize,
}

/// Lex and parse a placeholder formula.
pub fn compile(src: &str) -> Result<Formula, FormulaError> {
    let tokens = lex(src)?;
    if let Some(extra) = tokens.get(MAX_TOKENS) {
        return Err(FormulaError::parse(
            src,
            extra.offset,
            format!("formula is longer than {} tokens", MAX_TOKENS),
        ));
    }
    let mut parser = Parser::new(&tokens, src);
    let expr = parser.parse_sequence()?;
    if parser.peek() != &Token::Eof {
        return Err(parser.err(format!("unexpected {:?} after expression", parser.peek())));
    }
    // operator chains grow the tree without nesting the parser
    if expr.depth() > MAX_DEPTH {
        return Err(FormulaError::parse(
            src,
            0,
            format!("formula nests deeper than {} levels", MAX_DEPTH),
        ));
    }
    let arity = expr.max_placeholder();
    Ok(Formula {
        source: src.to_owned(),
        expr,
        arity,
    })
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    source: &'a str,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], source: &'a str) -> Self {
        Parser {
            tokens,
            pos: 0,
            source,
            depth: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token, shown: &str) -> Result<(), FormulaError> {
        if self.peek() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {:?}", shown, self.peek())))
        }
    }

    /// Run `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, FormulaError>,
    ) -> Result<T, FormulaError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.err(format!("formula nests deeper than {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn err(&self, msg: impl Into<String>) -> FormulaError {
        FormulaError::parse(self.source, self.cur().offset, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Intrinsic, LogicalOp, UnaryOp};

    fn parse(src: &str) -> Expr {
        compile(src).unwrap().expr
    }

    fn num(s: &str) -> Box<Expr> {
        Box::new(Expr::Number(s.to_string()))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: num("1"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: num("2"),
                    right: num("3"),
                }),
            }
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let f = compile("$1 / ($2 * $2)").unwrap();
        assert_eq!(f.arity, 2);
        assert_eq!(
            f.expr,
            Expr::Binary {
                op: BinaryOp::Div,
                left: Box::new(Expr::Placeholder(1)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Placeholder(2)),
                    right: Box::new(Expr::Placeholder(2)),
                }),
            }
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            parse("5 - 2 - 1"),
            Expr::Binary {
                op: BinaryOp::Sub,
                left: Box::new(Expr::Binary {
                    op: BinaryOp::Sub,
                    left: num("5"),
                    right: num("2"),
                }),
                right: num("1"),
            }
        );
    }

    #[test]
    fn conditional_and_logical_operators() {
        assert_eq!(
            parse("$1 > 1 && !$2 ? 'a' : 'b'"),
            Expr::Conditional {
                test: Box::new(Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(Expr::Binary {
                        op: BinaryOp::Gt,
                        left: Box::new(Expr::Placeholder(1)),
                        right: num("1"),
                    }),
                    right: Box::new(Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(Expr::Placeholder(2)),
                    }),
                }),
                then: Box::new(Expr::Str("a".to_string())),
                otherwise: Box::new(Expr::Str("b".to_string())),
            }
        );
    }

    #[test]
    fn intrinsic_calls_and_arrays() {
        assert_eq!(
            parse("~IN(['A', 'B'], $1)"),
            Expr::Call {
                intrinsic: Intrinsic::In,
                args: vec![
                    Expr::Array(vec![
                        Expr::Str("A".to_string()),
                        Expr::Str("B".to_string())
                    ]),
                    Expr::Placeholder(1),
                ],
            }
        );
    }

    #[test]
    fn memo_shorthand_accepts_no_arguments() {
        assert_eq!(
            parse("$()"),
            Expr::Call {
                intrinsic: Intrinsic::Memo,
                args: vec![],
            }
        );
    }

    #[test]
    fn temporaries_and_sequences() {
        assert_eq!(
            parse("(_x = $1 + 1, _x * _x)"),
            Expr::Sequence(vec![
                Expr::Assign {
                    name: "_x".to_string(),
                    value: Box::new(Expr::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(Expr::Placeholder(1)),
                        right: num("1"),
                    }),
                },
                Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Temp("_x".to_string())),
                    right: Box::new(Expr::Temp("_x".to_string())),
                },
            ])
        );
    }

    #[test]
    fn unknown_intrinsic_is_rejected() {
        let err = compile("~EVAL('1')").unwrap_err();
        assert!(err.message.contains("unknown intrinsic 'EVAL'"));
    }

    #[test]
    fn intrinsic_arity_is_checked() {
        let err = compile("~IN($1)").unwrap_err();
        assert!(err.message.contains("IN"));
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(compile("$1 $2").is_err());
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let src = format!("{}$1{}", "(".repeat(50_000), ")".repeat(50_000));
        let err = compile(&src).unwrap_err();
        assert!(err.message.contains("longer than"));

        let src = format!("{}$1{}", "(".repeat(300), ")".repeat(300));
        let err = compile(&src).unwrap_err();
        assert!(err.message.contains("nests deeper"));

        let src = format!("{}$1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(compile(&src).unwrap().expr, Expr::Placeholder(1));
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let chain = vec!["$1"; 1000].join(" + ");
        let err = compile(&chain).unwrap_err();
        assert!(err.message.contains("nests deeper"));

        let negations = format!("{}$1", "!".repeat(1000));
        assert!(compile(&negations).is_err());

        let chain = vec!["$1"; 100].join(" + ");
        assert!(compile(&chain).is_ok());
    }

    #[test]
    fn missing_closing_parenthesis() {
        let err = compile("($1 + 2").unwrap_err();
        assert!(err.message.contains("expected ')'"));
    }
}
