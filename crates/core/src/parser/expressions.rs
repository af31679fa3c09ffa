use super::Parser;
use crate::ast::{BinaryOp, Expr, Intrinsic, LogicalOp, UnaryOp};
use crate::error::FormulaError;
use crate::lexer::Token;

impl<'a> Parser<'a> {
    // -- Sequence and assignment ---------------------------------

    pub(super) fn parse_sequence(&mut self) -> Result<Expr, FormulaError> {
        let first = self.parse_assignment()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek() == &Token::Comma {
            self.advance();
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_assignment(&mut self) -> Result<Expr, FormulaError> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, FormulaError> {
        if let Token::Temp(name) = self.peek().clone() {
            if self.peek_at(1) == &Token::Assign {
                self.advance();
                self.advance();
                let value = self.parse_assignment()?;
                return Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                });
            }
        }
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr, FormulaError> {
        let test = self.parse_or()?;
        if self.peek() != &Token::Question {
            return Ok(test);
        }
        self.advance();
        let then = self.parse_assignment()?;
        self.expect(Token::Colon, ":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    // -- Binary operators ----------------------------------------

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Token::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_equality()?;
        while self.peek() == &Token::AndAnd {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Neq => BinaryOp::Neq,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNeq => BinaryOp::StrictNeq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Lte => BinaryOp::Lte,
                Token::Gt => BinaryOp::Gt,
                Token::Gte => BinaryOp::Gte,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => {
                self.advance();
                return self.nested(Self::parse_unary);
            }
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // -- Primary expressions -------------------------------------

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Date(d) => {
                self.advance();
                Ok(Expr::Date(d))
            }
            Token::Placeholder(n) => {
                self.advance();
                Ok(Expr::Placeholder(n))
            }
            Token::Temp(name) => {
                self.advance();
                Ok(Expr::Temp(name))
            }
            Token::Word(w) => {
                self.advance();
                match w.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" => Ok(Expr::Null),
                    _ => Ok(Expr::Undefined),
                }
            }
            Token::LParen => {
                self.advance();
                let e = self.parse_sequence()?;
                self.expect(Token::RParen, ")")?;
                Ok(e)
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(Token::RBracket, "]")?;
                Ok(Expr::Array(items))
            }
            Token::Intrinsic(name) => {
                let intrinsic = Intrinsic::from_name(&name)
                    .ok_or_else(|| self.err(format!("unknown intrinsic '{}'", name)))?;
                self.advance();
                self.parse_call(intrinsic)
            }
            Token::Memo => {
                self.advance();
                self.parse_call(Intrinsic::Memo)
            }
            other => Err(self.err(format!("expected expression, got {:?}", other))),
        }
    }

    fn parse_call(&mut self, intrinsic: Intrinsic) -> Result<Expr, FormulaError> {
        self.expect(Token::LParen, "(")?;
        let args = self.parse_list(Token::RParen, ")")?;
        let (min, max) = intrinsic.arity();
        if args.len() < min || args.len() > max {
            return Err(self.err(format!(
                "intrinsic '{}' called with {} argument(s)",
                intrinsic.name(),
                args.len()
            )));
        }
        Ok(Expr::Call { intrinsic, args })
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn parse_list(&mut self, close: Token, shown: &str) -> Result<Vec<Expr>, FormulaError> {
        let mut items = Vec::new();
        if self.peek() == &close {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_assignment()?);
            if self.peek() == &Token::Comma {
                self.advance();
                continue;
            }
            self.expect(close.clone(), shown)?;
            return Ok(items);
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
