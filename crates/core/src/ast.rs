//! Formula expression tree.
//!
//! Produced by the parser, interpreted by the evaluator crate. Literals
//! stay textual (numbers, dates) so this crate carries no numeric or
//! calendar model of its own.

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
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Functions a formula may call. Nothing else is callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// `~IN(list, value)` membership test
    In,
    /// `~UNDEF(...)` all operands undefined
    Undef,
    /// `~NA(...)` all operands marked not applicable
    Na,
    /// `~MEM(value, memento?)` memoized pair
    Mem,
    /// `$(value?, memento?)` memoize once
    Memo,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        match name {
            "IN" => Some(Intrinsic::In),
            "UNDEF" => Some(Intrinsic::Undef),
            "NA" => Some(Intrinsic::Na),
            "MEM" => Some(Intrinsic::Mem),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::In => "IN",
            Intrinsic::Undef => "UNDEF",
            Intrinsic::Na => "NA",
            Intrinsic::Mem => "MEM",
            Intrinsic::Memo => "$",
        }
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Intrinsic::In => (2, 2),
            Intrinsic::Undef | Intrinsic::Na => (1, usize::MAX),
            Intrinsic::Mem => (1, 2),
            Intrinsic::Memo => (0, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(String),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    /// Date literal body, `YYYY-MM-DD`
    Date(String),
    /// 1-based operand index
    Placeholder(usize),
    Temp(String),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Call {
        intrinsic: Intrinsic,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Direct subexpressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Number(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::Date(_)
            | Expr::Placeholder(_)
            | Expr::Temp(_) => Vec::new(),
            Expr::Array(items) | Expr::Sequence(items) | Expr::Call { args: items, .. } => {
                items.iter().collect()
            }
            Expr::Unary { operand, .. } => vec![&**operand],
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                vec![&**left, &**right]
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => vec![&**test, &**then, &**otherwise],
            Expr::Assign { value, .. } => vec![&**value],
        }
    }

    /// Number of nodes on the longest root-to-leaf path. Walks an explicit
    /// stack, so any tree the parser built can be measured.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(expr.children().into_iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Highest operand index referenced anywhere in the tree.
    pub fn max_placeholder(&self) -> usize {
        match self {
            Expr::Placeholder(n) => *n,
            Expr::Number(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::Date(_)
            | Expr::Temp(_) => 0,
            Expr::Array(items) | Expr::Sequence(items) | Expr::Call { args: items, .. } => {
                items.iter().map(Expr::max_placeholder).max().unwrap_or(0)
            }
            Expr::Unary { operand, .. } => operand.max_placeholder(),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.max_placeholder().max(right.max_placeholder())
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => test
                .max_placeholder()
                .max(then.max_placeholder())
                .max(otherwise.max_placeholder()),
            Expr::Assign { value, .. } => value.max_placeholder(),
        }
    }

    /// Visit every date literal body, in source order.
    pub fn date_literals(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_dates(&mut out);
        out
    }

    fn collect_dates<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Date(d) => out.push(d),
            Expr::Array(items) | Expr::Sequence(items) | Expr::Call { args: items, .. } => {
                for item in items {
                    item.collect_dates(out);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_dates(out),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.collect_dates(out);
                right.collect_dates(out);
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.collect_dates(out);
                then.collect_dates(out);
                otherwise.collect_dates(out);
            }
            Expr::Assign { value, .. } => value.collect_dates(out),
            _ => {}
        }
    }
}
