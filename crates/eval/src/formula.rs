//! Computed-formula interpreter.
//!
//! Walks the [`Expr`] tree produced by `enquete-core`. Operand semantics
//! follow the loose scripting model survey designers expect: `undefined`
//! and `null` are distinct, `==` coerces between numbers, text and dates,
//! `&&`/`||` return an operand, and arithmetic on an absent operand is
//! absent. Numbers are `Decimal`; a division by zero or an overflow is
//! `undefined`, never an error.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use enquete_core::{BinaryOp, Expr, Formula, Intrinsic, LogicalOp, UnaryOp};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::{Date, Duration};

use crate::types::values::{decimal_to_json, format_date, parse_date};
use crate::types::{Context, EvalError, ItemValue, Value};

// ──────────────────────────────────────────────
// Formula values
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Undefined,
    /// An operand marked not applicable.
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    Date(Date),
    List(Vec<FormulaValue>),
    /// A memoized result. `memento: None` is the pending marker, distinct
    /// from an `undefined` payload.
    Memo {
        value: Box<FormulaValue>,
        memento: Option<Box<FormulaValue>>,
    },
}

impl FormulaValue {
    /// Operand view of an item: not applicable is `null`, no value is
    /// `undefined`.
    pub fn from_item(item: &ItemValue) -> FormulaValue {
        if item.is_not_applicable() {
            return FormulaValue::Null;
        }
        match &item.value {
            Some(v) => FormulaValue::from_value(v),
            None => FormulaValue::Undefined,
        }
    }

    pub fn from_value(value: &Value) -> FormulaValue {
        match value {
            Value::Number(d) => FormulaValue::Number(*d),
            Value::Text(s) | Value::PartialDate(s) => FormulaValue::Text(s.clone()),
            Value::Date(d) => FormulaValue::Date(*d),
            Value::Bool(b) => FormulaValue::Bool(*b),
            Value::List(items) => FormulaValue::List(items.iter().map(FormulaValue::from_value).collect()),
        }
    }

    /// Item value of a result; `undefined` and `null` are absent.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            FormulaValue::Undefined | FormulaValue::Null => None,
            FormulaValue::Bool(b) => Some(Value::Bool(*b)),
            FormulaValue::Number(d) => Some(Value::Number(*d)),
            FormulaValue::Text(s) => Some(Value::Text(s.clone())),
            FormulaValue::Date(d) => Some(Value::Date(*d)),
            FormulaValue::List(items) => Some(Value::List(items.iter().filter_map(FormulaValue::to_value).collect())),
            FormulaValue::Memo { value, .. } => value.to_value(),
        }
    }

    /// Plain-data form, used to feed computed arguments to a rule factory.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FormulaValue::Undefined | FormulaValue::Null => serde_json::Value::Null,
            FormulaValue::Bool(b) => serde_json::Value::Bool(*b),
            FormulaValue::Number(d) => decimal_to_json(*d),
            FormulaValue::Text(s) => serde_json::Value::String(s.clone()),
            FormulaValue::Date(d) => serde_json::Value::String(format_date(*d)),
            FormulaValue::List(items) => serde_json::Value::Array(items.iter().map(FormulaValue::to_json).collect()),
            FormulaValue::Memo { value, .. } => value.to_json(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Undefined => "undefined",
            FormulaValue::Null => "null",
            FormulaValue::Bool(_) => "boolean",
            FormulaValue::Number(_) => "number",
            FormulaValue::Text(_) => "string",
            FormulaValue::Date(_) => "date",
            FormulaValue::List(_) => "list",
            FormulaValue::Memo { .. } => "memo",
        }
    }

    /// The value a memo wraps; other values are their own payload.
    fn payload(&self) -> &FormulaValue {
        match self {
            FormulaValue::Memo { value, .. } => value.payload(),
            other => other,
        }
    }

    fn is_absent(&self) -> bool {
        matches!(self.payload(), FormulaValue::Undefined | FormulaValue::Null)
    }

    pub fn truthy(&self) -> bool {
        match self.payload() {
            FormulaValue::Undefined | FormulaValue::Null => false,
            FormulaValue::Bool(b) => *b,
            FormulaValue::Number(d) => !d.is_zero(),
            FormulaValue::Text(s) => !s.is_empty(),
            FormulaValue::Date(_) | FormulaValue::List(_) => true,
            FormulaValue::Memo { .. } => true,
        }
    }

    fn as_number(&self) -> Option<Decimal> {
        match self.payload() {
            FormulaValue::Number(d) => Some(*d),
            FormulaValue::Bool(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
            FormulaValue::Text(s) if !s.trim().is_empty() => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    fn as_date(&self) -> Option<Date> {
        match self.payload() {
            FormulaValue::Date(d) => Some(*d),
            FormulaValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    fn display(&self) -> String {
        match self.payload() {
            FormulaValue::Undefined => "undefined".to_string(),
            FormulaValue::Null => "null".to_string(),
            FormulaValue::Bool(b) => b.to_string(),
            FormulaValue::Number(d) => d.normalize().to_string(),
            FormulaValue::Text(s) => s.clone(),
            FormulaValue::Date(d) => format_date(*d),
            FormulaValue::List(items) => items.iter().map(FormulaValue::display).collect::<Vec<_>>().join(","),
            FormulaValue::Memo { .. } => String::new(),
        }
    }
}

// ──────────────────────────────────────────────
// Evaluation context
// ──────────────────────────────────────────────

/// Operands, the target's memoized state and the formula's temporaries.
#[derive(Debug, Clone)]
pub struct EvalContext {
    operands: Vec<FormulaValue>,
    memo: Option<FormulaValue>,
    bindings: BTreeMap<String, FormulaValue>,
}

impl EvalContext {
    /// Context over rule operands; the last one is the rule's target.
    pub fn new(items: &[&ItemValue]) -> EvalContext {
        let operands = items.iter().map(|i| FormulaValue::from_item(i)).collect();
        let memo = items.last().and_then(|target| match &target.context {
            Some(Context::Memo { memento, .. }) => Some(FormulaValue::Memo {
                value: Box::new(FormulaValue::from_item(target)),
                memento: memento
                    .as_ref()
                    .map(|m| Box::new(FormulaValue::from_value(m))),
            }),
            _ => None,
        });
        EvalContext {
            operands,
            memo,
            bindings: BTreeMap::new(),
        }
    }

    pub fn from_values(operands: Vec<FormulaValue>) -> EvalContext {
        EvalContext {
            operands,
            memo: None,
            bindings: BTreeMap::new(),
        }
    }
}

/// Evaluate a compiled formula.
pub fn eval_formula(formula: &Formula, ctx: &mut EvalContext) -> Result<FormulaValue, EvalError> {
    eval_expr(&formula.expr, ctx)
}

/// Reject formulas whose date literals are not calendar dates.
pub fn check_dates(formula: &Formula) -> Result<(), EvalError> {
    for literal in formula.expr.date_literals() {
        if parse_date(literal).is_none() {
            return Err(EvalError::Formula(enquete_core::FormulaError::new(
                &formula.source,
                0,
                format!("invalid date literal '#{}#'", literal),
            )));
        }
    }
    Ok(())
}

// recursion is bounded by enquete_core::parser::MAX_DEPTH
fn eval_expr(expr: &Expr, ctx: &mut EvalContext) -> Result<FormulaValue, EvalError> {
    match expr {
        Expr::Number(text) => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map(FormulaValue::Number)
            .map_err(|_| EvalError::evaluation(format!("invalid number '{}'", text))),
        Expr::Str(s) => Ok(FormulaValue::Text(s.clone())),
        Expr::Bool(b) => Ok(FormulaValue::Bool(*b)),
        Expr::Null => Ok(FormulaValue::Null),
        Expr::Undefined => Ok(FormulaValue::Undefined),
        Expr::Date(text) => parse_date(text)
            .map(FormulaValue::Date)
            .ok_or_else(|| EvalError::evaluation(format!("invalid date '#{}#'", text))),
        Expr::Placeholder(n) => n
            .checked_sub(1)
            .and_then(|i| ctx.operands.get(i))
            .cloned()
            .ok_or_else(|| EvalError::evaluation(format!("operand ${} is out of range", n))),
        Expr::Temp(name) => Ok(ctx
            .bindings
            .get(name)
            .cloned()
            .unwrap_or(FormulaValue::Undefined)),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval_expr(item, ctx)?);
            }
            Ok(FormulaValue::List(values))
        }
        Expr::Unary { op, operand } => {
            let v = eval_expr(operand, ctx)?;
            Ok(match op {
                UnaryOp::Not => FormulaValue::Bool(!v.truthy()),
                UnaryOp::Neg => match v.as_number() {
                    Some(d) if !v.is_absent() => FormulaValue::Number(-d),
                    _ => FormulaValue::Undefined,
                },
            })
        }
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, ctx)?;
            let r = eval_expr(right, ctx)?;
            Ok(eval_binary(*op, &l, &r))
        }
        Expr::Logical { op, left, right } => {
            let l = eval_expr(left, ctx)?;
            match (op, l.truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                _ => eval_expr(right, ctx),
            }
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            if eval_expr(test, ctx)?.truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
        Expr::Assign { name, value } => {
            let v = eval_expr(value, ctx)?;
            ctx.bindings.insert(name.clone(), v.clone());
            Ok(v)
        }
        Expr::Sequence(items) => {
            let mut last = FormulaValue::Undefined;
            for item in items {
                last = eval_expr(item, ctx)?;
            }
            Ok(last)
        }
        Expr::Call { intrinsic, args } => eval_call(*intrinsic, args, ctx),
    }
}

// ──────────────────────────────────────────────
// Intrinsics
// ──────────────────────────────────────────────

fn eval_call(
    intrinsic: Intrinsic,
    args: &[Expr],
    ctx: &mut EvalContext,
) -> Result<FormulaValue, EvalError> {
    // memoize once: a target already carrying a memo keeps it
    if intrinsic == Intrinsic::Memo {
        if let Some(memo) = &ctx.memo {
            return Ok(memo.clone());
        }
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, ctx)?);
    }

    match intrinsic {
        Intrinsic::In => {
            let (list, needle) = match values.as_slice() {
                [list, needle] => (list, needle),
                _ => return Err(EvalError::evaluation("~IN expects 2 arguments")),
            };
            let haystack: Vec<&FormulaValue> = match list.payload() {
                FormulaValue::List(items) => items.iter().collect(),
                other => vec![other],
            };
            let found = |n: &FormulaValue| haystack.iter().any(|h| loose_eq(h, n));
            Ok(FormulaValue::Bool(match needle.payload() {
                FormulaValue::List(needles) => needles.iter().any(found),
                single => found(single),
            }))
        }
        Intrinsic::Undef => Ok(FormulaValue::Bool(
            values
                .iter()
                .all(|v| matches!(v.payload(), FormulaValue::Undefined)),
        )),
        Intrinsic::Na => Ok(FormulaValue::Bool(
            values.iter().all(|v| matches!(v.payload(), FormulaValue::Null)),
        )),
        Intrinsic::Mem => Ok(memo(values)),
        Intrinsic::Memo => {
            if values
                .first()
                .map_or(true, |v| matches!(v.payload(), FormulaValue::Undefined))
            {
                Ok(FormulaValue::Undefined)
            } else {
                Ok(memo(values))
            }
        }
    }
}

fn memo(values: Vec<FormulaValue>) -> FormulaValue {
    let mut values = values.into_iter();
    let value = values.next().unwrap_or(FormulaValue::Undefined);
    let memento = values
        .next()
        .filter(|m| !matches!(m, FormulaValue::Undefined))
        .map(Box::new);
    FormulaValue::Memo {
        value: Box::new(value),
        memento,
    }
}

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

fn eval_binary(op: BinaryOp, l: &FormulaValue, r: &FormulaValue) -> FormulaValue {
    match op {
        BinaryOp::Eq => FormulaValue::Bool(loose_eq(l, r)),
        BinaryOp::Neq => FormulaValue::Bool(!loose_eq(l, r)),
        BinaryOp::StrictEq => FormulaValue::Bool(strict_eq(l, r)),
        BinaryOp::StrictNeq => FormulaValue::Bool(!strict_eq(l, r)),
        BinaryOp::Lt => FormulaValue::Bool(compare(l, r) == Some(Ordering::Less)),
        BinaryOp::Lte => FormulaValue::Bool(matches!(
            compare(l, r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => FormulaValue::Bool(compare(l, r) == Some(Ordering::Greater)),
        BinaryOp::Gte => FormulaValue::Bool(matches!(
            compare(l, r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &FormulaValue, r: &FormulaValue) -> FormulaValue {
    if l.is_absent() || r.is_absent() {
        return FormulaValue::Undefined;
    }
    let (l, r) = (l.payload(), r.payload());

    match (op, l, r) {
        (BinaryOp::Add, FormulaValue::Text(_), _) | (BinaryOp::Add, _, FormulaValue::Text(_)) => {
            return FormulaValue::Text(format!("{}{}", l.display(), r.display()));
        }
        (BinaryOp::Add, FormulaValue::Date(d), n) | (BinaryOp::Add, n, FormulaValue::Date(d)) => {
            return shift_date(*d, n.as_number());
        }
        (BinaryOp::Sub, FormulaValue::Date(a), FormulaValue::Date(b)) => {
            return FormulaValue::Number(Decimal::from((*a - *b).whole_days()));
        }
        (BinaryOp::Sub, FormulaValue::Date(d), n) => {
            return shift_date(*d, n.as_number().map(|n| -n));
        }
        _ => {}
    }

    let (a, b) = match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return FormulaValue::Undefined,
    };
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        _ => None,
    };
    result
        .map(FormulaValue::Number)
        .unwrap_or(FormulaValue::Undefined)
}

fn shift_date(date: Date, days: Option<Decimal>) -> FormulaValue {
    // beyond the calendar range anyway; keeps Duration::days from overflowing
    const MAX_DAYS: i64 = 10_000_000;
    days.and_then(|d| d.trunc().to_i64())
        .filter(|d| d.abs() <= MAX_DAYS)
        .and_then(|d| date.checked_add(Duration::days(d)))
        .map(FormulaValue::Date)
        .unwrap_or(FormulaValue::Undefined)
}

fn loose_eq(l: &FormulaValue, r: &FormulaValue) -> bool {
    let (l, r) = (l.payload(), r.payload());
    match (l, r) {
        (
            FormulaValue::Undefined | FormulaValue::Null,
            FormulaValue::Undefined | FormulaValue::Null,
        ) => true,
        (FormulaValue::Undefined | FormulaValue::Null, _)
        | (_, FormulaValue::Undefined | FormulaValue::Null) => false,
        (FormulaValue::List(a), FormulaValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (FormulaValue::Text(a), FormulaValue::Text(b)) => a == b,
        (FormulaValue::Date(_), _) | (_, FormulaValue::Date(_)) => match (l.as_date(), r.as_date()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn strict_eq(l: &FormulaValue, r: &FormulaValue) -> bool {
    match (l.payload(), r.payload()) {
        (FormulaValue::Undefined, FormulaValue::Undefined) => true,
        (FormulaValue::Null, FormulaValue::Null) => true,
        (FormulaValue::Bool(a), FormulaValue::Bool(b)) => a == b,
        (FormulaValue::Number(a), FormulaValue::Number(b)) => a == b,
        (FormulaValue::Text(a), FormulaValue::Text(b)) => a == b,
        (FormulaValue::Date(a), FormulaValue::Date(b)) => a == b,
        (FormulaValue::List(a), FormulaValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strict_eq(x, y))
        }
        _ => false,
    }
}

fn compare(l: &FormulaValue, r: &FormulaValue) -> Option<Ordering> {
    let (l, r) = (l.payload(), r.payload());
    match (l, r) {
        (FormulaValue::Undefined, _) | (_, FormulaValue::Undefined) => None,
        (FormulaValue::Text(a), FormulaValue::Text(b)) => match (parse_date(a), parse_date(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(a.cmp(b)),
        },
        (FormulaValue::Date(_), _) | (_, FormulaValue::Date(_)) => Some(l.as_date()?.cmp(&r.as_date()?)),
        _ => Some(l.as_number()?.cmp(&r.as_number()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpecialValue;
    use enquete_core::compile;
    use time::macros::date;

    fn num(n: i64) -> FormulaValue {
        FormulaValue::Number(Decimal::from(n))
    }

    fn run(src: &str, operands: Vec<FormulaValue>) -> FormulaValue {
        let formula = compile(src).unwrap();
        eval_formula(&formula, &mut EvalContext::from_values(operands)).unwrap()
    }

    #[test]
    fn body_mass_index() {
        let result = run(
            "$1 / ($2 * $2)",
            vec![num(70), FormulaValue::Number(Decimal::new(16, 1))],
        );
        match result {
            FormulaValue::Number(imc) => {
                assert!((imc - Decimal::new(273, 1)).abs() < Decimal::new(1, 1))
            }
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_is_undefined() {
        assert_eq!(run("$1 / 0", vec![num(1)]), FormulaValue::Undefined);
    }

    #[test]
    fn absent_operands_propagate() {
        assert_eq!(run("$1 + 1", vec![FormulaValue::Undefined]), FormulaValue::Undefined);
        assert_eq!(run("$1 * 2", vec![FormulaValue::Null]), FormulaValue::Undefined);
    }

    #[test]
    fn loose_and_strict_equality() {
        assert_eq!(run("$1 == '1'", vec![num(1)]), FormulaValue::Bool(true));
        assert_eq!(run("$1 === '1'", vec![num(1)]), FormulaValue::Bool(false));
        assert_eq!(run("null == undefined", vec![]), FormulaValue::Bool(true));
        assert_eq!(run("null === undefined", vec![]), FormulaValue::Bool(false));
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(run("$1 || 'none'", vec![FormulaValue::Undefined]), FormulaValue::Text("none".into()));
        assert_eq!(run("$1 && 'yes'", vec![num(0)]), num(0));
    }

    #[test]
    fn date_arithmetic_counts_days() {
        let days = run(
            "$1 - #2024-01-01#",
            vec![FormulaValue::Date(date!(2024 - 03 - 01))],
        );
        assert_eq!(days, num(60));
        assert_eq!(
            run("#2024-02-28# + 2", vec![]),
            FormulaValue::Date(date!(2024 - 03 - 01))
        );
        assert_eq!(
            run("$1 < #2024-01-01#", vec![FormulaValue::Date(date!(2023 - 12 - 31))]),
            FormulaValue::Bool(true)
        );
    }

    #[test]
    fn text_concatenation() {
        assert_eq!(
            run("'n=' + $1", vec![FormulaValue::Number(Decimal::new(250, 2))]),
            FormulaValue::Text("n=2.5".into())
        );
    }

    #[test]
    fn membership_and_absence_tests() {
        assert_eq!(
            run("~IN(['A', 'B'], $1)", vec![FormulaValue::Text("B".into())]),
            FormulaValue::Bool(true)
        );
        let many = FormulaValue::List(vec![FormulaValue::Text("C".into()), FormulaValue::Text("A".into())]);
        assert_eq!(run("~IN(['A', 'B'], $1)", vec![many]), FormulaValue::Bool(true));
        assert_eq!(
            run("~UNDEF($1, $2)", vec![FormulaValue::Undefined, FormulaValue::Undefined]),
            FormulaValue::Bool(true)
        );
        assert_eq!(
            run("~NA($1, $2)", vec![FormulaValue::Null, FormulaValue::Undefined]),
            FormulaValue::Bool(false)
        );
    }

    #[test]
    fn temporaries_and_sequences() {
        assert_eq!(run("(_x = $1 + 1, _x * _x)", vec![num(2)]), num(9));
    }

    #[test]
    fn mem_defaults_to_pending_memento() {
        assert_eq!(
            run("~MEM($1)", vec![num(3)]),
            FormulaValue::Memo {
                value: Box::new(num(3)),
                memento: None
            }
        );
        assert_eq!(
            run("~MEM(undefined, 4)", vec![]),
            FormulaValue::Memo {
                value: Box::new(FormulaValue::Undefined),
                memento: Some(Box::new(num(4)))
            }
        );
    }

    #[test]
    fn memo_shorthand_waits_for_a_value() {
        assert_eq!(run("$($1)", vec![FormulaValue::Undefined]), FormulaValue::Undefined);
        assert!(matches!(run("$($1)", vec![num(5)]), FormulaValue::Memo { .. }));
    }

    #[test]
    fn memo_shorthand_keeps_a_memoized_target() {
        let source = ItemValue::new(Some(Value::Number(Decimal::from(8))));
        let target = ItemValue {
            value: Some(Value::Number(Decimal::from(5))),
            context: Some(Context::Memo {
                context: 0,
                memento: None,
            }),
            ..ItemValue::default()
        };
        let formula = compile("$($1)").unwrap();
        let mut ctx = EvalContext::new(&[&source, &target]);
        assert_eq!(
            eval_formula(&formula, &mut ctx).unwrap(),
            FormulaValue::Memo {
                value: Box::new(num(5)),
                memento: None
            }
        );
    }

    #[test]
    fn not_applicable_operands_are_null() {
        let na = ItemValue::with_special(SpecialValue::NotApplicable);
        assert_eq!(FormulaValue::from_item(&na), FormulaValue::Null);
        assert_eq!(FormulaValue::from_item(&ItemValue::default()), FormulaValue::Undefined);
    }

    #[test]
    fn out_of_range_operand_is_an_evaluation_error() {
        let formula = compile("$3").unwrap();
        let err = eval_formula(&formula, &mut EvalContext::from_values(vec![num(1)])).unwrap_err();
        assert!(matches!(err, EvalError::Evaluation { .. }));
    }

    #[test]
    fn invalid_date_literal_is_rejected() {
        let formula = compile("#2023-02-30#").unwrap();
        assert!(check_dates(&formula).is_err());
    }
}
