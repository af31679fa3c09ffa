//! Answer values, special values and item contexts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use enquete_interchange::SpecialValueName;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::{Date, Month};

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A typed answer. Absence is `Option::None` on the owning item, never a
/// variant here. All numbers use `rust_decimal::Decimal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(Decimal),
    Text(String),
    Date(Date),
    /// Year-only or year-month date, kept as its ISO prefix.
    PartialDate(String),
    Bool(bool),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Date(_) => "Date",
            Value::PartialDate(_) => "PartialDate",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
        }
    }

    /// Untyped conversion, used where no item type is known (constants,
    /// trigger values, mementos). Full ISO dates become dates; empty
    /// strings and `null` are absent.
    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => decimal_from_json(n).map(Value::Number),
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(match parse_date(s) {
                Some(d) => Value::Date(d),
                None => Value::Text(s.clone()),
            }),
            serde_json::Value::Array(items) => {
                Some(Value::List(items.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(d) => decimal_to_json(*d),
            Value::Text(s) | Value::PartialDate(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(*d)),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            Value::Bool(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Value::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Date view of the value. Partial dates anchor to the first day of
    /// their year or month.
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            Value::PartialDate(s) => anchor_partial_date(s),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Equality across representations: `1` matches `"1"` and `true`,
    /// a date matches its ISO text, a list matches if any element does.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(items), other) | (other, Value::List(items))
                if !matches!(other, Value::List(_)) =>
            {
                items.iter().any(|item| item.loosely_equals(other))
            }
            (Value::Number(_), _) | (_, Value::Number(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (Value::Date(_), _) | (_, Value::Date(_)) => match (self.as_date(), other.as_date()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Value::PartialDate(a), Value::PartialDate(b)) => a == b,
            (Value::PartialDate(a), Value::Text(b)) | (Value::Text(a), Value::PartialDate(b)) => {
                a == b
            }
            _ => self == other,
        }
    }

    /// Ordering for range checks. Numbers compare with numbers, dates
    /// (partial ones anchored) with dates; anything else is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            _ => match (self.as_date(), other.as_date()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(d) => write!(f, "{}", d.normalize()),
            Value::Text(s) | Value::PartialDate(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&format_date(*d)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

// ──────────────────────────────────────────────
// Special values and contexts
// ──────────────────────────────────────────────

/// A non-answer marker, distinct from both a value and plain absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialValue {
    Unknown,
    NotApplicable,
    NotDone,
    Undefined,
}

impl From<SpecialValueName> for SpecialValue {
    fn from(name: SpecialValueName) -> Self {
        match name {
            SpecialValueName::Unknown => SpecialValue::Unknown,
            SpecialValueName::NotApplicable => SpecialValue::NotApplicable,
            SpecialValueName::NotDone => SpecialValue::NotDone,
            SpecialValueName::Undefined => SpecialValue::Undefined,
        }
    }
}

impl From<SpecialValue> for SpecialValueName {
    fn from(value: SpecialValue) -> Self {
        match value {
            SpecialValue::Unknown => SpecialValueName::Unknown,
            SpecialValue::NotApplicable => SpecialValueName::NotApplicable,
            SpecialValue::NotDone => SpecialValueName::NotDone,
            SpecialValue::Undefined => SpecialValueName::Undefined,
        }
    }
}

/// Item context: a variant selector for contextual item types, optionally
/// paired with a memento carried forward by computed rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    Single(u32),
    /// `memento` is `None` while the memoized computation is still
    /// pending a value of its own.
    Memo { context: u32, memento: Option<Value> },
}

impl Context {
    pub fn number(&self) -> u32 {
        match self {
            Context::Single(n) | Context::Memo { context: n, .. } => *n,
        }
    }

    pub fn is_memo(&self) -> bool {
        matches!(self, Context::Memo { .. })
    }

    /// `n` or `[n, memento]`.
    pub fn from_json(v: &serde_json::Value) -> Option<Context> {
        match v {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Context::Single),
            serde_json::Value::Array(pair) => {
                let context = pair.first()?.as_u64().and_then(|n| u32::try_from(n).ok())?;
                let memento = pair.get(1).and_then(Value::from_json);
                Some(Context::Memo { context, memento })
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Context::Single(n) => serde_json::Value::from(*n),
            Context::Memo { context, memento } => serde_json::Value::Array(vec![
                serde_json::Value::from(*context),
                memento.as_ref().map(Value::to_json).unwrap_or(serde_json::Value::Null),
            ]),
        }
    }
}

// ──────────────────────────────────────────────
// Numeric and calendar helpers
// ──────────────────────────────────────────────

pub fn decimal_from_json(n: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

pub fn decimal_to_json(d: Decimal) -> serde_json::Value {
    let normalized = d.normalize();
    if normalized.scale() == 0 {
        if let Some(i) = normalized.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    serde_json::Number::from_str(&normalized.to_string())
        .map(serde_json::Value::Number)
        .unwrap_or_else(|_| serde_json::Value::String(normalized.to_string()))
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<Date> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u8 = s[5..7].parse().ok()?;
    let day: u8 = s[8..10].parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

pub fn format_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

/// `YYYY` or `YYYY-MM`.
pub fn is_partial_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    let digits = |r: std::ops::Range<usize>| bytes[r].iter().all(u8::is_ascii_digit);
    match bytes.len() {
        4 => digits(0..4),
        7 => digits(0..4) && bytes[4] == b'-' && digits(5..7) && anchor_partial_date(s).is_some(),
        _ => false,
    }
}

fn anchor_partial_date(s: &str) -> Option<Date> {
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month = match s.get(5..7) {
        Some(m) => Month::try_from(m.parse::<u8>().ok()?).ok()?,
        None => Month::January,
    };
    Date::from_calendar_date(year, month, 1).ok()
}
