//! Single-item rules.

use std::borrow::Cow;
use std::cmp::Ordering;

use enquete_interchange::{LetterCase, Limits};
use rust_decimal::RoundingStrategy;

use super::UnitRule;
use crate::types::{ItemPatch, ItemValue, Value};

/// Raises `"value is required"` while an item has neither a value nor a
/// special value. Not enforced, it does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredRule {
    pub enforced: bool,
}

impl Default for RequiredRule {
    fn default() -> Self {
        RequiredRule { enforced: true }
    }
}

impl UnitRule for RequiredRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        if !self.enforced {
            return Cow::Borrowed(item);
        }
        if item.value.is_none() && item.special_value.is_none() {
            item.with_message("required", "value is required")
        } else {
            item.without_message("required")
        }
    }
}

/// Forces a fixed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantRule {
    pub value: Option<Value>,
}

impl UnitRule for ConstantRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        item.apply(ItemPatch::new().value(self.value.clone()))
    }
}

/// Numeric or date range. Absent bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InRangeRule {
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub limits: Limits,
}

impl InRangeRule {
    pub fn new(min: Option<Value>, max: Option<Value>, limits: Limits) -> Self {
        InRangeRule { min, max, limits }
    }

    fn in_range(&self, value: &Value) -> bool {
        let above_min = match &self.min {
            None => true,
            Some(min) => match value.compare(min) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => self.limits.include_lower,
                Some(Ordering::Less) => false,
                None => true,
            },
        };
        let below_max = match &self.max {
            None => true,
            Some(max) => match value.compare(max) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => self.limits.include_upper,
                Some(Ordering::Greater) => false,
                None => true,
            },
        };
        above_min && below_max
    }

    fn message(&self) -> String {
        let lo = if self.limits.include_lower { "[" } else { "]" };
        let hi = if self.limits.include_upper { "]" } else { "[" };
        let show = |bound: &Option<Value>| bound.as_ref().map(Value::to_string).unwrap_or_default();
        format!(
            "value must be in range {}{}, {}{}",
            lo,
            show(&self.min),
            show(&self.max),
            hi
        )
    }
}

impl UnitRule for InRangeRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        match &item.value {
            Some(value) if !self.in_range(value) => item.with_message("inRange", self.message()),
            _ => item.without_message("inRange"),
        }
    }
}

fn text_length(item: &ItemValue) -> Option<usize> {
    match &item.value {
        Some(Value::Text(s)) => Some(s.chars().count()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxLengthRule {
    pub length: u32,
}

impl UnitRule for MaxLengthRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        match text_length(item) {
            Some(n) if n > self.length as usize => item.with_message(
                "maxLength",
                format!("Text must be less than {} characters long", self.length),
            ),
            _ => item.without_message("maxLength"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedLengthRule {
    pub length: u32,
}

impl UnitRule for FixedLengthRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        match text_length(item) {
            Some(n) if n != self.length as usize => {
                item.with_message("fixedLength", format!("text length must be {}", self.length))
            }
            _ => item.without_message("fixedLength"),
        }
    }
}

/// Rounds numbers to `precision` decimals, half away from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalPrecisionRule {
    pub precision: u32,
}

impl UnitRule for DecimalPrecisionRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        match &item.value {
            Some(Value::Number(d)) => {
                let rounded =
                    d.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointAwayFromZero);
                item.apply(ItemPatch::new().value(Some(Value::Number(rounded))))
            }
            _ => Cow::Borrowed(item),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterCaseRule {
    pub letter_case: LetterCase,
}

impl UnitRule for LetterCaseRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        match &item.value {
            Some(Value::Text(s)) => {
                let cased = match self.letter_case {
                    LetterCase::Upper => s.to_uppercase(),
                    LetterCase::Lower => s.to_lowercase(),
                };
                item.apply(ItemPatch::new().value(Some(Value::Text(cased))))
            }
            _ => Cow::Borrowed(item),
        }
    }
}

/// Flags a critical event (an adverse event, typically) under the
/// `critical` message.
///
/// Triggers when `unconditional`, when a trigger value matches, or, with
/// no trigger values, whenever the item has a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalRule {
    pub event: String,
    pub message: Option<String>,
    pub values: Vec<Value>,
    pub unconditional: bool,
}

impl CriticalRule {
    fn triggered(&self, item: &ItemValue) -> bool {
        if self.unconditional {
            return true;
        }
        match &item.value {
            None => false,
            Some(_) if self.values.is_empty() => true,
            Some(v) => self.values.iter().any(|t| v.loosely_equals(t)),
        }
    }

    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.event)
    }
}

impl UnitRule for CriticalRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue> {
        if self.triggered(item) {
            item.with_message("critical", self.text())
        } else {
            item.without_message("critical")
        }
    }
}
