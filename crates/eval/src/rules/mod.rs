//! Unit and cross rules.
//!
//! A unit rule maps one item to itself or to an updated copy. A cross rule
//! reads several operands and may update any of them; in practice only the
//! last operand, the target, changes. Both hand back `Cow::Borrowed` when
//! nothing changed, which the orchestrator relies on to skip write-backs.

pub mod cross;
pub mod factory;
pub mod unit;

use std::borrow::Cow;

use enquete_interchange::RuleName;

use crate::types::{EvalError, ItemValue};

pub use cross::{ActivationRule, ComputedRule, CopyRule, DynamicRule};
pub use factory::Rules;
pub use unit::{
    ConstantRule, CriticalRule, DecimalPrecisionRule, FixedLengthRule, InRangeRule,
    LetterCaseRule, MaxLengthRule, RequiredRule,
};

pub trait UnitRule {
    fn execute<'a>(&self, item: &'a ItemValue) -> Cow<'a, ItemValue>;
}

pub trait CrossRule {
    fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError>;
}

/// Any rule the engine knows.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required(RequiredRule),
    Constant(ConstantRule),
    InRange(InRangeRule),
    MaxLength(MaxLengthRule),
    FixedLength(FixedLengthRule),
    DecimalPrecision(DecimalPrecisionRule),
    LetterCase(LetterCaseRule),
    Critical(CriticalRule),
    Activation(ActivationRule),
    Copy(CopyRule),
    Computed(ComputedRule),
    Dynamic(DynamicRule),
}

/// Execution priority among rules sharing a target; higher runs first.
pub fn precedence_of(name: RuleName) -> u32 {
    match name {
        RuleName::Constant | RuleName::Copy | RuleName::Computed => 100,
        RuleName::DecimalPrecision | RuleName::LetterCase => 70,
        RuleName::Activation => 50,
        RuleName::Required
        | RuleName::InRange
        | RuleName::MaxLength
        | RuleName::FixedLength
        | RuleName::Critical
        | RuleName::Dynamic => 10,
    }
}

impl Rule {
    pub fn name(&self) -> RuleName {
        match self {
            Rule::Required(_) => RuleName::Required,
            Rule::Constant(_) => RuleName::Constant,
            Rule::InRange(_) => RuleName::InRange,
            Rule::MaxLength(_) => RuleName::MaxLength,
            Rule::FixedLength(_) => RuleName::FixedLength,
            Rule::DecimalPrecision(_) => RuleName::DecimalPrecision,
            Rule::LetterCase(_) => RuleName::LetterCase,
            Rule::Critical(_) => RuleName::Critical,
            Rule::Activation(_) => RuleName::Activation,
            Rule::Copy(_) => RuleName::Copy,
            Rule::Computed(_) => RuleName::Computed,
            Rule::Dynamic(_) => RuleName::Dynamic,
        }
    }

    /// A dynamic rule ranks as the rule it builds.
    pub fn precedence(&self) -> u32 {
        match self {
            Rule::Dynamic(d) => precedence_of(d.underlying()),
            other => precedence_of(other.name()),
        }
    }

    /// Smallest operand count the rule can run on.
    pub fn min_operands(&self) -> usize {
        match self {
            Rule::Activation(_) | Rule::Copy(_) => 2,
            Rule::Computed(c) => c.arg_count(),
            Rule::Dynamic(d) => d.arg_count(),
            _ => 1,
        }
    }

    /// Whether the target is derived from the other operands' values.
    /// Such rules cannot run while a source is unanswered.
    pub fn reads_sources(&self) -> bool {
        matches!(self, Rule::Copy(_) | Rule::Computed(_) | Rule::Dynamic(_))
    }

    fn as_unit(&self) -> Option<&dyn UnitRule> {
        match self {
            Rule::Required(r) => Some(r),
            Rule::Constant(r) => Some(r),
            Rule::InRange(r) => Some(r),
            Rule::MaxLength(r) => Some(r),
            Rule::FixedLength(r) => Some(r),
            Rule::DecimalPrecision(r) => Some(r),
            Rule::LetterCase(r) => Some(r),
            Rule::Critical(r) => Some(r),
            _ => None,
        }
    }

    /// Run the rule over its operands, target last. Unit rules only see
    /// the target.
    pub fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError> {
        if items.len() < self.min_operands() || items.is_empty() {
            return Err(EvalError::evaluation(format!(
                "rule '{}' needs {} operand(s), got {}",
                self.name(),
                self.min_operands(),
                items.len()
            )));
        }
        if let Some(unit) = self.as_unit() {
            let last = items.len() - 1;
            return Ok(items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    if i == last {
                        unit.execute(*item)
                    } else {
                        Cow::Borrowed(*item)
                    }
                })
                .collect());
        }
        match self {
            Rule::Activation(r) => r.execute(items),
            Rule::Copy(r) => r.execute(items),
            Rule::Computed(r) => r.execute(items),
            Rule::Dynamic(r) => r.execute(items),
            _ => Ok(items.iter().map(|i| Cow::Borrowed(*i)).collect()),
        }
    }
}
