//! Rule construction from interchange arguments.
//!
//! Every rule can be built from keyed [`RuleArgs`] or from a rule name and
//! its positional arguments, and turned back into keyed arguments.

use enquete_interchange::{RuleArgs, RuleName};

use super::{
    ActivationRule, ComputedRule, ConstantRule, CopyRule, CriticalRule, DecimalPrecisionRule,
    DynamicRule, FixedLengthRule, InRangeRule, LetterCaseRule, MaxLengthRule, RequiredRule, Rule,
};
use crate::types::values::{is_partial_date, parse_date};
use crate::types::{EvalError, Value};

/// Rule factory.
pub struct Rules;

impl Rules {
    pub fn create(args: &RuleArgs) -> Result<Rule, EvalError> {
        let rule = match args {
            RuleArgs::Required { enforced } => Rule::Required(RequiredRule {
                enforced: *enforced,
            }),
            RuleArgs::Constant { value } => Rule::Constant(ConstantRule {
                value: Value::from_json(value),
            }),
            RuleArgs::InRange { min, max, limits } => Rule::InRange(InRangeRule::new(
                bound(min)?,
                bound(max)?,
                *limits,
            )),
            RuleArgs::MaxLength { length } => Rule::MaxLength(MaxLengthRule { length: *length }),
            RuleArgs::FixedLength { length } => {
                Rule::FixedLength(FixedLengthRule { length: *length })
            }
            RuleArgs::DecimalPrecision { precision } => {
                if *precision > 28 {
                    return Err(EvalError::invalid_args(
                        RuleName::DecimalPrecision.as_str(),
                        format!("precision {} exceeds 28 decimals", precision),
                    ));
                }
                Rule::DecimalPrecision(DecimalPrecisionRule {
                    precision: *precision,
                })
            }
            RuleArgs::LetterCase { letter_case } => Rule::LetterCase(LetterCaseRule {
                letter_case: *letter_case,
            }),
            RuleArgs::Critical {
                event,
                message,
                values,
                unconditional,
            } => Rule::Critical(CriticalRule {
                event: event.clone(),
                message: message.clone(),
                values: values.iter().filter_map(Value::from_json).collect(),
                unconditional: *unconditional,
            }),
            RuleArgs::Activation { values, behavior } => {
                if values.is_empty() {
                    return Err(EvalError::invalid_args(
                        RuleName::Activation.as_str(),
                        "at least one activation value is required",
                    ));
                }
                Rule::Activation(ActivationRule {
                    values: values.iter().filter_map(Value::from_json).collect(),
                    behavior: *behavior,
                })
            }
            RuleArgs::Copy => Rule::Copy(CopyRule),
            RuleArgs::Computed { formula, arg_count } => {
                Rule::Computed(ComputedRule::new(formula, *arg_count)?)
            }
            RuleArgs::Dynamic {
                underlying,
                formula,
                arg_count,
                extra_args,
            } => Rule::Dynamic(DynamicRule::new(
                *underlying,
                formula,
                *arg_count,
                extra_args.clone(),
            )?),
        };
        Ok(rule)
    }

    pub fn create_positional(name: RuleName, args: &[serde_json::Value]) -> Result<Rule, EvalError> {
        Rules::create(&RuleArgs::from_positional(name, args)?)
    }

    /// Positional constructor for `name`.
    pub fn factory(name: RuleName) -> impl Fn(&[serde_json::Value]) -> Result<Rule, EvalError> {
        move |args| Rules::create_positional(name, args)
    }

    /// Keyed arguments that rebuild `rule`.
    pub fn args(rule: &Rule) -> RuleArgs {
        let values = |vs: &[Value]| -> Vec<serde_json::Value> { vs.iter().map(Value::to_json).collect() };
        match rule {
            Rule::Required(r) => RuleArgs::Required {
                enforced: r.enforced,
            },
            Rule::Constant(r) => RuleArgs::Constant {
                value: r
                    .value
                    .as_ref()
                    .map_or(serde_json::Value::Null, Value::to_json),
            },
            Rule::InRange(r) => RuleArgs::InRange {
                min: r.min.as_ref().map_or(serde_json::Value::Null, Value::to_json),
                max: r.max.as_ref().map_or(serde_json::Value::Null, Value::to_json),
                limits: r.limits,
            },
            Rule::MaxLength(r) => RuleArgs::MaxLength { length: r.length },
            Rule::FixedLength(r) => RuleArgs::FixedLength { length: r.length },
            Rule::DecimalPrecision(r) => RuleArgs::DecimalPrecision {
                precision: r.precision,
            },
            Rule::LetterCase(r) => RuleArgs::LetterCase {
                letter_case: r.letter_case,
            },
            Rule::Critical(r) => RuleArgs::Critical {
                event: r.event.clone(),
                message: r.message.clone(),
                values: values(&r.values),
                unconditional: r.unconditional,
            },
            Rule::Activation(r) => RuleArgs::Activation {
                values: values(&r.values),
                behavior: r.behavior,
            },
            Rule::Copy(_) => RuleArgs::Copy,
            Rule::Computed(r) => RuleArgs::Computed {
                formula: r.formula().to_string(),
                arg_count: r.arg_count(),
            },
            Rule::Dynamic(r) => RuleArgs::Dynamic {
                underlying: r.underlying(),
                formula: r.formula().to_string(),
                arg_count: r.arg_count(),
                extra_args: r.extra_args().to_vec(),
            },
        }
    }
}

/// Range bound: `null` is open, otherwise a number or a (partial) date.
fn bound(v: &serde_json::Value) -> Result<Option<Value>, EvalError> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(_) => Ok(Value::from_json(v)),
        serde_json::Value::String(s) => {
            if let Some(d) = parse_date(s) {
                Ok(Some(Value::Date(d)))
            } else if is_partial_date(s) {
                Ok(Some(Value::PartialDate(s.clone())))
            } else {
                Err(EvalError::invalid_args(
                    RuleName::InRange.as_str(),
                    format!("bound '{}' is neither a number nor a date", s),
                ))
            }
        }
        other => Err(EvalError::invalid_args(
            RuleName::InRange.as_str(),
            format!("bound {} is neither a number nor a date", other),
        )),
    }
}
