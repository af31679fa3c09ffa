//! Multi-operand rules. The first operand is the source or activator,
//! the last is the target.

use std::borrow::Cow;

use enquete_core::{compile, Formula};
use enquete_interchange::{ActivationBehavior, RuleName};

use super::{CrossRule, Rules};
use crate::formula::{check_dates, eval_formula, EvalContext, FormulaValue};
use crate::types::{Context, EvalError, ItemPatch, ItemValue, SpecialValue, Value};

fn borrowed<'a>(items: &[&'a ItemValue]) -> Vec<Cow<'a, ItemValue>> {
    items.iter().map(|i| Cow::Borrowed(*i)).collect()
}

/// Replace the target's slot with `target`, leaving the others borrowed.
fn with_target<'a>(items: &[&'a ItemValue], target: Cow<'a, ItemValue>) -> Vec<Cow<'a, ItemValue>> {
    let mut out = borrowed(&items[..items.len() - 1]);
    out.push(target);
    out
}

// ──────────────────────────────────────────────
// Activation
// ──────────────────────────────────────────────

/// Enables the target while the activator holds one of `values`.
///
/// A deactivated target loses its value and unit, its `required` message,
/// and is marked not applicable. Reactivation only lifts the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRule {
    pub values: Vec<Value>,
    pub behavior: ActivationBehavior,
}

impl ActivationRule {
    pub fn enable(values: Vec<Value>) -> Self {
        ActivationRule {
            values,
            behavior: ActivationBehavior::Enable,
        }
    }

    pub fn show(values: Vec<Value>) -> Self {
        ActivationRule {
            values,
            behavior: ActivationBehavior::Show,
        }
    }

    fn matches(&self, activator: &ItemValue) -> bool {
        activator
            .value
            .as_ref()
            .is_some_and(|v| self.values.iter().any(|a| v.loosely_equals(a)))
    }
}

impl CrossRule for ActivationRule {
    fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError> {
        let (activator, target) = match items {
            [activator, .., target] => (*activator, *target),
            _ => return Err(EvalError::evaluation("activation needs an activator and a target")),
        };
        let result = if self.matches(activator) {
            if target.is_not_applicable() {
                target.apply(ItemPatch::new().special_value(None))
            } else {
                Cow::Borrowed(target)
            }
        } else if target.is_not_applicable() {
            Cow::Borrowed(target)
        } else {
            target.apply(
                ItemPatch::new()
                    .value(None)
                    .unit(None)
                    .special_value(Some(SpecialValue::NotApplicable))
                    .messages(target.messages.without_message("required")),
            )
        };
        Ok(with_target(items, result))
    }
}

// ──────────────────────────────────────────────
// Copy
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyRule;

impl CrossRule for CopyRule {
    fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError> {
        let (source, target) = match items {
            [source, .., target] => (*source, *target),
            _ => return Err(EvalError::evaluation("copy needs a source and a target")),
        };
        let result = target.apply(
            ItemPatch::new()
                .value(source.value.clone())
                .unit(source.unit.clone())
                .special_value(source.special_value),
        );
        Ok(with_target(items, result))
    }
}

// ──────────────────────────────────────────────
// Computed
// ──────────────────────────────────────────────

/// Writes the result of a formula over `$1..$n` into the target, the
/// `n`-th operand. A memoized result also stores its memento in the
/// target's context.
#[derive(Debug, Clone)]
pub struct ComputedRule {
    formula: Formula,
    arg_count: usize,
}

impl PartialEq for ComputedRule {
    fn eq(&self, other: &Self) -> bool {
        self.formula.source == other.formula.source && self.arg_count == other.arg_count
    }
}

impl ComputedRule {
    pub fn new(formula: &str, arg_count: usize) -> Result<ComputedRule, EvalError> {
        let compiled = compile(formula)?;
        check_dates(&compiled)?;
        if compiled.arity > arg_count {
            return Err(EvalError::invalid_args(
                RuleName::Computed.as_str(),
                format!(
                    "formula references ${} but only {} operand(s) are declared",
                    compiled.arity, arg_count
                ),
            ));
        }
        Ok(ComputedRule {
            formula: compiled,
            arg_count,
        })
    }

    pub fn formula(&self) -> &str {
        &self.formula.source
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Evaluate the formula against the operands, target last.
    pub fn compute(&self, items: &[&ItemValue]) -> Result<FormulaValue, EvalError> {
        if items.len() != self.arg_count {
            return Err(EvalError::evaluation(format!(
                "formula '{}' expects {} operand(s), got {}",
                self.formula.source,
                self.arg_count,
                items.len()
            )));
        }
        let mut ctx = EvalContext::new(items);
        eval_formula(&self.formula, &mut ctx)
    }
}

impl CrossRule for ComputedRule {
    fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError> {
        let target = match items.last() {
            Some(t) => *t,
            None => return Err(EvalError::evaluation("computed rule has no target")),
        };
        let patch = match self.compute(items)? {
            FormulaValue::Memo { value, memento } => ItemPatch::new()
                .value(value.to_value())
                .special_value(None)
                .context(Some(Context::Memo {
                    context: target.context.as_ref().map_or(0, Context::number),
                    memento: memento.and_then(|m| m.to_value()),
                })),
            result => ItemPatch::new()
                .value(result.to_value())
                .special_value(None),
        };
        Ok(with_target(items, target.apply(patch)))
    }
}

// ──────────────────────────────────────────────
// Dynamic
// ──────────────────────────────────────────────

/// Builds `underlying` from the list a formula yields, followed by the
/// static `extra_args`, and runs it on the same operands.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRule {
    underlying: RuleName,
    computed: ComputedRule,
    extra_args: Vec<serde_json::Value>,
}

impl DynamicRule {
    pub fn new(
        underlying: RuleName,
        formula: &str,
        arg_count: usize,
        extra_args: Vec<serde_json::Value>,
    ) -> Result<DynamicRule, EvalError> {
        if underlying == RuleName::Dynamic {
            return Err(EvalError::invalid_args(
                RuleName::Dynamic.as_str(),
                "a dynamic rule cannot wrap another dynamic rule",
            ));
        }
        Ok(DynamicRule {
            underlying,
            computed: ComputedRule::new(formula, arg_count)?,
            extra_args,
        })
    }

    pub fn underlying(&self) -> RuleName {
        self.underlying
    }

    pub fn formula(&self) -> &str {
        self.computed.formula()
    }

    pub fn arg_count(&self) -> usize {
        self.computed.arg_count()
    }

    pub fn extra_args(&self) -> &[serde_json::Value] {
        &self.extra_args
    }
}

impl CrossRule for DynamicRule {
    fn execute<'a>(&self, items: &[&'a ItemValue]) -> Result<Vec<Cow<'a, ItemValue>>, EvalError> {
        let mut args: Vec<serde_json::Value> = match self.computed.compute(items)? {
            FormulaValue::List(values) => values.iter().map(FormulaValue::to_json).collect(),
            // parameters not computable yet
            FormulaValue::Undefined => return Ok(borrowed(items)),
            other => {
                return Err(EvalError::TypeError {
                    message: format!(
                        "dynamic '{}' formula must yield a list, got {}",
                        self.underlying,
                        other.type_name()
                    ),
                })
            }
        };
        args.extend(self.extra_args.iter().cloned());
        let rule = Rules::create_positional(self.underlying, &args)?;
        rule.execute(items)
    }
}
