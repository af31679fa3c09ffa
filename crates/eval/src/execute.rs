//! Rule execution over a scope.
//!
//! Rules run in sequence order, each one folding its results back into the
//! local items of the scope. A first pass runs every rule the trigger
//! admits and records the item instances it switched to not applicable. A
//! second pass reruns the initialization rules on exactly those instances,
//! so defaults and copies settle on the now inactive fields.

use std::borrow::Cow;
use std::collections::BTreeSet;

use enquete_interchange::Trigger;
use tracing::{debug, trace, warn};

use crate::crossrule::CrossItemRule;
use crate::scope::{Resolved, Scope, ScopeLevel};
use crate::types::{EvalError, InterviewItem, ItemKey, ItemValue, PageItem};

/// Scope threaded through a pass, plus the items the pass deactivated.
#[derive(Debug, Clone)]
pub struct PassState {
    pub scope: Scope,
    pub deactivated: BTreeSet<ItemKey>,
}

impl PassState {
    pub fn new(scope: Scope) -> PassState {
        PassState {
            scope,
            deactivated: BTreeSet::new(),
        }
    }
}

/// Whether a run with `trigger` executes `rule`.
pub fn admits(trigger: Trigger, rule: &CrossItemRule) -> bool {
    trigger == Trigger::Initialization || rule.when() == Trigger::Always
}

/// Both passes over `scope`.
pub fn execute(rules: &[CrossItemRule], scope: Scope, trigger: Trigger) -> Scope {
    let first = run_pass(rules, PassState::new(scope), |rule| admits(trigger, rule));
    if first.deactivated.is_empty() {
        return first.scope;
    }
    debug!(count = first.deactivated.len(), "second pass over deactivated items");
    let second = settle_deactivated(rules, PassState::new(first.scope), &first.deactivated);
    second.scope
}

/// One pass over the rules `select` keeps.
pub fn run_pass(
    rules: &[CrossItemRule],
    state: PassState,
    select: impl Fn(&CrossItemRule) -> bool,
) -> PassState {
    rules
        .iter()
        .filter(|rule| select(rule))
        .fold(state, |state, rule| execute_rule(rule, state))
}

/// Rerun the initialization rules targeting `deactivated`, on those
/// instances only.
pub fn settle_deactivated(
    rules: &[CrossItemRule],
    state: PassState,
    deactivated: &BTreeSet<ItemKey>,
) -> PassState {
    rules
        .iter()
        .filter(|rule| rule.when() == Trigger::Initialization)
        .fold(state, |state, rule| {
            let target = rule.target().variable();
            deactivated
                .iter()
                .filter(|key| key.variable == target)
                .fold(state, |mut state, key| {
                    if let Err(e) = execute_instance(rule, key.instance, &mut state) {
                        report(rule, key.instance, &e);
                    }
                    state
                })
        })
}

/// Run `rule` on its target, once per recorded instance for array items.
pub fn execute_rule(rule: &CrossItemRule, mut state: PassState) -> PassState {
    let mut instance = 1;
    loop {
        match execute_instance(rule, instance, &mut state) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                report(rule, instance, &e);
                // only evaluation failures are per instance
                if !matches!(e, EvalError::TypeError { .. } | EvalError::Evaluation { .. }) {
                    break;
                }
            }
        }
        if !rule.target().is_array() {
            break;
        }
        instance += 1;
    }
    state
}

fn report(rule: &CrossItemRule, instance: u32, e: &EvalError) {
    warn!(
        rule = %rule.name(),
        target = rule.target().variable(),
        instance,
        error = %e,
        "rule execution failed"
    );
}

/// Resolve the operands for `instance` and apply the rule. `Ok(false)`
/// when an operand is not in scope, which ends an instance walk. A rule
/// deriving its target from an unanswered source is skipped.
fn execute_instance(
    rule: &CrossItemRule,
    instance: u32,
    state: &mut PassState,
) -> Result<bool, EvalError> {
    let blank = ItemValue::default();
    let mut operands: Vec<(PageItem, ScopeLevel, bool)> = Vec::with_capacity(rule.operands().len());
    let mut values: Vec<&ItemValue> = Vec::with_capacity(rule.operands().len());
    for (item, level) in rule.operands() {
        let item = if item.is_array() {
            item.get_instance(instance)?
        } else {
            item.clone()
        };
        match state.scope.get(&item, *level) {
            None => {
                trace!(rule = %rule.name(), operand = %item.key(), "operand out of scope");
                return Ok(false);
            }
            Some(Resolved::Missing) => {
                values.push(&blank);
                operands.push((item, *level, false));
            }
            Some(Resolved::Item(found)) => {
                values.push(found.value());
                operands.push((item, *level, true));
            }
        }
    }

    let sources = operands.len().saturating_sub(1);
    let unanswered = operands[..sources].iter().any(|(_, _, recorded)| !recorded);
    if rule.rule().reads_sources() && unanswered {
        trace!(rule = %rule.name(), target = %rule.target().key(), "source unanswered");
        return Ok(true);
    }

    let was_applicable: Vec<bool> = values.iter().map(|v| !v.is_not_applicable()).collect();
    let changed: Vec<(usize, ItemValue)> = rule
        .rule()
        .execute(&values)?
        .into_iter()
        .enumerate()
        .filter_map(|(i, result)| match result {
            Cow::Owned(value) => Some((i, value)),
            Cow::Borrowed(_) => None,
        })
        .collect();

    for (i, value) in changed {
        let Some((item, level, recorded)) = operands.get(i) else {
            continue;
        };
        if *level != ScopeLevel::Local || !recorded {
            continue;
        }
        if was_applicable[i] && value.is_not_applicable() {
            trace!(item = %item.key(), "deactivated");
            state.deactivated.insert(item.key());
        }
        state
            .scope
            .replace_local(InterviewItem::new(item.clone(), value));
    }
    Ok(true)
}
