//! Rules bound to page items, and their execution order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use enquete_interchange::{RuleName, Trigger};

use crate::rules::Rule;
use crate::scope::ScopeLevel;
use crate::types::{EvalError, PageItem};

/// A rule bound to its operands, target last, each resolved at a scope
/// level.
#[derive(Debug, Clone)]
pub struct CrossItemRule {
    operands: Vec<(PageItem, ScopeLevel)>,
    rule: Rule,
    when: Trigger,
}

impl CrossItemRule {
    pub fn new(
        operands: Vec<(PageItem, ScopeLevel)>,
        rule: Rule,
        when: Trigger,
    ) -> Result<CrossItemRule, EvalError> {
        let target_level = operands.last().map(|(_, level)| *level);
        if target_level != Some(ScopeLevel::Local) {
            return Err(EvalError::invalid_args(
                rule.name().as_str(),
                "the target must be a local item",
            ));
        }
        if operands.len() < rule.min_operands() {
            return Err(EvalError::invalid_args(
                rule.name().as_str(),
                format!(
                    "needs at least {} operand(s), got {}",
                    rule.min_operands(),
                    operands.len()
                ),
            ));
        }
        let exact = match &rule {
            Rule::Computed(c) => Some(c.arg_count()),
            Rule::Dynamic(d) => Some(d.arg_count()),
            _ => None,
        };
        if let Some(n) = exact.filter(|n| *n != operands.len()) {
            return Err(EvalError::invalid_args(
                rule.name().as_str(),
                format!("declares {} operand(s), got {}", n, operands.len()),
            ));
        }
        Ok(CrossItemRule {
            operands,
            rule,
            when,
        })
    }

    /// Unit rule on a single local item.
    pub fn on_item(item: PageItem, rule: Rule, when: Trigger) -> Result<CrossItemRule, EvalError> {
        CrossItemRule::new(vec![(item, ScopeLevel::Local)], rule, when)
    }

    pub fn operands(&self) -> &[(PageItem, ScopeLevel)] {
        &self.operands
    }

    pub fn target(&self) -> &PageItem {
        // non-empty, checked in `new`
        &self.operands[self.operands.len() - 1].0
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn name(&self) -> RuleName {
        self.rule.name()
    }

    pub fn precedence(&self) -> u32 {
        self.rule.precedence()
    }

    pub fn when(&self) -> Trigger {
        self.when
    }
}

/// Order rules for execution.
///
/// Rules sharing a target run together, highest precedence first, ties in
/// declaration order. A target runs after every target whose local value
/// it reads; otherwise targets keep the order of their first declared
/// rule. Targets reading each other in a cycle fall back to that order.
pub fn rule_sequence(rules: Vec<CrossItemRule>) -> Vec<CrossItemRule> {
    let mut targets: BTreeMap<String, usize> = BTreeMap::new();
    let groups: Vec<usize> = rules
        .iter()
        .map(|rule| {
            let next = targets.len();
            *targets
                .entry(rule.target().variable().to_string())
                .or_insert(next)
        })
        .collect();

    let mut readers: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); targets.len()];
    for (rule, &group) in rules.iter().zip(&groups) {
        let sources = &rule.operands()[..rule.operands().len() - 1];
        for (item, level) in sources {
            if *level != ScopeLevel::Local {
                continue;
            }
            if let Some(&source) = targets.get(item.variable()) {
                if source != group {
                    readers[source].insert(group);
                }
            }
        }
    }
    let rank = dependency_order(&readers);

    let mut keyed: Vec<((usize, Reverse<u32>, usize), CrossItemRule)> = rules
        .into_iter()
        .zip(groups)
        .enumerate()
        .map(|(index, (rule, group))| ((rank[group], Reverse(rule.precedence()), index), rule))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, rule)| rule).collect()
}

/// Position of each group in a topological order of `readers`, picking
/// the earliest declared group whenever several are ready. When every
/// remaining group waits on another, the earliest declared group of one
/// of the cycles is released.
fn dependency_order(readers: &[BTreeSet<usize>]) -> Vec<usize> {
    let count = readers.len();
    let mut sources: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    for (source, group_readers) in readers.iter().enumerate() {
        for reader in group_readers {
            sources[*reader].insert(source);
        }
    }
    let mut pending: Vec<usize> = sources.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..count).filter(|g| pending[*g] == 0).collect();
    let mut placed = vec![false; count];
    let mut rank = vec![0usize; count];
    for position in 0..count {
        let next = match ready.pop_first() {
            Some(group) => group,
            None => match (0..count).find(|g| !placed[*g]) {
                Some(group) => on_cycle(group, &sources, &placed),
                None => break,
            },
        };
        placed[next] = true;
        rank[next] = position;
        for reader in &readers[next] {
            if placed[*reader] {
                continue;
            }
            pending[*reader] -= 1;
            if pending[*reader] == 0 {
                ready.insert(*reader);
            }
        }
    }
    rank
}

/// Follow unplaced sources back from `start` until a group repeats, and
/// return the earliest declared group of the cycle found.
fn on_cycle(start: usize, sources: &[BTreeSet<usize>], placed: &[bool]) -> usize {
    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(at) = path.iter().position(|g| *g == current) {
            return path[at..].iter().copied().min().unwrap_or(current);
        }
        path.push(current);
        match sources[current].iter().find(|g| !placed[**g]) {
            Some(source) => current = *source,
            None => return current,
        }
    }
}
