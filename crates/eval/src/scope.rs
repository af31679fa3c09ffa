//! Variable resolution across global, outer and local scopes.
//!
//! A rule operand names a page item and the level to read it from. The
//! local level is the interview under evaluation, outer levels are the
//! participant's earlier interviews (most recent first), and the global
//! level holds the `@` pseudo-items.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use time::Date;

use crate::types::{
    GlobalContext, Interview, InterviewItem, ItemKey, ItemValue, PageItem, Survey, Value,
};

/// Where an operand is read from. Variable prefixes: `@` global, `$`
/// outer, none local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeLevel {
    Global,
    Outer,
    Local,
}

impl ScopeLevel {
    /// Split a variable reference into its level and bare name.
    pub fn of(name: &str) -> (ScopeLevel, &str) {
        if let Some(rest) = name.strip_prefix('$') {
            (ScopeLevel::Outer, rest)
        } else if name.starts_with('@') {
            // global items keep their prefix
            (ScopeLevel::Global, name)
        } else {
            (ScopeLevel::Local, name)
        }
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'s> {
    Item(&'s InterviewItem),
    /// Declared at this level but without a recorded state.
    Missing,
}

/// Items of one scope level and the variables declared there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    declared: BTreeSet<String>,
    items: BTreeMap<ItemKey, InterviewItem>,
}

impl Frame {
    pub fn new(
        declared: impl IntoIterator<Item = String>,
        items: impl IntoIterator<Item = InterviewItem>,
    ) -> Frame {
        let mut frame = Frame {
            declared: declared.into_iter().collect(),
            items: BTreeMap::new(),
        };
        for item in items {
            frame.items.insert(item.key(), item);
        }
        frame
    }

    fn for_interview(interview: &Interview) -> Frame {
        Frame {
            declared: interview
                .page_set()
                .items()
                .iter()
                .map(|i| i.variable().to_string())
                .collect(),
            items: interview.items().clone(),
        }
    }

    fn insert(&mut self, item: InterviewItem) {
        self.declared.insert(item.variable().to_string());
        self.items.insert(item.key(), item);
    }

    fn get(&self, item: &PageItem) -> Option<Resolved<'_>> {
        match self.items.get(&item.key()) {
            Some(found) => Some(Resolved::Item(found)),
            // only a prototype can be declared-but-unanswered; later
            // instances exist only once recorded
            None if item.is_prototype() && self.declared.contains(item.variable()) => {
                Some(Resolved::Missing)
            }
            None => None,
        }
    }
}

/// Everything a rule can read while one interview is evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    global: Frame,
    outer: Vec<Frame>,
    local: Frame,
}

impl Scope {
    /// `outer` frames are ordered most recent first.
    pub fn new(global: Frame, outer: Vec<Frame>, local: Frame) -> Scope {
        Scope {
            global,
            outer,
            local,
        }
    }

    /// Scope of `local`, seeded with the participant's earlier interviews
    /// in chronological order.
    pub fn create(
        survey: &Survey,
        outer: &[Interview],
        local: &Interview,
        global: &GlobalContext,
    ) -> Scope {
        Scope {
            global: global_frame(survey, local, global),
            outer: outer.iter().rev().map(Frame::for_interview).collect(),
            local: Frame::for_interview(local),
        }
    }

    pub fn get(&self, item: &PageItem, level: ScopeLevel) -> Option<Resolved<'_>> {
        match level {
            ScopeLevel::Global => self.global.get(item),
            ScopeLevel::Local => self.local.get(item),
            ScopeLevel::Outer => self.outer.iter().find_map(|frame| frame.get(item)),
        }
    }

    /// This scope with `transients` overriding the local items they share
    /// a page item with. Transients for variables the local interview does
    /// not declare are dropped.
    pub fn with(&self, transients: impl IntoIterator<Item = InterviewItem>) -> Scope {
        let mut next = self.clone();
        for item in transients {
            if next.local.declared.contains(item.variable()) {
                next.local.insert(item);
            } else {
                tracing::debug!(variable = %item.key(), "transient item outside the local scope");
            }
        }
        next
    }

    pub fn local_items(&self) -> &BTreeMap<ItemKey, InterviewItem> {
        &self.local.items
    }

    pub fn into_local_items(self) -> BTreeMap<ItemKey, InterviewItem> {
        self.local.items
    }

    pub(crate) fn replace_local(&mut self, item: InterviewItem) {
        self.local.items.insert(item.key(), item);
    }
}

fn global_frame(survey: &Survey, local: &Interview, global: &GlobalContext) -> Frame {
    let mut frame = Frame::default();
    let mut put = |name: &str, value: Option<Value>| {
        if let Some(item) = survey.global(name) {
            frame.insert(InterviewItem::new(item.clone(), ItemValue::new(value)));
        }
    };
    if let Some(date) = input_date(survey, local, global) {
        put("@INDATE", Some(Value::Date(date)));
    }
    if let Some(sample) = &global.sample_code {
        put("@SAMPLE", Some(Value::Text(sample.clone())));
    }
    put("@TODAY", Some(Value::Date(global.today)));
    put("@THISYEAR", Some(Value::Number(Decimal::from(global.today.year()))));
    put("@ACK", Some(Value::Bool(true)));
    put("@UNDEF", None);
    frame
}

/// Last input of the interview, else of the participant, else the date
/// answered in the survey's interview date item.
fn input_date(survey: &Survey, local: &Interview, global: &GlobalContext) -> Option<Date> {
    local.last_input().or(global.last_input).or_else(|| {
        let variable = survey.options.interview_date_var.as_deref()?;
        local
            .item(&ItemKey::new(variable, 1))?
            .value()
            .value
            .as_ref()?
            .as_date()
    })
}
