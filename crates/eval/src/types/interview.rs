//! Interviews, their items and participants.

use std::collections::BTreeMap;
use std::sync::Arc;

use enquete_interchange::{
    from_participant_json, InterviewDecl, ItemStateDecl, ParticipantDocument, Trigger,
};
use time::{Date, OffsetDateTime};
use tracing::debug;

use super::item::{ItemPatch, ItemValue};
use super::messages::RuleMessages;
use super::page::{ItemKey, PageItem, PageSet};
use super::survey::Survey;
use super::values::{format_date, parse_date, Context, Value};
use super::EvalError;
use crate::execute::execute;
use crate::scope::Scope;

// ──────────────────────────────────────────────
// Global context
// ──────────────────────────────────────────────

/// Process-wide values behind the `@` items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalContext {
    pub today: Date,
    pub sample_code: Option<String>,
    /// Participant-level last input, used when an interview has none.
    pub last_input: Option<Date>,
}

impl GlobalContext {
    pub fn new(today: Date) -> Self {
        GlobalContext {
            today,
            sample_code: None,
            last_input: None,
        }
    }

    /// Context dated from the system clock (UTC).
    pub fn now() -> Self {
        GlobalContext::new(OffsetDateTime::now_utc().date())
    }

    pub fn with_sample_code(mut self, sample_code: impl Into<String>) -> Self {
        self.sample_code = Some(sample_code.into());
        self
    }

    pub fn with_last_input(mut self, last_input: Date) -> Self {
        self.last_input = Some(last_input);
        self
    }
}

// ──────────────────────────────────────────────
// Interview items
// ──────────────────────────────────────────────

/// The state of one page item instance in an interview.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewItem {
    page_item: PageItem,
    value: ItemValue,
}

impl InterviewItem {
    pub fn new(page_item: PageItem, value: ItemValue) -> Self {
        InterviewItem { page_item, value }
    }

    pub fn blank(page_item: PageItem) -> Self {
        InterviewItem::new(page_item, ItemValue::default())
    }

    pub fn page_item(&self) -> &PageItem {
        &self.page_item
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn key(&self) -> ItemKey {
        self.page_item.key()
    }

    pub fn variable(&self) -> &str {
        self.page_item.variable()
    }

    pub fn instance(&self) -> u32 {
        self.page_item.instance()
    }

    fn context_number(&self) -> u32 {
        self.value.context.as_ref().map_or(0, Context::number)
    }

    pub fn with_value(&self, value: ItemValue) -> InterviewItem {
        InterviewItem::new(self.page_item.clone(), value)
    }

    /// Messages still waiting for the respondent.
    pub fn alerts(&self) -> Vec<(&str, &str)> {
        self.value.messages.alerts().collect()
    }

    pub fn acknowledge(&self, rule: &str) -> InterviewItem {
        self.with_value(
            self.value
                .apply(ItemPatch::new().messages(self.value.messages.acknowledge(rule)))
                .into_owned(),
        )
    }

    pub fn reopen(&self, rule: &str) -> InterviewItem {
        self.with_value(
            self.value
                .apply(ItemPatch::new().messages(self.value.messages.reopen(rule)))
                .into_owned(),
        )
    }

    /// Record a raw answer, coerced through the item type. An answer
    /// clears any special value; messages and acknowledgements stay.
    pub fn set_raw(&self, raw: &serde_json::Value) -> InterviewItem {
        let typed = self.page_item.item_type().typed_value(raw, self.context_number());
        self.with_value(
            self.value
                .apply(ItemPatch::new().value(typed).special_value(None))
                .into_owned(),
        )
    }

    /// Display label of the current value.
    pub fn label(&self, lang: &str, default_lang: &str) -> Option<String> {
        let value = self.value.value.as_ref()?;
        self.page_item
            .item_type()
            .label(value, lang, default_lang, self.context_number())
    }

    fn reset_messages(&self) -> InterviewItem {
        self.with_value(
            self.value
                .apply(ItemPatch::new().messages(self.value.messages.reset()))
                .into_owned(),
        )
    }

    fn from_decl(page_set: &PageSet, survey: &Survey, decl: &ItemStateDecl) -> Result<Self, EvalError> {
        let prototype = match survey.item(&decl.variable) {
            Some(item) if page_set.declares(&decl.variable) => item,
            _ => {
                return Err(EvalError::UnknownVariable {
                    name: decl.variable.clone(),
                })
            }
        };
        if decl.instance > 1 && !prototype.is_array() {
            return Err(EvalError::InvalidInstance {
                variable: decl.variable.clone(),
                instance: decl.instance,
            });
        }
        let page_item = prototype.get_instance(decl.instance)?;
        let context = decl.context.as_ref().and_then(Context::from_json);
        let number = context.as_ref().map_or(0, Context::number);
        let value = ItemValue {
            value: decl
                .value
                .as_ref()
                .and_then(|raw| page_item.item_type().typed_value(raw, number)),
            unit: decl.unit.clone(),
            special_value: decl.special_value.map(Into::into),
            messages: RuleMessages::from_decl(&decl.messages),
            context,
        };
        Ok(InterviewItem::new(page_item, value))
    }

    pub fn to_decl(&self) -> ItemStateDecl {
        let number = self.context_number();
        ItemStateDecl {
            variable: self.variable().to_string(),
            instance: self.instance(),
            value: self
                .value
                .value
                .as_ref()
                .map(|v| self.page_item.item_type().raw_value(v, number)),
            unit: self.value.unit.clone(),
            special_value: self.value.special_value.map(Into::into),
            messages: self.value.messages.to_decl(),
            context: self.value.context.as_ref().map(Context::to_json),
        }
    }
}

// ──────────────────────────────────────────────
// Interviews
// ──────────────────────────────────────────────

/// One submission of a page set.
#[derive(Debug, Clone)]
pub struct Interview {
    page_set: Arc<PageSet>,
    items: BTreeMap<ItemKey, InterviewItem>,
    last_input: Option<Date>,
}

impl PartialEq for Interview {
    fn eq(&self, other: &Self) -> bool {
        self.page_set.type_name == other.page_set.type_name
            && self.items == other.items
            && self.last_input == other.last_input
    }
}

impl Interview {
    /// Interview over the recorded `items`, without running any rule.
    pub fn new(page_set: Arc<PageSet>, items: impl IntoIterator<Item = InterviewItem>) -> Self {
        Interview {
            page_set,
            items: items.into_iter().map(|i| (i.key(), i)).collect(),
            last_input: None,
        }
    }

    /// Fresh interview: one blank item per declared prototype, then every
    /// rule, initialization ones included.
    pub fn init(
        survey: &Survey,
        page_set: &str,
        outer: &[Interview],
        global: &GlobalContext,
    ) -> Result<Interview, EvalError> {
        let page_set = Arc::clone(survey.page_set(page_set)?);
        let items = page_set.items().into_iter().map(InterviewItem::blank);
        let blank = Interview::new(page_set, items);
        Ok(blank.run(survey, outer, global, Trigger::Initialization, Vec::new()))
    }

    /// Apply `transients` and rerun the `always` rules.
    pub fn update(
        &self,
        survey: &Survey,
        outer: &[Interview],
        global: &GlobalContext,
        transients: Vec<InterviewItem>,
    ) -> Interview {
        self.run(survey, outer, global, Trigger::Always, transients)
    }

    pub(crate) fn run(
        &self,
        survey: &Survey,
        outer: &[Interview],
        global: &GlobalContext,
        trigger: Trigger,
        transients: Vec<InterviewItem>,
    ) -> Interview {
        debug!(
            page_set = %self.page_set.type_name,
            trigger = ?trigger,
            outer = outer.len(),
            "executing interview rules"
        );
        let scope = Scope::create(survey, outer, self, global).with(transients);
        let items = execute(survey.rules(), scope, trigger).into_local_items();
        Interview {
            page_set: Arc::clone(&self.page_set),
            items,
            last_input: self.last_input,
        }
    }

    /// Record a blank next instance of an array item. Returns the new
    /// interview and the key of the added instance.
    pub fn add_instance(&self, variable: &str) -> Result<(Interview, ItemKey), EvalError> {
        let prototype = self
            .page_set
            .items()
            .into_iter()
            .find(|i| i.variable() == variable)
            .ok_or_else(|| EvalError::UnknownVariable {
                name: variable.to_string(),
            })?;
        if !prototype.is_array() {
            return Err(EvalError::InvalidInstance {
                variable: variable.to_string(),
                instance: 2,
            });
        }
        let next = self
            .items
            .keys()
            .filter(|k| k.variable == variable)
            .map(|k| k.instance)
            .max()
            .unwrap_or(0)
            + 1;
        let instance = prototype.get_instance(next)?;
        let key = instance.key();
        let mut added = self.clone();
        added.items.insert(key.clone(), InterviewItem::blank(instance));
        Ok((added, key))
    }

    pub fn page_set(&self) -> &PageSet {
        &self.page_set
    }

    pub fn items(&self) -> &BTreeMap<ItemKey, InterviewItem> {
        &self.items
    }

    pub fn item(&self, key: &ItemKey) -> Option<&InterviewItem> {
        self.items.get(key)
    }

    pub fn get(&self, variable: &str, instance: u32) -> Option<&InterviewItem> {
        self.items.get(&ItemKey::new(variable, instance))
    }

    pub fn last_input(&self) -> Option<Date> {
        self.last_input
    }

    pub fn with_last_input(mut self, last_input: Date) -> Self {
        self.last_input = Some(last_input);
        self
    }

    fn reset_messages(&self) -> Interview {
        Interview {
            page_set: Arc::clone(&self.page_set),
            items: self
                .items
                .iter()
                .map(|(k, i)| (k.clone(), i.reset_messages()))
                .collect(),
            last_input: self.last_input,
        }
    }

    fn from_decl(survey: &Survey, decl: &InterviewDecl) -> Result<Interview, EvalError> {
        let page_set = Arc::clone(survey.page_set(&decl.page_set)?);
        // at most one instance, the unanswered prototype, may go unrecorded
        let mut recorded: BTreeMap<&str, u32> = BTreeMap::new();
        for state in &decl.items {
            *recorded.entry(state.variable.as_str()).or_insert(0) += 1;
        }
        if let Some(state) = decl
            .items
            .iter()
            .find(|state| {
                let count = recorded.get(state.variable.as_str()).copied().unwrap_or(0);
                state.instance > count + 1
            })
        {
            return Err(EvalError::InvalidInstance {
                variable: state.variable.clone(),
                instance: state.instance,
            });
        }
        let items = decl
            .items
            .iter()
            .map(|state| InterviewItem::from_decl(&page_set, survey, state))
            .collect::<Result<Vec<_>, _>>()?;
        let last_input = match &decl.last_input {
            None => None,
            Some(s) => Some(parse_date(s).ok_or_else(|| EvalError::TypeError {
                message: format!("lastInput '{}' is not a date", s),
            })?),
        };
        let mut interview = Interview::new(page_set, items);
        interview.last_input = last_input;
        Ok(interview)
    }

    pub fn to_decl(&self) -> InterviewDecl {
        InterviewDecl {
            page_set: self.page_set.type_name.clone(),
            last_input: self.last_input.map(format_date),
            items: self.items.values().map(InterviewItem::to_decl).collect(),
        }
    }
}

// ──────────────────────────────────────────────
// Participants
// ──────────────────────────────────────────────

/// A participant and their interviews, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_code: String,
    pub sample_code: Option<String>,
    interviews: Vec<Interview>,
}

impl Participant {
    pub fn new(participant_code: impl Into<String>, sample_code: Option<String>) -> Self {
        Participant {
            participant_code: participant_code.into(),
            sample_code,
            interviews: Vec::new(),
        }
    }

    pub fn interviews(&self) -> &[Interview] {
        &self.interviews
    }

    fn global(&self, global: &GlobalContext) -> GlobalContext {
        GlobalContext {
            sample_code: self.sample_code.clone().or_else(|| global.sample_code.clone()),
            ..global.clone()
        }
    }

    /// Append an initialized interview of `page_set`.
    pub fn add_interview(
        &self,
        survey: &Survey,
        page_set: &str,
        global: &GlobalContext,
    ) -> Result<Participant, EvalError> {
        let interview = Interview::init(survey, page_set, &self.interviews, &self.global(global))?;
        let mut next = self.clone();
        next.interviews.push(interview);
        Ok(next)
    }

    /// Replace interview `index` with `interview`.
    pub fn with_interview(&self, index: usize, interview: Interview) -> Result<Participant, EvalError> {
        if index >= self.interviews.len() {
            return Err(EvalError::evaluation(format!(
                "participant '{}' has no interview {}",
                self.participant_code, index
            )));
        }
        let mut next = self.clone();
        next.interviews[index] = interview;
        Ok(next)
    }

    /// Replay every interview from `start` on, in order. Messages are
    /// cleared first (acknowledgements stay) and each interview sees the
    /// replayed interviews before it as outer scopes.
    pub fn execute(&self, survey: &Survey, start: usize, global: &GlobalContext) -> Participant {
        let global = self.global(global);
        let mut interviews: Vec<Interview> = self.interviews.iter().take(start).cloned().collect();
        for interview in self.interviews.iter().skip(start) {
            debug!(
                participant = %self.participant_code,
                index = interviews.len(),
                "replaying interview"
            );
            let replayed = interview.reset_messages().run(
                survey,
                &interviews,
                &global,
                Trigger::Always,
                Vec::new(),
            );
            interviews.push(replayed);
        }
        Participant {
            participant_code: self.participant_code.clone(),
            sample_code: self.sample_code.clone(),
            interviews,
        }
    }

    pub fn from_document(survey: &Survey, doc: &ParticipantDocument) -> Result<Participant, EvalError> {
        let interviews = doc
            .interviews
            .iter()
            .map(|decl| Interview::from_decl(survey, decl))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Participant {
            participant_code: doc.participant_code.clone(),
            sample_code: doc.sample_code.clone(),
            interviews,
        })
    }

    pub fn from_json(survey: &Survey, doc: &serde_json::Value) -> Result<Participant, EvalError> {
        Participant::from_document(survey, &from_participant_json(doc)?)
    }

    pub fn to_document(&self) -> ParticipantDocument {
        ParticipantDocument {
            participant_code: self.participant_code.clone(),
            sample_code: self.sample_code.clone(),
            interviews: self.interviews.iter().map(Interview::to_decl).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // ParticipantDocument is plain data, serialization cannot fail
        serde_json::to_value(self.to_document()).unwrap_or(serde_json::Value::Null)
    }
}
