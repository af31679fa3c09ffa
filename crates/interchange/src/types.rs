//! Typed structs for the Enquete plain-data documents.
//!
//! Values that the engine interprets per item type (answers, constants,
//! range bounds, trigger values) stay as `serde_json::Value`; the engine
//! coerces them once it knows the target's type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_instance() -> u32 {
    1
}

// ── Rule declarations ───────────────────────────────────────────────

/// Every rule kind the engine can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleName {
    Required,
    Constant,
    InRange,
    MaxLength,
    FixedLength,
    DecimalPrecision,
    LetterCase,
    Critical,
    Activation,
    Copy,
    Computed,
    Dynamic,
}

impl RuleName {
    pub const ALL: [RuleName; 12] = [
        RuleName::Required,
        RuleName::Constant,
        RuleName::InRange,
        RuleName::MaxLength,
        RuleName::FixedLength,
        RuleName::DecimalPrecision,
        RuleName::LetterCase,
        RuleName::Critical,
        RuleName::Activation,
        RuleName::Copy,
        RuleName::Computed,
        RuleName::Dynamic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleName::Required => "required",
            RuleName::Constant => "constant",
            RuleName::InRange => "inRange",
            RuleName::MaxLength => "maxLength",
            RuleName::FixedLength => "fixedLength",
            RuleName::DecimalPrecision => "decimalPrecision",
            RuleName::LetterCase => "letterCase",
            RuleName::Critical => "critical",
            RuleName::Activation => "activation",
            RuleName::Copy => "copy",
            RuleName::Computed => "computed",
            RuleName::Dynamic => "dynamic",
        }
    }

    pub fn parse(name: &str) -> Option<RuleName> {
        RuleName::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// Unit rules touch only their target; the others read several operands.
    pub fn is_unit(&self) -> bool {
        !matches!(
            self,
            RuleName::Activation | RuleName::Copy | RuleName::Computed | RuleName::Dynamic
        )
    }
}

impl std::fmt::Display for RuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bound inclusivity of a range rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    #[serde(default)]
    pub include_lower: bool,
    #[serde(default)]
    pub include_upper: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterCase {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationBehavior {
    Enable,
    Show,
}

/// When a rule participates in an evaluation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// Every run.
    #[default]
    Always,
    /// Only when an interview is initialized (and on the reset pass).
    Initialization,
}

/// Keyed, JSON-compatible form of any rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuleArgs {
    Required {
        #[serde(default = "default_true")]
        enforced: bool,
    },
    Constant {
        value: serde_json::Value,
    },
    InRange {
        min: serde_json::Value,
        max: serde_json::Value,
        #[serde(default)]
        limits: Limits,
    },
    MaxLength {
        length: u32,
    },
    FixedLength {
        length: u32,
    },
    DecimalPrecision {
        precision: u32,
    },
    LetterCase {
        letter_case: LetterCase,
    },
    Critical {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        values: Vec<serde_json::Value>,
        #[serde(default)]
        unconditional: bool,
    },
    Activation {
        values: Vec<serde_json::Value>,
        behavior: ActivationBehavior,
    },
    Copy,
    Computed {
        formula: String,
        arg_count: usize,
    },
    Dynamic {
        underlying: RuleName,
        formula: String,
        arg_count: usize,
        #[serde(default)]
        extra_args: Vec<serde_json::Value>,
    },
}

impl RuleArgs {
    pub fn name(&self) -> RuleName {
        match self {
            RuleArgs::Required { .. } => RuleName::Required,
            RuleArgs::Constant { .. } => RuleName::Constant,
            RuleArgs::InRange { .. } => RuleName::InRange,
            RuleArgs::MaxLength { .. } => RuleName::MaxLength,
            RuleArgs::FixedLength { .. } => RuleName::FixedLength,
            RuleArgs::DecimalPrecision { .. } => RuleName::DecimalPrecision,
            RuleArgs::LetterCase { .. } => RuleName::LetterCase,
            RuleArgs::Critical { .. } => RuleName::Critical,
            RuleArgs::Activation { .. } => RuleName::Activation,
            RuleArgs::Copy => RuleName::Copy,
            RuleArgs::Computed { .. } => RuleName::Computed,
            RuleArgs::Dynamic { .. } => RuleName::Dynamic,
        }
    }
}

// ── Survey documents ────────────────────────────────────────────────

/// Survey-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyOptions {
    #[serde(default = "SurveyOptions::default_languages")]
    pub languages: Vec<String>,
    /// Fallback language for labels when the requested one is missing.
    #[serde(default = "SurveyOptions::default_lang")]
    pub default_lang: String,
    /// Item whose date stands in for `@INDATE` when an interview has no
    /// recorded last input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_date_var: Option<String>,
}

impl SurveyOptions {
    fn default_languages() -> Vec<String> {
        vec!["en".to_string()]
    }

    fn default_lang() -> String {
        "en".to_string()
    }
}

impl Default for SurveyOptions {
    fn default() -> Self {
        SurveyOptions {
            languages: SurveyOptions::default_languages(),
            default_lang: SurveyOptions::default_lang(),
            interview_date_var: None,
        }
    }
}

/// A label, either language-neutral or translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelDecl {
    Plain(String),
    Translated(BTreeMap<String, String>),
}

impl Default for LabelDecl {
    fn default() -> Self {
        LabelDecl::Translated(BTreeMap::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDecl {
    pub code: String,
    #[serde(default)]
    pub label: LabelDecl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDecl {
    pub score: i64,
    #[serde(default)]
    pub label: LabelDecl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    #[default]
    One,
    Many,
}

/// Item type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TypeDecl {
    Text,
    Real,
    Integer,
    Date {
        #[serde(default)]
        incomplete: bool,
    },
    YesNo,
    Acknowledge,
    Choice {
        #[serde(default)]
        multiplicity: Multiplicity,
        choices: Vec<ChoiceDecl>,
    },
    Scale {
        min: i64,
        max: i64,
        #[serde(default)]
        min_label: Option<LabelDecl>,
        #[serde(default)]
        max_label: Option<LabelDecl>,
    },
    Score {
        scores: Vec<ScoreDecl>,
    },
    Glossary {
        choices: Vec<ChoiceDecl>,
    },
    Context {
        types: Vec<TypeDecl>,
    },
}

/// One question of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDecl {
    pub variable: String,
    #[serde(default)]
    pub wording: LabelDecl,
    #[serde(rename = "type")]
    pub item_type: TypeDecl,
    #[serde(default)]
    pub array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleArgs>,
    /// Initial value, applied once when an interview is initialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDecl {
    pub id: String,
    #[serde(default)]
    pub name: LabelDecl,
    pub items: Vec<ItemDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSetDecl {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub label: LabelDecl,
    pub pages: Vec<String>,
}

/// Explicit multi-item rule. `variables` lists the operands, target last;
/// a `$` prefix reads the previous interview, `@` a global value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRuleDecl {
    pub variables: Vec<String>,
    pub rule: RuleArgs,
    #[serde(default)]
    pub when: Trigger,
}

/// Computed value written as a formula over variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedDecl {
    pub target: String,
    pub formula: String,
    #[serde(default)]
    pub when: Trigger,
}

/// Rule whose parameters are computed by a formula over variable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicDecl {
    pub target: String,
    pub underlying: RuleName,
    pub formula: String,
    #[serde(default)]
    pub extra_args: Vec<serde_json::Value>,
    #[serde(default)]
    pub when: Trigger,
}

/// Complete survey definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDocument {
    pub name: String,
    #[serde(default)]
    pub options: SurveyOptions,
    pub pages: Vec<PageDecl>,
    pub page_sets: Vec<PageSetDecl>,
    #[serde(default)]
    pub cross_rules: Vec<CrossRuleDecl>,
    #[serde(default)]
    pub computed: Vec<ComputedDecl>,
    #[serde(default)]
    pub dynamic: Vec<DynamicDecl>,
}

// ── Participant documents ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialValueName {
    Unknown,
    NotApplicable,
    NotDone,
    Undefined,
}

/// Rule messages as stored: rule name to text, plus the acknowledged names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesDecl {
    #[serde(rename = "__acknowledged", default, skip_serializing_if = "Vec::is_empty")]
    pub acknowledged: Vec<String>,
    #[serde(flatten)]
    pub messages: BTreeMap<String, String>,
}

/// Recorded state of one item instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStateDecl {
    pub variable: String,
    #[serde(default = "default_instance")]
    pub instance: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_value: Option<SpecialValueName>,
    #[serde(default, skip_serializing_if = "is_empty_messages")]
    pub messages: MessagesDecl,
    /// Either a context number or a `[context, memento]` pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

fn is_empty_messages(m: &MessagesDecl) -> bool {
    m.messages.is_empty() && m.acknowledged.is_empty()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewDecl {
    pub page_set: String,
    /// ISO date of the last input in this interview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_input: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemStateDecl>,
}

/// A participant and their interviews in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDocument {
    pub participant_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_code: Option<String>,
    #[serde(default)]
    pub interviews: Vec<InterviewDecl>,
}
