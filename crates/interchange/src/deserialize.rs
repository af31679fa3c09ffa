//! Deserialization of survey and participant documents.
//!
//! Entry points are [`from_survey_json`] and [`from_participant_json`].
//! Both decode with serde and then check the structural invariants serde
//! cannot express (unique identifiers, resolvable page references).
//! Variable references inside rules are resolved later by the engine,
//! which knows about scope prefixes and global items.

use crate::types::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Errors during document deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// The document is missing a required top-level field.
    MissingField { field: String },
    /// The document does not match the expected shape.
    InvalidDocument(String),
    /// Two declarations share an identifier.
    Duplicate { kind: String, id: String },
    /// A declaration references something that does not exist.
    UnknownReference { kind: String, id: String },
    /// Rule arguments do not fit the rule.
    InvalidRule { name: String, message: String },
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MissingField { field } => {
                write!(f, "document missing required field: '{}'", field)
            }
            InterchangeError::InvalidDocument(msg) => write!(f, "invalid document: {}", msg),
            InterchangeError::Duplicate { kind, id } => {
                write!(f, "duplicate {} '{}'", kind, id)
            }
            InterchangeError::UnknownReference { kind, id } => {
                write!(f, "unknown {} '{}'", kind, id)
            }
            InterchangeError::InvalidRule { name, message } => {
                write!(f, "rule '{}': {}", name, message)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Deserialize a survey definition.
pub fn from_survey_json(doc: &Value) -> Result<SurveyDocument, InterchangeError> {
    for field in ["name", "pages", "pageSets"] {
        require(doc, field)?;
    }
    let survey: SurveyDocument = serde_json::from_value(doc.clone())
        .map_err(|e| InterchangeError::InvalidDocument(e.to_string()))?;

    let mut page_ids = BTreeSet::new();
    let mut variables = BTreeSet::new();
    for page in &survey.pages {
        if !page_ids.insert(page.id.as_str()) {
            return Err(duplicate("page", &page.id));
        }
        for item in &page.items {
            // the same variable may appear on several pages, but not twice on one
            if page
                .items
                .iter()
                .filter(|other| other.variable == item.variable)
                .count()
                > 1
            {
                return Err(duplicate("variable", &item.variable));
            }
            variables.insert(item.variable.as_str());
        }
    }

    let mut page_set_types = BTreeSet::new();
    for page_set in &survey.page_sets {
        if !page_set_types.insert(page_set.type_name.as_str()) {
            return Err(duplicate("page set", &page_set.type_name));
        }
        for page in &page_set.pages {
            if !page_ids.contains(page.as_str()) {
                return Err(InterchangeError::UnknownReference {
                    kind: "page".to_string(),
                    id: page.clone(),
                });
            }
        }
    }

    for decl in &survey.computed {
        if !variables.contains(decl.target.as_str()) {
            return Err(unknown_variable(&decl.target));
        }
    }
    for decl in &survey.dynamic {
        if !variables.contains(decl.target.as_str()) {
            return Err(unknown_variable(&decl.target));
        }
    }
    for decl in &survey.cross_rules {
        if decl.variables.is_empty() {
            return Err(InterchangeError::InvalidRule {
                name: decl.rule.name().to_string(),
                message: "cross rule declares no variables".to_string(),
            });
        }
    }

    Ok(survey)
}

/// Deserialize a participant and their recorded interviews.
pub fn from_participant_json(doc: &Value) -> Result<ParticipantDocument, InterchangeError> {
    require(doc, "participantCode")?;
    let participant: ParticipantDocument = serde_json::from_value(doc.clone())
        .map_err(|e| InterchangeError::InvalidDocument(e.to_string()))?;

    for interview in &participant.interviews {
        let mut seen = BTreeSet::new();
        for item in &interview.items {
            if item.instance == 0 {
                return Err(InterchangeError::InvalidDocument(format!(
                    "item '{}' has instance 0",
                    item.variable
                )));
            }
            if !seen.insert((item.variable.as_str(), item.instance)) {
                return Err(duplicate(
                    "item state",
                    &format!("{}#{}", item.variable, item.instance),
                ));
            }
        }
    }

    Ok(participant)
}

// ── Positional rule arguments ───────────────────────────────────────

impl RuleArgs {
    /// Build keyed arguments from a rule name and its positional arguments.
    ///
    /// Orders: `required [enforced?]`, `constant [value]`,
    /// `inRange [min, max, limits?]`, `maxLength [n]`, `fixedLength [n]`,
    /// `decimalPrecision [n]`, `letterCase [case]`,
    /// `critical [event, message?, ...values]` (a leading `true` value
    /// means unconditional), `activation [values, behavior]`, `copy []`,
    /// `computed [formula, argCount]`,
    /// `dynamic [underlying, formula, argCount, ...extraArgs]`.
    pub fn from_positional(name: RuleName, args: &[Value]) -> Result<RuleArgs, InterchangeError> {
        let invalid = |message: &str| InterchangeError::InvalidRule {
            name: name.to_string(),
            message: message.to_string(),
        };
        let arg = |i: usize| args.get(i).ok_or_else(|| invalid(&format!("missing argument {}", i + 1)));
        let count = |i: usize| -> Result<u32, InterchangeError> {
            arg(i)?
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(&format!("argument {} must be a non-negative integer", i + 1)))
        };
        let text = |i: usize| -> Result<String, InterchangeError> {
            arg(i)?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(&format!("argument {} must be a string", i + 1)))
        };

        let rule = match name {
            RuleName::Required => RuleArgs::Required {
                enforced: match args.first() {
                    None => true,
                    Some(v) => v.as_bool().ok_or_else(|| invalid("enforced must be a boolean"))?,
                },
            },
            RuleName::Constant => RuleArgs::Constant {
                value: arg(0)?.clone(),
            },
            RuleName::InRange => RuleArgs::InRange {
                min: arg(0)?.clone(),
                max: arg(1)?.clone(),
                limits: match args.get(2) {
                    None | Some(Value::Null) => Limits::default(),
                    Some(v) => decode(name, v, "limits")?,
                },
            },
            RuleName::MaxLength => RuleArgs::MaxLength { length: count(0)? },
            RuleName::FixedLength => RuleArgs::FixedLength { length: count(0)? },
            RuleName::DecimalPrecision => RuleArgs::DecimalPrecision {
                precision: count(0)?,
            },
            RuleName::LetterCase => RuleArgs::LetterCase {
                letter_case: decode(name, arg(0)?, "letter case")?,
            },
            RuleName::Critical => {
                let event = text(0)?;
                let message = match args.get(1) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => return Err(invalid("message must be a string")),
                };
                let mut values: Vec<Value> = args.iter().skip(2).cloned().collect();
                let unconditional = values.first() == Some(&Value::Bool(true));
                if unconditional {
                    values.remove(0);
                }
                RuleArgs::Critical {
                    event,
                    message,
                    values,
                    unconditional,
                }
            }
            RuleName::Activation => RuleArgs::Activation {
                values: match arg(0)? {
                    Value::Array(items) => items.clone(),
                    single => vec![single.clone()],
                },
                behavior: decode(name, arg(1)?, "behavior")?,
            },
            RuleName::Copy => RuleArgs::Copy,
            RuleName::Computed => RuleArgs::Computed {
                formula: text(0)?,
                arg_count: count(1)? as usize,
            },
            RuleName::Dynamic => RuleArgs::Dynamic {
                underlying: decode(name, arg(0)?, "underlying rule")?,
                formula: text(1)?,
                arg_count: count(2)? as usize,
                extra_args: args.iter().skip(3).cloned().collect(),
            },
        };
        Ok(rule)
    }

    /// Inverse of [`RuleArgs::from_positional`].
    pub fn to_positional(&self) -> Vec<Value> {
        match self {
            RuleArgs::Required { enforced } => vec![Value::Bool(*enforced)],
            RuleArgs::Constant { value } => vec![value.clone()],
            RuleArgs::InRange { min, max, limits } => vec![
                min.clone(),
                max.clone(),
                serde_json::json!({
                    "includeLower": limits.include_lower,
                    "includeUpper": limits.include_upper,
                }),
            ],
            RuleArgs::MaxLength { length } | RuleArgs::FixedLength { length } => {
                vec![Value::from(*length)]
            }
            RuleArgs::DecimalPrecision { precision } => vec![Value::from(*precision)],
            RuleArgs::LetterCase { letter_case } => vec![Value::from(match letter_case {
                LetterCase::Upper => "upper",
                LetterCase::Lower => "lower",
            })],
            RuleArgs::Critical {
                event,
                message,
                values,
                unconditional,
            } => {
                let mut out = vec![
                    Value::from(event.as_str()),
                    message.as_deref().map(Value::from).unwrap_or(Value::Null),
                ];
                if *unconditional {
                    out.push(Value::Bool(true));
                }
                out.extend(values.iter().cloned());
                out
            }
            RuleArgs::Activation { values, behavior } => vec![
                Value::Array(values.clone()),
                Value::from(match behavior {
                    ActivationBehavior::Enable => "enable",
                    ActivationBehavior::Show => "show",
                }),
            ],
            RuleArgs::Copy => vec![],
            RuleArgs::Computed { formula, arg_count } => {
                vec![Value::from(formula.as_str()), Value::from(*arg_count)]
            }
            RuleArgs::Dynamic {
                underlying,
                formula,
                arg_count,
                extra_args,
            } => {
                let mut out = vec![
                    Value::from(underlying.as_str()),
                    Value::from(formula.as_str()),
                    Value::from(*arg_count),
                ];
                out.extend(extra_args.iter().cloned());
                out
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn require(doc: &Value, field: &str) -> Result<(), InterchangeError> {
    if doc.get(field).is_none() {
        return Err(InterchangeError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(name: RuleName, v: &Value, what: &str) -> Result<T, InterchangeError> {
    serde_json::from_value(v.clone()).map_err(|e| InterchangeError::InvalidRule {
        name: name.to_string(),
        message: format!("{}: {}", what, e),
    })
}

fn duplicate(kind: &str, id: &str) -> InterchangeError {
    InterchangeError::Duplicate {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

fn unknown_variable(id: &str) -> InterchangeError {
    InterchangeError::UnknownReference {
        kind: "variable".to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey_json() -> Value {
        json!({
            "name": "cohort",
            "options": { "languages": ["en", "fr"], "defaultLang": "en" },
            "pages": [
                {
                    "id": "general",
                    "name": { "en": "General", "fr": "Général" },
                    "items": [
                        {
                            "variable": "AGE",
                            "wording": "Age",
                            "type": { "name": "integer" },
                            "rules": [
                                { "name": "required" },
                                { "name": "inRange", "min": 18, "max": 99,
                                  "limits": { "includeLower": true, "includeUpper": true } }
                            ]
                        },
                        {
                            "variable": "SMOKER",
                            "type": { "name": "yesNo" }
                        },
                        {
                            "variable": "PACKS",
                            "type": { "name": "real" },
                            "rules": [{ "name": "decimalPrecision", "precision": 1 }]
                        }
                    ]
                }
            ],
            "pageSets": [{ "type": "inclusion", "pages": ["general"] }],
            "crossRules": [
                {
                    "variables": ["SMOKER", "PACKS"],
                    "rule": { "name": "activation", "values": [1], "behavior": "enable" }
                }
            ],
            "computed": [{ "target": "PACKS", "formula": "SMOKER == 1 ? PACKS : undefined" }]
        })
    }

    #[test]
    fn survey_document_decodes() {
        let survey = from_survey_json(&survey_json()).unwrap();
        assert_eq!(survey.name, "cohort");
        assert_eq!(survey.options.languages, vec!["en", "fr"]);
        assert_eq!(survey.pages[0].items.len(), 3);
        assert_eq!(
            survey.pages[0].items[0].rules[1],
            RuleArgs::InRange {
                min: json!(18),
                max: json!(99),
                limits: Limits {
                    include_lower: true,
                    include_upper: true,
                },
            }
        );
        assert_eq!(survey.cross_rules[0].when, Trigger::Always);
        assert_eq!(survey.cross_rules[0].rule.name(), RuleName::Activation);
    }

    #[test]
    fn missing_page_sets_is_reported() {
        let mut doc = survey_json();
        doc.as_object_mut().unwrap().remove("pageSets");
        let err = from_survey_json(&doc).unwrap_err();
        assert_eq!(
            err,
            InterchangeError::MissingField {
                field: "pageSets".to_string()
            }
        );
    }

    #[test]
    fn page_set_must_reference_known_pages() {
        let mut doc = survey_json();
        doc["pageSets"][0]["pages"] = json!(["general", "followup"]);
        let err = from_survey_json(&doc).unwrap_err();
        assert_eq!(err.to_string(), "unknown page 'followup'");
    }

    #[test]
    fn duplicate_variable_on_a_page_is_rejected() {
        let mut doc = survey_json();
        doc["pages"][0]["items"][1]["variable"] = json!("AGE");
        let err = from_survey_json(&doc).unwrap_err();
        assert_eq!(err.to_string(), "duplicate variable 'AGE'");
    }

    #[test]
    fn computed_target_must_exist() {
        let mut doc = survey_json();
        doc["computed"][0]["target"] = json!("NOPE");
        assert!(from_survey_json(&doc).is_err());
    }

    #[test]
    fn participant_document_defaults() {
        let participant = from_participant_json(&json!({
            "participantCode": "001",
            "sampleCode": "PARIS",
            "interviews": [{
                "pageSet": "inclusion",
                "lastInput": "2024-03-01",
                "items": [
                    { "variable": "AGE", "value": 42 },
                    { "variable": "PACKS", "specialValue": "notApplicable",
                      "messages": { "required": "value is required", "__acknowledged": ["required"] } }
                ]
            }]
        }))
        .unwrap();
        let items = &participant.interviews[0].items;
        assert_eq!(items[0].instance, 1);
        assert_eq!(items[1].special_value, Some(SpecialValueName::NotApplicable));
        assert_eq!(items[1].messages.acknowledged, vec!["required"]);
        assert_eq!(
            items[1].messages.messages.get("required").map(String::as_str),
            Some("value is required")
        );
    }

    #[test]
    fn duplicate_item_state_is_rejected() {
        let err = from_participant_json(&json!({
            "participantCode": "001",
            "interviews": [{
                "pageSet": "inclusion",
                "items": [
                    { "variable": "AGE", "value": 42 },
                    { "variable": "AGE", "instance": 1, "value": 43 }
                ]
            }]
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate item state 'AGE#1'");
    }

    #[test]
    fn positional_critical_with_unconditional_flag() {
        let args = RuleArgs::from_positional(
            RuleName::Critical,
            &[json!("AE"), json!("adverse event"), json!(true)],
        )
        .unwrap();
        assert_eq!(
            args,
            RuleArgs::Critical {
                event: "AE".to_string(),
                message: Some("adverse event".to_string()),
                values: vec![],
                unconditional: true,
            }
        );
    }

    #[test]
    fn positional_forms_invert() {
        let all = vec![
            RuleArgs::Required { enforced: false },
            RuleArgs::Constant { value: json!("X") },
            RuleArgs::InRange {
                min: json!("2020-01-01"),
                max: json!("2020-12-31"),
                limits: Limits {
                    include_lower: true,
                    include_upper: false,
                },
            },
            RuleArgs::MaxLength { length: 10 },
            RuleArgs::FixedLength { length: 5 },
            RuleArgs::DecimalPrecision { precision: 2 },
            RuleArgs::LetterCase {
                letter_case: LetterCase::Upper,
            },
            RuleArgs::Critical {
                event: "SAE".to_string(),
                message: None,
                values: vec![json!(1), json!(2)],
                unconditional: false,
            },
            RuleArgs::Activation {
                values: vec![json!(1)],
                behavior: ActivationBehavior::Show,
            },
            RuleArgs::Copy,
            RuleArgs::Computed {
                formula: "$1 + 1".to_string(),
                arg_count: 2,
            },
            RuleArgs::Dynamic {
                underlying: RuleName::InRange,
                formula: "[$1, $2]".to_string(),
                arg_count: 3,
                extra_args: vec![json!({ "includeLower": true, "includeUpper": true })],
            },
        ];
        for args in all {
            let back = RuleArgs::from_positional(args.name(), &args.to_positional()).unwrap();
            assert_eq!(back, args);
        }
    }

    #[test]
    fn positional_arguments_are_checked() {
        let err = RuleArgs::from_positional(RuleName::MaxLength, &[json!("ten")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule 'maxLength': argument 1 must be a non-negative integer"
        );
        assert!(RuleArgs::from_positional(RuleName::Computed, &[json!("$1")]).is_err());
    }

    #[test]
    fn keyed_rule_arguments_use_camel_case() {
        let args: RuleArgs = serde_json::from_value(json!({
            "name": "dynamic",
            "underlying": "inRange",
            "formula": "[$1, $2]",
            "argCount": 3
        }))
        .unwrap();
        assert_eq!(
            args,
            RuleArgs::Dynamic {
                underlying: RuleName::InRange,
                formula: "[$1, $2]".to_string(),
                arg_count: 3,
                extra_args: vec![],
            }
        );
        let letter: RuleArgs =
            serde_json::from_value(json!({ "name": "letterCase", "letterCase": "lower" })).unwrap();
        assert_eq!(
            letter,
            RuleArgs::LetterCase {
                letter_case: LetterCase::Lower
            }
        );
    }
}
