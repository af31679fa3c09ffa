//! Item types: coercion of raw answers, storage form and labels.

use std::str::FromStr;

use enquete_interchange::{ChoiceDecl, Multiplicity, TypeDecl};
use rust_decimal::Decimal;

use super::mlstring::Mlstring;
use super::values::{decimal_from_json, is_partial_date, parse_date, Value};

/// A categorical code and its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub code: String,
    pub label: Mlstring,
}

impl Choice {
    fn from_decl(decl: &ChoiceDecl, default_lang: &str) -> Choice {
        Choice {
            code: decl.code.clone(),
            label: Mlstring::from_decl(&decl.label, default_lang),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Text,
    Real,
    Integer,
    /// `incomplete` accepts year-only and year-month answers.
    Date {
        incomplete: bool,
    },
    YesNo,
    Acknowledge,
    Choice {
        multiple: bool,
        choices: Vec<Choice>,
    },
    Scale {
        min: i64,
        max: i64,
        min_label: Mlstring,
        max_label: Mlstring,
    },
    Score {
        scores: Vec<(i64, Mlstring)>,
    },
    Glossary {
        choices: Vec<Choice>,
    },
    /// One sub-type per context; the item's context selects which applies.
    Context(Vec<ItemType>),
}

impl ItemType {
    pub fn from_decl(decl: &TypeDecl, default_lang: &str) -> ItemType {
        let choices = |choices: &[ChoiceDecl]| -> Vec<Choice> {
            choices
                .iter()
                .map(|c| Choice::from_decl(c, default_lang))
                .collect()
        };
        let label = |l: &Option<enquete_interchange::LabelDecl>| {
            l.as_ref()
                .map(|l| Mlstring::from_decl(l, default_lang))
                .unwrap_or_default()
        };
        match decl {
            TypeDecl::Text => ItemType::Text,
            TypeDecl::Real => ItemType::Real,
            TypeDecl::Integer => ItemType::Integer,
            TypeDecl::Date { incomplete } => ItemType::Date {
                incomplete: *incomplete,
            },
            TypeDecl::YesNo => ItemType::YesNo,
            TypeDecl::Acknowledge => ItemType::Acknowledge,
            TypeDecl::Choice {
                multiplicity,
                choices: decls,
            } => ItemType::Choice {
                multiple: *multiplicity == Multiplicity::Many,
                choices: choices(decls),
            },
            TypeDecl::Scale {
                min,
                max,
                min_label,
                max_label,
            } => ItemType::Scale {
                min: *min,
                max: *max,
                min_label: label(min_label),
                max_label: label(max_label),
            },
            TypeDecl::Score { scores } => ItemType::Score {
                scores: scores
                    .iter()
                    .map(|s| (s.score, Mlstring::from_decl(&s.label, default_lang)))
                    .collect(),
            },
            TypeDecl::Glossary { choices: decls } => ItemType::Glossary {
                choices: choices(decls),
            },
            TypeDecl::Context { types } => ItemType::Context(
                types
                    .iter()
                    .map(|t| ItemType::from_decl(t, default_lang))
                    .collect(),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ItemType::Text => "text",
            ItemType::Real => "real",
            ItemType::Integer => "integer",
            ItemType::Date { .. } => "date",
            ItemType::YesNo => "yesNo",
            ItemType::Acknowledge => "acknowledge",
            ItemType::Choice { .. } => "choice",
            ItemType::Scale { .. } => "scale",
            ItemType::Score { .. } => "score",
            ItemType::Glossary { .. } => "glossary",
            ItemType::Context(_) => "context",
        }
    }

    /// Sub-type selected by `context`; out-of-range contexts fall back to
    /// the first sub-type.
    fn resolve(&self, context: u32) -> &ItemType {
        match self {
            ItemType::Context(types) => types
                .get(context as usize)
                .or_else(|| types.first())
                .map(|t| t.resolve(0))
                .unwrap_or(self),
            _ => self,
        }
    }

    /// Coerce a raw answer. Empty strings and `null` are always absent;
    /// anything the type cannot represent is absent too.
    pub fn typed_value(&self, raw: &serde_json::Value, context: u32) -> Option<Value> {
        if raw.is_null() || raw.as_str() == Some("") {
            return None;
        }
        match self.resolve(context) {
            ItemType::Text => match raw {
                serde_json::Value::String(s) => Some(Value::Text(s.clone())),
                serde_json::Value::Number(n) => Some(Value::Text(n.to_string())),
                serde_json::Value::Bool(b) => Some(Value::Text(b.to_string())),
                _ => None,
            },
            ItemType::Real => raw_decimal(raw).map(Value::Number),
            ItemType::Integer | ItemType::Scale { .. } | ItemType::Score { .. } => {
                raw_decimal(raw).filter(|d| d.fract().is_zero()).map(Value::Number)
            }
            ItemType::Date { incomplete } => {
                let s = raw.as_str()?;
                if let Some(d) = parse_date(s) {
                    Some(Value::Date(d))
                } else if *incomplete && is_partial_date(s) {
                    Some(Value::PartialDate(s.to_string()))
                } else {
                    None
                }
            }
            ItemType::YesNo => {
                let d = match raw {
                    serde_json::Value::Bool(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
                    other => raw_decimal(other),
                }?;
                (d == Decimal::ZERO || d == Decimal::ONE).then_some(Value::Number(d))
            }
            ItemType::Acknowledge => match raw {
                serde_json::Value::Bool(true) => Some(Value::Bool(true)),
                serde_json::Value::Number(n) if n.as_i64() == Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            ItemType::Choice { multiple: true, .. } => {
                let codes: Vec<Value> = match raw {
                    serde_json::Value::Array(items) => items.iter().filter_map(raw_code).collect(),
                    scalar => raw_code(scalar).into_iter().collect(),
                };
                (!codes.is_empty()).then_some(Value::List(codes))
            }
            ItemType::Choice { .. } | ItemType::Glossary { .. } => raw_code(raw),
            ItemType::Context(_) => None,
        }
    }

    /// Storage form of a typed value.
    pub fn raw_value(&self, value: &Value, context: u32) -> serde_json::Value {
        match (self.resolve(context), value) {
            (ItemType::Acknowledge, _) => serde_json::Value::Bool(true),
            (ItemType::Choice { multiple: true, .. }, Value::List(_)) => value.to_json(),
            (ItemType::Choice { multiple: true, .. }, single) => {
                serde_json::Value::Array(vec![single.to_json()])
            }
            _ => value.to_json(),
        }
    }

    /// Display label of a typed value.
    pub fn label(
        &self,
        value: &Value,
        lang: &str,
        default_lang: &str,
        context: u32,
    ) -> Option<String> {
        match self.resolve(context) {
            ItemType::YesNo => {
                let yes = value.as_decimal()? == Decimal::ONE;
                let table = if yes {
                    Mlstring::new().with("en", "Yes").with("fr", "Oui")
                } else {
                    Mlstring::new().with("en", "No").with("fr", "Non")
                };
                table.get(lang, default_lang).map(str::to_string)
            }
            ItemType::Acknowledge => Mlstring::new()
                .with("en", "Acknowledged")
                .with("fr", "Pris en compte")
                .get(lang, default_lang)
                .map(str::to_string),
            ItemType::Choice { choices, .. } | ItemType::Glossary { choices } => match value {
                Value::List(codes) => {
                    let labels: Option<Vec<String>> = codes
                        .iter()
                        .map(|c| choice_label(choices, c, lang, default_lang))
                        .collect();
                    labels.map(|l| l.join(", "))
                }
                single => choice_label(choices, single, lang, default_lang),
            },
            ItemType::Scale {
                min,
                max,
                min_label,
                max_label,
            } => {
                let n = value.as_decimal()?;
                let bound = |label: &Mlstring| {
                    label
                        .get(lang, default_lang)
                        .map(|l| format!("{} ({})", n.normalize(), l))
                };
                if n == Decimal::from(*min) && !min_label.is_empty() {
                    bound(min_label)
                } else if n == Decimal::from(*max) && !max_label.is_empty() {
                    bound(max_label)
                } else {
                    Some(n.normalize().to_string())
                }
            }
            ItemType::Score { scores } => {
                let n = value.as_decimal()?;
                scores
                    .iter()
                    .find(|(score, _)| Decimal::from(*score) == n)
                    .and_then(|(_, label)| label.get(lang, default_lang))
                    .map(str::to_string)
            }
            _ => Some(value.to_string()),
        }
    }
}

fn raw_decimal(raw: &serde_json::Value) -> Option<Decimal> {
    match raw {
        serde_json::Value::Number(n) => decimal_from_json(n),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn raw_code(raw: &serde_json::Value) -> Option<Value> {
    match raw {
        serde_json::Value::String(s) if !s.is_empty() => Some(Value::Text(s.clone())),
        serde_json::Value::Number(n) => Some(Value::Text(n.to_string())),
        _ => None,
    }
}

fn choice_label(choices: &[Choice], code: &Value, lang: &str, default_lang: &str) -> Option<String> {
    let code = code.to_string();
    choices
        .iter()
        .find(|c| c.code == code)
        .and_then(|c| c.label.get(lang, default_lang))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    fn sex() -> ItemType {
        ItemType::Choice {
            multiple: false,
            choices: vec![
                Choice {
                    code: "M".to_string(),
                    label: Mlstring::new().with("en", "Male").with("fr", "Homme"),
                },
                Choice {
                    code: "F".to_string(),
                    label: Mlstring::new().with("en", "Female").with("fr", "Femme"),
                },
            ],
        }
    }

    #[test]
    fn empty_inputs_are_absent() {
        for t in [ItemType::Text, ItemType::Real, ItemType::YesNo, sex()] {
            assert_eq!(t.typed_value(&json!(""), 0), None);
            assert_eq!(t.typed_value(&json!(null), 0), None);
        }
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(
            ItemType::Real.typed_value(&json!("1.75"), 0),
            Some(Value::Number(Decimal::new(175, 2)))
        );
        assert_eq!(ItemType::Integer.typed_value(&json!(1.5), 0), None);
        assert_eq!(
            ItemType::Integer.typed_value(&json!(42), 0),
            Some(Value::Number(Decimal::from(42)))
        );
        assert_eq!(ItemType::YesNo.typed_value(&json!(2), 0), None);
    }

    #[test]
    fn incomplete_dates_stay_textual() {
        let partial = ItemType::Date { incomplete: true };
        assert_eq!(
            partial.typed_value(&json!("2019-04"), 0),
            Some(Value::PartialDate("2019-04".to_string()))
        );
        assert_eq!(
            partial.typed_value(&json!("2019-04-02"), 0),
            Some(Value::Date(date!(2019 - 04 - 02)))
        );
        let complete = ItemType::Date { incomplete: false };
        assert_eq!(complete.typed_value(&json!("2019-04"), 0), None);
    }

    #[test]
    fn categorical_labels_follow_language_fallback() {
        let value = sex().typed_value(&json!("F"), 0).unwrap();
        assert_eq!(sex().label(&value, "fr", "en", 0), Some("Femme".to_string()));
        assert_eq!(sex().label(&value, "de", "en", 0), Some("Female".to_string()));
        let yes = ItemType::YesNo.typed_value(&json!(true), 0).unwrap();
        assert_eq!(ItemType::YesNo.label(&yes, "fr", "en", 0), Some("Oui".to_string()));
    }

    #[test]
    fn multiple_choice_is_a_list() {
        let many = ItemType::Choice {
            multiple: true,
            choices: vec![],
        };
        let value = many.typed_value(&json!(["A", "B"]), 0).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::Text("A".into()), Value::Text("B".into())])
        );
        assert_eq!(many.raw_value(&value, 0), json!(["A", "B"]));
    }

    #[test]
    fn context_type_dispatches() {
        let contextual = ItemType::Context(vec![ItemType::YesNo, sex()]);
        assert_eq!(
            contextual.typed_value(&json!(1), 0),
            Some(Value::Number(Decimal::ONE))
        );
        assert_eq!(
            contextual.typed_value(&json!("M"), 1),
            Some(Value::Text("M".to_string()))
        );
        let m = Value::Text("M".to_string());
        assert_eq!(contextual.label(&m, "en", "en", 1), Some("Male".to_string()));
    }

    #[test]
    fn scale_labels_bounds() {
        let pain = ItemType::Scale {
            min: 0,
            max: 10,
            min_label: Mlstring::new().with("en", "none"),
            max_label: Mlstring::new().with("en", "worst"),
        };
        let label = |n: i64| pain.label(&Value::Number(Decimal::from(n)), "en", "en", 0);
        assert_eq!(label(0), Some("0 (none)".to_string()));
        assert_eq!(label(5), Some("5".to_string()));
        assert_eq!(label(10), Some("10 (worst)".to_string()));
    }
}
