//! Survey model built from a survey document.

use std::collections::BTreeMap;
use std::sync::Arc;

use enquete_core::ComputedParser;
use enquete_interchange::{
    from_survey_json, ItemDecl, LabelDecl, RuleArgs, SurveyDocument, SurveyOptions, Trigger,
};
use tracing::debug;

use super::item_type::ItemType;
use super::mlstring::Mlstring;
use super::page::{ItemDefinition, Page, PageItem, PageSet};
use super::EvalError;
use crate::crossrule::{rule_sequence, CrossItemRule};
use crate::rules::{DynamicRule, Rule, Rules};
use crate::scope::ScopeLevel;

/// Names and types of the global pseudo-items.
const GLOBALS: [(&str, GlobalType); 6] = [
    ("@INDATE", GlobalType::Date),
    ("@SAMPLE", GlobalType::Text),
    ("@TODAY", GlobalType::Date),
    ("@THISYEAR", GlobalType::Integer),
    ("@ACK", GlobalType::Acknowledge),
    ("@UNDEF", GlobalType::Text),
];

#[derive(Clone, Copy)]
enum GlobalType {
    Date,
    Text,
    Integer,
    Acknowledge,
}

impl GlobalType {
    fn item_type(self) -> ItemType {
        match self {
            GlobalType::Date => ItemType::Date { incomplete: false },
            GlobalType::Text => ItemType::Text,
            GlobalType::Integer => ItemType::Integer,
            GlobalType::Acknowledge => ItemType::Acknowledge,
        }
    }
}

/// A survey ready for evaluation: page items, page sets and the
/// sequenced rules.
#[derive(Debug, Clone)]
pub struct Survey {
    pub name: String,
    pub options: SurveyOptions,
    pages: Vec<Arc<Page>>,
    page_sets: Vec<Arc<PageSet>>,
    items: BTreeMap<String, PageItem>,
    globals: BTreeMap<String, PageItem>,
    rules: Vec<CrossItemRule>,
}

impl Survey {
    pub fn from_json(doc: &serde_json::Value) -> Result<Survey, EvalError> {
        Survey::from_document(&from_survey_json(doc)?)
    }

    pub fn from_document(doc: &SurveyDocument) -> Result<Survey, EvalError> {
        let default_lang = doc.options.default_lang.as_str();

        // a variable declared on several pages shares one page item
        let mut items: BTreeMap<String, PageItem> = BTreeMap::new();
        let mut item_decls: Vec<&ItemDecl> = Vec::new();
        let mut pages: Vec<Arc<Page>> = Vec::with_capacity(doc.pages.len());
        for page in &doc.pages {
            let mut page_items = Vec::with_capacity(page.items.len());
            for decl in &page.items {
                let item = items
                    .entry(decl.variable.clone())
                    .or_insert_with(|| {
                        item_decls.push(decl);
                        PageItem::new(definition(decl, default_lang))
                    })
                    .clone();
                page_items.push(item);
            }
            pages.push(Arc::new(Page {
                id: page.id.clone(),
                name: Mlstring::from_decl(&page.name, default_lang),
                items: page_items,
            }));
        }

        let page_sets = doc
            .page_sets
            .iter()
            .map(|decl| -> Result<Arc<PageSet>, EvalError> {
                let set_pages = decl
                    .pages
                    .iter()
                    .map(|id| {
                        pages
                            .iter()
                            .find(|p| &p.id == id)
                            .cloned()
                            .ok_or_else(|| EvalError::UnknownPage(id.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(PageSet {
                    type_name: decl.type_name.clone(),
                    label: Mlstring::from_decl(&decl.label, default_lang),
                    pages: set_pages,
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let globals = GLOBALS
            .iter()
            .map(|(name, kind)| {
                let item = PageItem::new(ItemDefinition {
                    variable: name.to_string(),
                    wording: Mlstring::from_decl(&LabelDecl::Plain(name.to_string()), default_lang),
                    item_type: kind.item_type(),
                    array: false,
                    section: None,
                });
                (name.to_string(), item)
            })
            .collect();

        let mut survey = Survey {
            name: doc.name.clone(),
            options: doc.options.clone(),
            pages,
            page_sets,
            items,
            globals,
            rules: Vec::new(),
        };
        let rules = survey.declared_rules(doc, &item_decls)?;
        survey.rules = rule_sequence(rules);
        debug!(survey = %survey.name, rules = survey.rules.len(), "survey built");
        Ok(survey)
    }

    /// Item rules in page order, then cross, computed and dynamic rules.
    fn declared_rules(
        &self,
        doc: &SurveyDocument,
        item_decls: &[&ItemDecl],
    ) -> Result<Vec<CrossItemRule>, EvalError> {
        let mut rules = Vec::new();
        for decl in item_decls {
            let item = self.local_item(&decl.variable)?;
            if let Some(default) = &decl.default {
                let rule = Rules::create(&RuleArgs::Constant {
                    value: default.clone(),
                })?;
                rules.push(CrossItemRule::on_item(item.clone(), rule, Trigger::Initialization)?);
            }
            for args in &decl.rules {
                if !args.name().is_unit() {
                    return Err(EvalError::invalid_args(
                        args.name().as_str(),
                        format!("'{}' declares a multi-item rule on a single item", decl.variable),
                    ));
                }
                rules.push(CrossItemRule::on_item(item.clone(), Rules::create(args)?, Trigger::Always)?);
            }
        }

        for decl in &doc.cross_rules {
            let operands = self.resolve_all(&decl.variables)?;
            rules.push(CrossItemRule::new(operands, Rules::create(&decl.rule)?, decl.when)?);
        }

        for decl in &doc.computed {
            let parsed = ComputedParser::parse(&decl.target, &decl.formula)?;
            let operands = self.resolve_all(&parsed.variable_names)?;
            let rule = Rules::create(&RuleArgs::Computed {
                formula: parsed.formula.clone(),
                arg_count: parsed.arg_count(),
            })?;
            rules.push(CrossItemRule::new(operands, rule, decl.when)?);
        }

        for decl in &doc.dynamic {
            let parsed = ComputedParser::parse(&decl.target, &decl.formula)?;
            let operands = self.resolve_all(&parsed.variable_names)?;
            let rule = Rule::Dynamic(DynamicRule::new(
                decl.underlying,
                &parsed.formula,
                parsed.arg_count(),
                decl.extra_args.clone(),
            )?);
            rules.push(CrossItemRule::new(operands, rule, decl.when)?);
        }
        Ok(rules)
    }

    /// Page item and scope level of a variable reference: `$X` reads the
    /// previous interview, `@X` a global item, a bare name the current
    /// interview.
    pub fn resolve(&self, name: &str) -> Result<(PageItem, ScopeLevel), EvalError> {
        let (level, bare) = ScopeLevel::of(name);
        let found = match level {
            ScopeLevel::Global => self.globals.get(bare),
            ScopeLevel::Outer | ScopeLevel::Local => self.items.get(bare),
        };
        found
            .map(|item| (item.clone(), level))
            .ok_or_else(|| EvalError::UnknownVariable {
                name: name.to_string(),
            })
    }

    fn resolve_all(&self, names: &[String]) -> Result<Vec<(PageItem, ScopeLevel)>, EvalError> {
        names.iter().map(|n| self.resolve(n)).collect()
    }

    fn local_item(&self, variable: &str) -> Result<&PageItem, EvalError> {
        self.items.get(variable).ok_or_else(|| EvalError::UnknownVariable {
            name: variable.to_string(),
        })
    }

    /// Prototype of a page item.
    pub fn item(&self, variable: &str) -> Option<&PageItem> {
        self.items.get(variable)
    }

    /// Global pseudo-item, `@` included in the name.
    pub fn global(&self, name: &str) -> Option<&PageItem> {
        self.globals.get(name)
    }

    pub fn items(&self) -> impl Iterator<Item = &PageItem> {
        self.items.values()
    }

    pub fn pages(&self) -> &[Arc<Page>] {
        &self.pages
    }

    pub fn page(&self, id: &str) -> Result<&Arc<Page>, EvalError> {
        self.pages
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| EvalError::UnknownPage(id.to_string()))
    }

    pub fn page_sets(&self) -> &[Arc<PageSet>] {
        &self.page_sets
    }

    pub fn page_set(&self, type_name: &str) -> Result<&Arc<PageSet>, EvalError> {
        self.page_sets
            .iter()
            .find(|p| p.type_name == type_name)
            .ok_or_else(|| EvalError::UnknownPageSet(type_name.to_string()))
    }

    /// Rules in execution order.
    pub fn rules(&self) -> &[CrossItemRule] {
        &self.rules
    }
}

fn definition(decl: &ItemDecl, default_lang: &str) -> ItemDefinition {
    ItemDefinition {
        variable: decl.variable.clone(),
        wording: Mlstring::from_decl(&decl.wording, default_lang),
        item_type: ItemType::from_decl(&decl.item_type, default_lang),
        array: decl.array,
        section: decl.section.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enquete_interchange::RuleName;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "name": "cohort",
            "pages": [
                {
                    "id": "body",
                    "items": [
                        { "variable": "POIDS", "type": { "name": "real" },
                          "rules": [{ "name": "required" }] },
                        { "variable": "TAILLE", "type": { "name": "real" } },
                        { "variable": "IMC", "type": { "name": "real" },
                          "rules": [{ "name": "decimalPrecision", "precision": 1 }] }
                    ]
                },
                {
                    "id": "summary",
                    "items": [
                        { "variable": "IMC", "type": { "name": "real" } },
                        { "variable": "VISIT", "type": { "name": "date" }, "default": "2020-01-01" }
                    ]
                }
            ],
            "pageSets": [
                { "type": "inclusion", "pages": ["body", "summary"] },
                { "type": "followUp", "pages": ["summary"] }
            ],
            "crossRules": [
                { "variables": ["$POIDS", "POIDS"], "rule": { "name": "copy" }, "when": "initialization" }
            ],
            "computed": [
                { "target": "IMC", "formula": "POIDS / (TAILLE * TAILLE)" }
            ]
        })
    }

    #[test]
    fn pages_share_items_across_declarations() {
        let survey = Survey::from_json(&document()).unwrap();
        let body = survey.page("body").unwrap();
        let summary = survey.page("summary").unwrap();
        assert_eq!(body.items[2], summary.items[0]);
        assert_eq!(survey.page_set("inclusion").unwrap().items().len(), 4);
        assert!(survey.page_set("followUp").unwrap().declares("VISIT"));
        assert!(matches!(
            survey.page_set("closing"),
            Err(EvalError::UnknownPageSet(_))
        ));
    }

    #[test]
    fn rules_are_sequenced_per_target() {
        let survey = Survey::from_json(&document()).unwrap();
        let sequence: Vec<(String, RuleName, Trigger)> = survey
            .rules()
            .iter()
            .map(|r| (r.target().variable().to_string(), r.name(), r.when()))
            .collect();
        assert_eq!(
            sequence,
            vec![
                ("POIDS".to_string(), RuleName::Copy, Trigger::Initialization),
                ("POIDS".to_string(), RuleName::Required, Trigger::Always),
                ("IMC".to_string(), RuleName::Computed, Trigger::Always),
                ("IMC".to_string(), RuleName::DecimalPrecision, Trigger::Always),
                ("VISIT".to_string(), RuleName::Constant, Trigger::Initialization),
            ]
        );
        let copy = &survey.rules()[0];
        assert_eq!(copy.operands()[0].1, ScopeLevel::Outer);
    }

    #[test]
    fn variables_resolve_by_prefix() {
        let survey = Survey::from_json(&document()).unwrap();
        assert_eq!(survey.resolve("IMC").unwrap().1, ScopeLevel::Local);
        assert_eq!(survey.resolve("$IMC").unwrap().1, ScopeLevel::Outer);
        assert_eq!(survey.resolve("@TODAY").unwrap().1, ScopeLevel::Global);
        assert_eq!(
            survey.resolve("@NOPE").unwrap_err(),
            EvalError::UnknownVariable {
                name: "@NOPE".to_string()
            }
        );
    }

    #[test]
    fn unknown_formula_variables_fail_the_build() {
        let mut doc = document();
        doc["computed"] = json!([{ "target": "IMC", "formula": "POIDS / HAUTEUR" }]);
        assert_eq!(
            Survey::from_json(&doc).unwrap_err(),
            EvalError::UnknownVariable {
                name: "HAUTEUR".to_string()
            }
        );
    }

    #[test]
    fn item_rules_must_be_unit_rules() {
        let mut doc = document();
        doc["pages"][0]["items"][1]["rules"] = json!([{ "name": "copy" }]);
        assert!(matches!(
            Survey::from_json(&doc),
            Err(EvalError::InvalidRuleArgs { .. })
        ));
    }

    #[test]
    fn unsafe_formulas_fail_the_build() {
        let mut doc = document();
        doc["computed"] = json!([{ "target": "IMC", "formula": "{ POIDS } + TAILLE" }]);
        assert!(matches!(Survey::from_json(&doc), Err(EvalError::Formula(_))));
    }

    #[test]
    fn deeply_nested_formulas_fail_the_build() {
        let mut doc = document();
        let formula = format!("{}POIDS{}", "(".repeat(50_000), ")".repeat(50_000));
        doc["computed"] = json!([{ "target": "IMC", "formula": formula }]);
        assert!(matches!(Survey::from_json(&doc), Err(EvalError::Formula(_))));
    }

    #[test]
    fn raw_placeholders_fail_the_build() {
        let mut doc = document();
        doc["computed"] = json!([{ "target": "IMC", "formula": "POIDS / ($2 * TAILLE)" }]);
        assert!(matches!(Survey::from_json(&doc), Err(EvalError::Formula(_))));
    }
}
