//! Engine behaviour through the survey, interview and participant API.

use std::sync::Arc;

use enquete_eval::types::ItemKey;
use enquete_eval::{
    EvalError, GlobalContext, Interview, Participant, Resolved, Scope, ScopeLevel, Survey, Value,
};
use rust_decimal::Decimal;
use serde_json::json;
use time::macros::date;

fn survey() -> Survey {
    Survey::from_json(&json!({
        "name": "cohort",
        "pages": [
            {
                "id": "identity",
                "items": [
                    { "variable": "AGE", "type": { "name": "integer" },
                      "rules": [{ "name": "required" }] },
                    { "variable": "COUNTRY", "type": { "name": "text" }, "default": "FR" },
                    { "variable": "INCL", "type": { "name": "date" } }
                ]
            },
            {
                "id": "meds",
                "items": [
                    { "variable": "MED", "type": { "name": "text" }, "array": true,
                      "rules": [{ "name": "required" }] }
                ]
            },
            {
                "id": "followup",
                "items": [
                    { "variable": "AGE_COPY", "type": { "name": "integer" } }
                ]
            }
        ],
        "pageSets": [
            { "type": "inclusion", "pages": ["identity", "meds"] },
            { "type": "followUp", "pages": ["followup"] }
        ],
        "crossRules": [
            { "variables": ["$AGE", "AGE_COPY"], "rule": { "name": "copy" } }
        ],
        "computed": [
            { "target": "INCL", "formula": "$(@TODAY)" }
        ],
        "dynamic": [
            { "target": "COUNTRY", "underlying": "maxLength", "formula": "COUNTRY" }
        ]
    }))
    .unwrap()
}

fn global() -> GlobalContext {
    GlobalContext::new(date!(2024 - 03 - 01))
}

fn value(interview: &Interview, variable: &str, instance: u32) -> Option<Value> {
    interview.get(variable, instance).unwrap().value().value.clone()
}

fn message<'i>(interview: &'i Interview, variable: &str, instance: u32, rule: &str) -> Option<&'i str> {
    interview
        .get(variable, instance)
        .unwrap()
        .value()
        .messages
        .get(rule)
}

#[test]
fn init_creates_items_and_runs_every_rule() {
    let survey = survey();
    let interview = Interview::init(&survey, "inclusion", &[], &global()).unwrap();

    let keys: Vec<ItemKey> = interview.items().keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            ItemKey::new("AGE", 1),
            ItemKey::new("COUNTRY", 1),
            ItemKey::new("INCL", 1),
            ItemKey::new("MED", 1),
        ]
    );
    assert_eq!(message(&interview, "AGE", 1, "required"), Some("value is required"));
    assert_eq!(message(&interview, "MED", 1, "required"), Some("value is required"));
    // the default applies even though the dynamic rule on COUNTRY fails
    assert_eq!(value(&interview, "COUNTRY", 1), Some(Value::Text("FR".to_string())));
    assert_eq!(value(&interview, "INCL", 1), Some(Value::Date(date!(2024 - 03 - 01))));
}

#[test]
fn updates_apply_transient_edits() {
    let survey = survey();
    let interview = Interview::init(&survey, "inclusion", &[], &global()).unwrap();
    let age = interview.get("AGE", 1).unwrap().set_raw(&json!(40));
    let updated = interview.update(&survey, &[], &global(), vec![age]);

    assert_eq!(value(&updated, "AGE", 1), Some(Value::Number(Decimal::from(40))));
    assert_eq!(message(&updated, "AGE", 1, "required"), None);
    assert_eq!(value(&updated, "COUNTRY", 1), Some(Value::Text("FR".to_string())));
}

#[test]
fn replay_is_idempotent() {
    let survey = survey();
    let participant = Participant::new("001", None)
        .add_interview(&survey, "inclusion", &global())
        .unwrap()
        .add_interview(&survey, "followUp", &global())
        .unwrap();
    let once = participant.execute(&survey, 0, &global());
    let twice = once.execute(&survey, 0, &global());
    assert_eq!(once, twice);
}

#[test]
fn derived_values_settle_regardless_of_declaration_order() {
    let survey = Survey::from_json(&json!({
        "name": "ordering",
        "pages": [{ "id": "p", "items": [
            { "variable": "C", "type": { "name": "real" },
              "rules": [{ "name": "decimalPrecision", "precision": 1 }] },
            { "variable": "A", "type": { "name": "real" } },
            { "variable": "B", "type": { "name": "real" } }
        ]}],
        "pageSets": [{ "type": "visit", "pages": ["p"] }],
        "crossRules": [{ "variables": ["A", "B"], "rule": { "name": "copy" } }],
        "computed": [{ "target": "C", "formula": "B * 2" }]
    }))
    .unwrap();
    let interview = Interview::init(&survey, "visit", &[], &global()).unwrap();
    let a = interview.get("A", 1).unwrap().set_raw(&json!(5));
    let updated = interview.update(&survey, &[], &global(), vec![a]);
    assert_eq!(value(&updated, "B", 1), Some(Value::Number(Decimal::from(5))));
    assert_eq!(value(&updated, "C", 1), Some(Value::Number(Decimal::from(10))));

    let participant = Participant::new("001", None)
        .add_interview(&survey, "visit", &global())
        .unwrap()
        .with_interview(0, updated)
        .unwrap();
    let once = participant.execute(&survey, 0, &global());
    let twice = once.execute(&survey, 0, &global());
    assert_eq!(
        value(&once.interviews()[0], "C", 1),
        Some(Value::Number(Decimal::from(10)))
    );
    assert_eq!(once, twice);
}

#[test]
fn unanswered_outer_sources_leave_copies_alone() {
    let survey = survey();
    let participant = Participant::from_json(
        &survey,
        &json!({
            "participantCode": "001",
            "interviews": [
                { "pageSet": "inclusion", "items": [] },
                { "pageSet": "followUp", "items": [{ "variable": "AGE_COPY", "value": 30 }] }
            ]
        }),
    )
    .unwrap();
    let replayed = participant.execute(&survey, 0, &global());
    assert_eq!(
        value(&replayed.interviews()[1], "AGE_COPY", 1),
        Some(Value::Number(Decimal::from(30)))
    );
}

#[test]
fn implausible_instance_numbers_are_rejected() {
    let survey = survey();
    let doc = |instance: u32| {
        json!({
            "participantCode": "001",
            "interviews": [{ "pageSet": "inclusion", "items": [
                { "variable": "MED", "value": "aspirin" },
                { "variable": "MED", "instance": instance, "value": "ibuprofen" }
            ]}]
        })
    };
    assert!(Participant::from_json(&survey, &doc(2)).is_ok());
    assert!(Participant::from_json(&survey, &doc(3)).is_ok());
    assert_eq!(
        Participant::from_json(&survey, &doc(300_000)),
        Err(EvalError::InvalidInstance {
            variable: "MED".to_string(),
            instance: 300_000,
        })
    );
}

#[test]
fn memoized_values_survive_replays() {
    let survey = survey();
    let participant = Participant::new("001", None)
        .add_interview(&survey, "inclusion", &global())
        .unwrap();
    let later = GlobalContext::new(date!(2025 - 01 - 15));
    let replayed = participant.execute(&survey, 0, &later);
    assert_eq!(
        value(&replayed.interviews()[0], "INCL", 1),
        Some(Value::Date(date!(2024 - 03 - 01)))
    );
}

#[test]
fn outer_scope_reads_the_previous_interview() {
    let survey = survey();
    let participant = Participant::new("001", None)
        .add_interview(&survey, "inclusion", &global())
        .unwrap();
    let inclusion = &participant.interviews()[0];
    let age = inclusion.get("AGE", 1).unwrap().set_raw(&json!(40));
    let edited = inclusion.update(&survey, &[], &global(), vec![age]);
    let participant = participant
        .with_interview(0, edited)
        .unwrap()
        .add_interview(&survey, "followUp", &global())
        .unwrap();

    assert_eq!(
        value(&participant.interviews()[1], "AGE_COPY", 1),
        Some(Value::Number(Decimal::from(40)))
    );
}

#[test]
fn array_instances_are_added_lazily() {
    let survey = survey();
    let interview = Interview::init(&survey, "inclusion", &[], &global()).unwrap();
    let (with_two, key) = interview.add_instance("MED").unwrap();
    assert_eq!(key, ItemKey::new("MED", 2));

    let second = with_two.get("MED", 2).unwrap().page_item().clone();
    assert!(!second.has_next_instance());

    let updated = with_two.update(&survey, &[], &global(), vec![]);
    assert_eq!(message(&updated, "MED", 2, "required"), Some("value is required"));
    assert!(updated.get("MED", 3).is_none());

    assert!(interview.add_instance("AGE").is_err());
    assert!(interview.add_instance("NOPE").is_err());
}

#[test]
fn scope_distinguishes_missing_from_absent() {
    let survey = survey();
    let page_set = Arc::clone(survey.page_set("inclusion").unwrap());
    let interview = Interview::new(page_set, vec![]);
    let scope = Scope::create(&survey, &[], &interview, &global());

    let age = survey.item("AGE").unwrap();
    let age_copy = survey.item("AGE_COPY").unwrap();
    assert_eq!(scope.get(age, ScopeLevel::Local), Some(Resolved::Missing));
    assert_eq!(scope.get(age_copy, ScopeLevel::Local), None);
    assert_eq!(scope.get(age, ScopeLevel::Outer), None);

    // no sample code, no input date: those globals are absent
    assert_eq!(scope.get(survey.global("@SAMPLE").unwrap(), ScopeLevel::Global), None);
    assert_eq!(scope.get(survey.global("@INDATE").unwrap(), ScopeLevel::Global), None);
    assert!(matches!(
        scope.get(survey.global("@THISYEAR").unwrap(), ScopeLevel::Global),
        Some(Resolved::Item(item)) if item.value().value == Some(Value::Number(Decimal::from(2024)))
    ));
}

#[test]
fn participant_documents_round_trip() {
    let survey = survey();
    let participant = Participant::new("001", Some("S1".to_string()))
        .add_interview(&survey, "inclusion", &global())
        .unwrap();
    let json = participant.to_json();
    assert_eq!(json["sampleCode"], "S1");
    let reloaded = Participant::from_json(&survey, &json).unwrap();
    assert_eq!(reloaded, participant);
}
