//! Enquete rule engine -- accepts a survey document and a participant's
//! recorded interviews, replays every rule, produces the updated item
//! states.
//!
//! The engine consumes interchange JSON, builds page items and sequenced
//! cross-item rules from the survey, then folds the rules over each
//! interview in chronological order with the two-pass reset of
//! [`execute`].

pub mod crossrule;
pub mod execute;
pub mod formula;
pub mod rules;
pub mod scope;
pub mod types;

pub use crossrule::{rule_sequence, CrossItemRule};
pub use rules::{Rule, Rules};
pub use scope::{Resolved, Scope, ScopeLevel};
pub use types::{
    EvalError, GlobalContext, Interview, InterviewItem, ItemValue, Participant, Survey, Value,
};

/// Replay a participant against a survey.
///
/// # Arguments
/// * `survey` - Survey document (serde_json::Value)
/// * `participant` - Participant document with recorded interviews
/// * `global` - Date, sample code and last input behind the `@` items
///
/// # Returns
/// * The participant document with every item state recomputed, or an
///   `EvalError` when either document is invalid
pub fn evaluate(
    survey: &serde_json::Value,
    participant: &serde_json::Value,
    global: &GlobalContext,
) -> Result<serde_json::Value, EvalError> {
    let survey = Survey::from_json(survey)?;
    let participant = Participant::from_json(&survey, participant)?;
    Ok(participant.execute(&survey, 0, global).to_json())
}

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────
