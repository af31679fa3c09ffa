//! Runtime model of the Enquete engine.
//!
//! These types are DISTINCT from the interchange documents. The engine
//! consumes interchange JSON and converts it into typed values, item
//! types, page items and interviews before any rule runs.

pub mod interview;
pub mod item;
pub mod item_type;
pub mod messages;
pub mod mlstring;
pub mod page;
pub mod survey;
pub mod values;

use enquete_core::FormulaError;
use enquete_interchange::InterchangeError;

pub use interview::{GlobalContext, Interview, InterviewItem, Participant};
pub use item::{ItemPatch, ItemValue};
pub use item_type::{Choice, ItemType};
pub use messages::RuleMessages;
pub use mlstring::Mlstring;
pub use page::{ItemDefinition, ItemKey, Page, PageItem, PageSet};
pub use survey::Survey;
pub use values::{Context, SpecialValue, Value};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors raised by the engine.
///
/// Everything but `TypeError` and `Evaluation` is a configuration error,
/// raised while a survey or rule is built. The two evaluation variants are
/// caught per rule by the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("item '{variable}' instance {instance} is not a prototype")]
    NotAPrototype { variable: String, instance: u32 },

    #[error("item '{variable}' has no instance {instance}")]
    InvalidInstance { variable: String, instance: u32 },

    #[error("invalid arguments for rule '{rule}': {message}")]
    InvalidRuleArgs { rule: String, message: String },

    #[error("unknown page set '{0}'")]
    UnknownPageSet(String),

    #[error("unknown page '{0}'")]
    UnknownPage(String),

    #[error(transparent)]
    Interchange(#[from] InterchangeError),

    #[error("type error: {message}")]
    TypeError { message: String },

    #[error("evaluation error: {message}")]
    Evaluation { message: String },
}

impl EvalError {
    pub(crate) fn invalid_args(rule: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::InvalidRuleArgs {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        EvalError::Evaluation {
            message: message.into(),
        }
    }
}
