//! enquete-interchange: plain-data documents shared by survey producers
//! and the rule engine.
//!
//! Provides typed structs for survey definitions (pages, page sets, items,
//! item types, unit and cross rule declarations) and participant records
//! (interviews and item states), the keyed and positional forms of rule
//! arguments, and the [`from_survey_json`] / [`from_participant_json`]
//! entry points.
//!
//! Answer values stay as `serde_json::Value` here; the engine coerces
//! them through each item's type.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_participant_json, from_survey_json, InterchangeError};
pub use types::*;
