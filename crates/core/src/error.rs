use serde::{Deserialize, Serialize};
use std::fmt;

/// A formula compilation error.
///
/// `offset` is the character position in `formula` where the lexer or
/// parser gave up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormulaError {
    pub formula: String,
    pub offset: usize,
    pub message: String,
}

impl FormulaError {
    pub fn new(formula: &str, offset: usize, message: impl Into<String>) -> Self {
        FormulaError {
            formula: formula.to_owned(),
            offset,
            message: message.into(),
        }
    }

    pub fn lex(formula: &str, offset: usize, message: impl Into<String>) -> Self {
        FormulaError::new(formula, offset, message)
    }

    pub fn parse(formula: &str, offset: usize, message: impl Into<String>) -> Self {
        FormulaError::new(formula, offset, message)
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at offset {} in formula '{}'",
            self.message, self.offset, self.formula
        )
    }
}

impl std::error::Error for FormulaError {}
