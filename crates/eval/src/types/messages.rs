//! Rule messages attached to an item.

use std::collections::BTreeMap;

use enquete_interchange::MessagesDecl;

/// Messages keyed by the rule that raised them, plus the rule names the
/// respondent acknowledged. An acknowledged message stays recorded but is
/// no longer an alert.
///
/// Equality compares both the texts and the acknowledgements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMessages {
    messages: BTreeMap<String, String>,
    acknowledged: Vec<String>,
}

impl RuleMessages {
    pub fn new() -> Self {
        RuleMessages::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.acknowledged.is_empty()
    }

    pub fn get(&self, rule: &str) -> Option<&str> {
        self.messages.get(rule).map(String::as_str)
    }

    pub fn messages(&self) -> &BTreeMap<String, String> {
        &self.messages
    }

    pub fn acknowledged(&self) -> &[String] {
        &self.acknowledged
    }

    pub fn is_acknowledged(&self, rule: &str) -> bool {
        self.acknowledged.iter().any(|a| a == rule)
    }

    /// Messages that are not acknowledged.
    pub fn alerts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages
            .iter()
            .filter(|(rule, _)| !self.is_acknowledged(rule))
            .map(|(rule, text)| (rule.as_str(), text.as_str()))
    }

    pub fn with_message(&self, rule: &str, text: impl Into<String>) -> RuleMessages {
        let mut next = self.clone();
        next.messages.insert(rule.to_string(), text.into());
        next
    }

    pub fn without_message(&self, rule: &str) -> RuleMessages {
        let mut next = self.clone();
        next.messages.remove(rule);
        next
    }

    pub fn acknowledge(&self, rule: &str) -> RuleMessages {
        let mut next = self.clone();
        if !next.is_acknowledged(rule) {
            next.acknowledged.push(rule.to_string());
        }
        next
    }

    pub fn reopen(&self, rule: &str) -> RuleMessages {
        let mut next = self.clone();
        next.acknowledged.retain(|a| a != rule);
        next
    }

    /// Drop every message, keep the acknowledgements.
    pub fn reset(&self) -> RuleMessages {
        RuleMessages {
            messages: BTreeMap::new(),
            acknowledged: self.acknowledged.clone(),
        }
    }

    pub fn from_decl(decl: &MessagesDecl) -> RuleMessages {
        RuleMessages {
            messages: decl.messages.clone(),
            acknowledged: decl.acknowledged.clone(),
        }
    }

    pub fn to_decl(&self) -> MessagesDecl {
        MessagesDecl {
            acknowledged: self.acknowledged.clone(),
            messages: self.messages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledged_messages_are_not_alerts() {
        let messages = RuleMessages::new()
            .with_message("required", "value is required")
            .with_message("critical", "AE")
            .acknowledge("critical");
        let alerts: Vec<_> = messages.alerts().collect();
        assert_eq!(alerts, vec![("required", "value is required")]);
        assert_eq!(messages.get("critical"), Some("AE"));
    }

    #[test]
    fn reset_keeps_acknowledgements() {
        let messages = RuleMessages::new()
            .with_message("inRange", "value must be in range [1, 4]")
            .acknowledge("inRange")
            .reset();
        assert!(messages.messages().is_empty());
        assert_eq!(messages.acknowledged(), ["inRange".to_string()]);
        assert_eq!(messages.reopen("inRange"), RuleMessages::new());
    }

    #[test]
    fn acknowledging_twice_records_once() {
        let messages = RuleMessages::new().acknowledge("required").acknowledge("required");
        assert_eq!(messages.acknowledged().len(), 1);
    }

    #[test]
    fn equality_includes_texts() {
        let a = RuleMessages::new().with_message("required", "a");
        let b = RuleMessages::new().with_message("required", "b");
        assert_ne!(a, b);
    }
}
