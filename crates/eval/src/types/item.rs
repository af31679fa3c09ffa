//! Answer state of one item instance.

use std::borrow::Cow;

use super::messages::RuleMessages;
use super::values::{Context, SpecialValue, Value};

/// Value, unit, special value, messages and context of an item.
///
/// Immutable: changes go through [`ItemValue::apply`], which hands back
/// the same reference when the patch changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemValue {
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub special_value: Option<SpecialValue>,
    pub messages: RuleMessages,
    pub context: Option<Context>,
}

impl ItemValue {
    pub fn new(value: Option<Value>) -> Self {
        ItemValue {
            value,
            ..ItemValue::default()
        }
    }

    pub fn with_special(special_value: SpecialValue) -> Self {
        ItemValue {
            special_value: Some(special_value),
            ..ItemValue::default()
        }
    }

    pub fn is_not_applicable(&self) -> bool {
        self.special_value == Some(SpecialValue::NotApplicable)
    }

    /// Apply `patch`; `Cow::Borrowed(self)` when no field differs.
    pub fn apply(&self, patch: ItemPatch) -> Cow<'_, ItemValue> {
        let value_changed = matches!(&patch.value, Some(v) if *v != self.value);
        let unit_changed = matches!(&patch.unit, Some(u) if *u != self.unit);
        let special_changed = matches!(&patch.special_value, Some(s) if *s != self.special_value);
        let messages_changed = matches!(&patch.messages, Some(m) if *m != self.messages);
        let context_changed = matches!(&patch.context, Some(c) if *c != self.context);

        if !(value_changed || unit_changed || special_changed || messages_changed || context_changed) {
            return Cow::Borrowed(self);
        }

        let mut next = self.clone();
        if let Some(v) = patch.value {
            next.value = v;
        }
        if let Some(u) = patch.unit {
            next.unit = u;
        }
        if let Some(s) = patch.special_value {
            next.special_value = s;
        }
        if let Some(m) = patch.messages {
            next.messages = m;
        }
        if let Some(c) = patch.context {
            next.context = c;
        }
        Cow::Owned(next)
    }

    pub fn with_message(&self, rule: &str, text: impl Into<String>) -> Cow<'_, ItemValue> {
        let text = text.into();
        if self.messages.get(rule) == Some(text.as_str()) {
            return Cow::Borrowed(self);
        }
        self.apply(ItemPatch::new().messages(self.messages.with_message(rule, text)))
    }

    pub fn without_message(&self, rule: &str) -> Cow<'_, ItemValue> {
        if self.messages.get(rule).is_none() {
            return Cow::Borrowed(self);
        }
        self.apply(ItemPatch::new().messages(self.messages.without_message(rule)))
    }
}

/// Partial update of an [`ItemValue`]. `None` leaves a field untouched;
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub value: Option<Option<Value>>,
    pub unit: Option<Option<String>>,
    pub special_value: Option<Option<SpecialValue>>,
    pub messages: Option<RuleMessages>,
    pub context: Option<Option<Context>>,
}

impl ItemPatch {
    pub fn new() -> Self {
        ItemPatch::default()
    }

    pub fn value(mut self, value: Option<Value>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn unit(mut self, unit: Option<String>) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn special_value(mut self, special_value: Option<SpecialValue>) -> Self {
        self.special_value = Some(special_value);
        self
    }

    pub fn messages(mut self, messages: RuleMessages) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn context(mut self, context: Option<Context>) -> Self {
        self.context = Some(context);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn unchanged_patch_borrows() {
        let item = ItemValue::new(Some(Value::Number(Decimal::new(150, 2))));
        // 1.50 and 1.5 are the same number
        let same = item.apply(ItemPatch::new().value(Some(Value::Number(Decimal::new(15, 1)))));
        assert!(matches!(same, Cow::Borrowed(r) if std::ptr::eq(r, &item)));
    }

    #[test]
    fn changed_patch_owns() {
        let item = ItemValue::new(Some(Value::Text("a".into())));
        let next = item.apply(
            ItemPatch::new()
                .value(None)
                .special_value(Some(SpecialValue::NotApplicable)),
        );
        assert!(matches!(next, Cow::Owned(_)));
        assert!(next.is_not_applicable());
        assert_eq!(next.value, None);
    }

    #[test]
    fn message_helpers_are_no_ops_when_settled() {
        let item = ItemValue::default();
        assert!(matches!(item.without_message("required"), Cow::Borrowed(_)));
        let flagged = item.with_message("required", "value is required").into_owned();
        assert!(matches!(
            flagged.with_message("required", "value is required"),
            Cow::Borrowed(_)
        ));
    }
}
