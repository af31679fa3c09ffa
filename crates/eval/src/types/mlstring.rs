//! Translated labels.

use std::collections::BTreeMap;

use enquete_interchange::LabelDecl;

/// A label per language code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mlstring(BTreeMap<String, String>);

impl Mlstring {
    pub fn new() -> Self {
        Mlstring::default()
    }

    pub fn with(mut self, lang: &str, text: &str) -> Self {
        self.0.insert(lang.to_string(), text.to_string());
        self
    }

    /// Language-neutral labels are filed under the default language.
    pub fn from_decl(decl: &LabelDecl, default_lang: &str) -> Mlstring {
        match decl {
            LabelDecl::Plain(text) => Mlstring::new().with(default_lang, text),
            LabelDecl::Translated(map) => Mlstring(map.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Requested language, then the default one, then the first
    /// translation in language-code order.
    pub fn get(&self, lang: &str, default_lang: &str) -> Option<&str> {
        self.0
            .get(lang)
            .or_else(|| self.0.get(default_lang))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_fallback_order() {
        let label = Mlstring::new().with("fr", "Oui").with("en", "Yes").with("de", "Ja");
        assert_eq!(label.get("fr", "en"), Some("Oui"));
        assert_eq!(label.get("es", "en"), Some("Yes"));
        assert_eq!(label.get("es", "it"), Some("Ja"));
        assert_eq!(Mlstring::new().get("en", "en"), None);
    }
}
