//! Localizable display text for manifest fields.
//!
//! Manifest fields like `vendor` and `description` accept either a plain
//! string or a per-locale object with a `_` default key:
//!
//! ```json
//! {
//!   "description": { "_": "A voice library", "zh_CN": "一个声库" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Locale keys consulted, in order, when neither the requested locale nor
/// the `_` default is present.
const FALLBACK_LOCALES: [&str; 5] = ["en", "en_US", "en_us", "en_GB", "en_gb"];

/// A manifest text field: one string, or one string per locale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LocalizedText {
    /// A single untranslated string.
    Plain(String),
    /// Per-locale strings; `_` is the default.
    ByLocale(BTreeMap<String, String>),
}

impl LocalizedText {
    /// The default text: the plain string, the `_` entry, or the first
    /// recognized English fallback. Empty when nothing matches.
    pub fn text(&self) -> &str {
        self.text_for(None)
    }

    /// The text for a locale, falling back to `_` and then the recognized
    /// English locale keys.
    pub fn text_for(&self, locale: Option<&str>) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::ByLocale(map) => {
                if let Some(locale) = locale {
                    if let Some(s) = map.get(locale) {
                        return s;
                    }
                }
                if let Some(s) = map.get("_") {
                    return s;
                }
                FALLBACK_LOCALES
                    .iter()
                    .find_map(|key| map.get(*key))
                    .map(String::as_str)
                    .unwrap_or("")
            }
        }
    }

    /// Whether no text is available at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Plain(s) => s.is_empty(),
            Self::ByLocale(map) => map.values().all(String::is_empty),
        }
    }
}

impl Default for LocalizedText {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl From<&str> for LocalizedText {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl From<String> for LocalizedText {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_string() {
        let text: LocalizedText = serde_json::from_str("\"Some Vendor\"").unwrap();
        assert_eq!(text.text(), "Some Vendor");
        assert_eq!(text.text_for(Some("zh_CN")), "Some Vendor");
    }

    #[test]
    fn test_locale_object_with_default() {
        let text: LocalizedText =
            serde_json::from_str(r#"{ "_": "default", "zh_CN": "中文" }"#).unwrap();
        assert_eq!(text.text(), "default");
        assert_eq!(text.text_for(Some("zh_CN")), "中文");
        assert_eq!(text.text_for(Some("fr_FR")), "default");
    }

    #[test]
    fn test_english_fallbacks() {
        let text: LocalizedText = serde_json::from_str(r#"{ "en_US": "english" }"#).unwrap();
        assert_eq!(text.text(), "english");

        let text: LocalizedText = serde_json::from_str(r#"{ "en_gb": "british" }"#).unwrap();
        assert_eq!(text.text_for(Some("ja_JP")), "british");
    }

    #[test]
    fn test_no_match_is_empty() {
        let text: LocalizedText = serde_json::from_str(r#"{ "zh_CN": "中文" }"#).unwrap();
        assert_eq!(text.text(), "");
        assert!(!text.is_empty());

        let empty = LocalizedText::default();
        assert!(empty.is_empty());
    }
}
