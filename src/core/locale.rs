use serde::{Deserialize, Serialize};

/// `(language, encoding)` pair, serialized as a two element sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale(pub Option<String>, pub Option<String>);

impl Locale {
    pub fn language(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.1.as_deref()
    }

    /// Parses a POSIX locale name such as `en_US.UTF-8@euro`.
    ///
    /// `C` and `POSIX` carry no language and map to `(None, None)`.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let value = value.split('@').next().unwrap_or(value);
        if value.is_empty() || value == "C" || value == "POSIX" {
            return Self::default();
        }
        match value.split_once('.') {
            Some((lang, enc)) => Self(non_empty(lang), non_empty(enc)),
            None => Self(non_empty(value), None),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_language_and_encoding() {
        let l = Locale::parse("en_US.UTF-8");
        assert_eq!(l.language(), Some("en_US"));
        assert_eq!(l.encoding(), Some("UTF-8"));
    }

    #[test]
    fn parse_drops_modifier() {
        let l = Locale::parse("de_DE.ISO-8859-15@euro");
        assert_eq!(l, Locale(Some("de_DE".into()), Some("ISO-8859-15".into())));
    }

    #[test]
    fn c_locale_has_no_language() {
        assert_eq!(Locale::parse("C"), Locale::default());
        assert_eq!(Locale::parse("POSIX"), Locale::default());
        assert_eq!(Locale::parse(""), Locale::default());
    }

    #[test]
    fn serializes_as_pair() {
        let v = serde_json::to_value(Locale(Some("ja_JP".into()), None)).unwrap();
        assert_eq!(v, serde_json::json!(["ja_JP", null]));
    }
}
