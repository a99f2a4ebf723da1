use serde::Serialize;

use crate::error::TranslateError;

/// Source side of every request; the model only translates out of English.
pub const SOURCE_TAG: &str = "eng_Latn";

/// Short code → Flores-200 locale-script tag, in the order clients see them.
const LANGUAGES: &[(&str, &str)] = &[
    ("hi", "hin_Deva"),
    ("ta", "tam_Taml"),
    ("te", "tel_Telu"),
    ("bn", "ben_Beng"),
    ("ml", "mal_Mlym"),
    ("kok", "gom_Deva"), // Konkani
    ("mr", "mar_Deva"),
    ("gu", "guj_Gujr"),
    ("kn", "kan_Knda"),
    ("pa", "pan_Guru"),
    ("or", "ory_Orya"),
    ("as", "asm_Beng"),
    ("brx", "brx_Deva"), // Bodo
    ("doi", "doi_Deva"), // Dogri
    ("ks", "kas_Arab"),
    ("mai", "mai_Deva"),
    ("mni", "mni_Beng"), // Manipuri (Meitei)
    ("ne", "npi_Deva"),
    ("sa", "san_Deva"),
    ("sat", "sat_Olck"), // Santali
    ("sd", "snd_Arab"),
    ("ur", "urd_Arab"),
];

/// A standardized language tag such as `hin_Deva`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LanguageTag(&'static str);

impl LanguageTag {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Language half of the tag (`hin`).
    pub fn language(&self) -> &'static str {
        self.0.split('_').next().unwrap_or(self.0)
    }

    /// Script half of the tag (`Deva`).
    pub fn script(&self) -> &'static str {
        self.0.split('_').nth(1).unwrap_or("")
    }

    /// Scripts that end sentences with the danda (।).
    pub fn uses_danda(&self) -> bool {
        matches!(self.script(), "Deva" | "Beng") && self.language() != "mni"
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageEntry {
    pub code: &'static str,
    pub tag: LanguageTag,
}

/// Fixed registry of supported target languages.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry;

impl LanguageRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Looks up a short code, ignoring case. Whitespace is not stripped.
    pub fn resolve(&self, code: &str) -> Option<LanguageTag> {
        let code = code.to_lowercase();
        LANGUAGES
            .iter()
            .find(|(short, _)| *short == code)
            .map(|&(_, tag)| LanguageTag(tag))
    }

    /// Like [`resolve`](Self::resolve) but produces the client-facing error.
    pub fn require(&self, code: &str) -> Result<LanguageTag, TranslateError> {
        self.resolve(code).ok_or_else(|| TranslateError::UnsupportedLanguage {
            code: code.to_lowercase(),
            supported: self.supported_list(),
        })
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> {
        LANGUAGES.iter().map(|(code, _)| *code)
    }

    pub fn entries(&self) -> Vec<LanguageEntry> {
        LANGUAGES
            .iter()
            .map(|&(code, tag)| LanguageEntry {
                code,
                tag: LanguageTag(tag),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        LANGUAGES.len()
    }

    pub fn is_empty(&self) -> bool {
        LANGUAGES.is_empty()
    }

    /// `['hi', 'ta', ...]`
    fn supported_list(&self) -> String {
        let quoted: Vec<String> = self.codes().map(|c| format!("'{}'", c)).collect();
        format!("[{}]", quoted.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_codes() {
        let registry = LanguageRegistry::new();
        assert_eq!(registry.resolve("hi").map(|t| t.as_str()), Some("hin_Deva"));
        assert_eq!(registry.resolve("kok").map(|t| t.as_str()), Some("gom_Deva"));
        assert_eq!(registry.resolve("ne").map(|t| t.as_str()), Some("npi_Deva"));
        assert_eq!(registry.len(), 22);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = LanguageRegistry::new();
        assert_eq!(registry.resolve("TA").map(|t| t.as_str()), Some("tam_Taml"));
        assert_eq!(registry.resolve("Hi").map(|t| t.as_str()), Some("hin_Deva"));
    }

    #[test]
    fn padded_code_is_unsupported() {
        let registry = LanguageRegistry::new();
        assert!(registry.resolve(" hi").is_none());
        let err = registry.require("hi ").unwrap_err();
        assert!(err.to_string().starts_with("Unsupported target language: hi . Supported:"));
    }

    #[test]
    fn unknown_code_lists_supported_languages() {
        let registry = LanguageRegistry::new();
        let err = registry.require("FR").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Unsupported target language: fr. Supported: ['hi', 'ta'"));
        assert!(message.ends_with("'ur']"));
    }

    #[test]
    fn tag_parts() {
        let tag = LanguageRegistry::new().resolve("sat").unwrap();
        assert_eq!(tag.language(), "sat");
        assert_eq!(tag.script(), "Olck");
        assert!(!tag.uses_danda());
        assert!(LanguageRegistry::new().resolve("hi").unwrap().uses_danda());
    }
}
