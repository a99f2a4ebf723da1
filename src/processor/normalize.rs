use regex::Regex;

/// Typographic characters folded to their ASCII forms before tokenization.
const PUNCT_MAP: &[(char, &str)] = &[
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{201E}', "\""),
    ('\u{00AB}', "\""),
    ('\u{00BB}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201A}', "'"),
    ('\u{2032}', "'"),
    ('\u{2013}', "-"),
    ('\u{2014}', " - "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{200B}', ""),
    ('\u{FEFF}', ""),
];

#[derive(Debug, Clone)]
pub struct Normalizer {
    whitespace: Regex,
    space_before_punct: Regex,
    space_after_open: Regex,
    danda_spacing: Regex,
}

impl Normalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            space_before_punct: Regex::new(r"\s+([.,!?;:)\]}%।॥])")?,
            space_after_open: Regex::new(r"([(\[{])\s+")?,
            danda_spacing: Regex::new(r"\s*([।॥])\s*")?,
        })
    }

    /// Source-side cleanup: ASCII punctuation, single spaces, trimmed.
    pub fn normalize_source(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            match PUNCT_MAP.iter().find(|(from, _)| *from == ch) {
                Some((_, to)) => out.push_str(to),
                None if ch.is_control() && !ch.is_whitespace() => {}
                None => out.push(ch),
            }
        }
        self.collapse(&out)
    }

    /// Target-side detokenization of decoded model output.
    pub fn detokenize(&self, text: &str, uses_danda: bool) -> String {
        let text = self.collapse(text);
        let text = self.space_before_punct.replace_all(&text, "$1");
        let text = self.space_after_open.replace_all(&text, "$1");
        let text = if uses_danda {
            self.danda_spacing.replace_all(&text, "$1 ").into_owned()
        } else {
            text.into_owned()
        };
        text.trim().to_string()
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}
