use regex::{Captures, Regex};

/// Spans the model must copy through untouched, in masking order.
const MASK_PATTERNS: &[&str] = &[
    // e-mail
    r"[\w.+-]+@[\w-]+\.[\w.-]*\w",
    // url
    r"(?:https?://|www\.)[^\s<>]+[^\s<>.,;:!?)]",
    // numerals with separators, percentages
    r"\d+[-/.,:']\d+[-/.,:'+]\d+(?:\.\d+)?|\d+[-/.:'+]\d+(?:\.\d+)?|~?\d+%",
    // hashtags and mentions
    r"[#@]\w+",
];

/// Replaces maskable spans with `<IDn>` and restores them afterwards.
#[derive(Debug, Clone)]
pub struct PlaceholderMasker {
    patterns: Vec<Regex>,
    restore: Regex,
}

impl PlaceholderMasker {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = MASK_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        // The model sometimes spaces out or re-brackets the tag.
        let restore = Regex::new(r"[<\[]\s*ID\s*(\d+)\s*[>\]]")?;
        Ok(Self { patterns, restore })
    }

    /// Masks `text`, returning the masked text and the original spans.
    ///
    /// Span `i` is written as `<ID{i+1}>`. Repeated spans share one id.
    pub fn mask(&self, text: &str) -> (String, Vec<String>) {
        let mut spans: Vec<String> = Vec::new();
        let mut masked = text.to_string();

        for pattern in &self.patterns {
            masked = pattern
                .replace_all(&masked, |caps: &Captures| {
                    let span = &caps[0];
                    let idx = match spans.iter().position(|s| s == span) {
                        Some(idx) => idx,
                        None => {
                            spans.push(span.to_string());
                            spans.len() - 1
                        }
                    };
                    format!("<ID{}>", idx + 1)
                })
                .into_owned();
        }

        (masked, spans)
    }

    /// Puts the original spans back. Unknown ids are left as emitted.
    pub fn unmask(&self, text: &str, spans: &[String]) -> String {
        if spans.is_empty() {
            return text.to_string();
        }
        self.restore
            .replace_all(text, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| spans.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_urls_emails_and_numbers() {
        let masker = PlaceholderMasker::new().unwrap();
        let (masked, spans) =
            masker.mask("Mail ravi@example.com or visit https://agri.in/prices on 12/05/2024.");
        assert_eq!(masked, "Mail <ID1> or visit <ID2> on <ID3>.");
        assert_eq!(spans, vec!["ravi@example.com", "https://agri.in/prices", "12/05/2024"]);
    }

    #[test]
    fn repeated_spans_share_an_id() {
        let masker = PlaceholderMasker::new().unwrap();
        let (masked, spans) = masker.mask("#kisan and #kisan again");
        assert_eq!(masked, "<ID1> and <ID1> again");
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn plain_text_is_untouched() {
        let masker = PlaceholderMasker::new().unwrap();
        let (masked, spans) = masker.mask("Hello, how are you?");
        assert_eq!(masked, "Hello, how are you?");
        assert!(spans.is_empty());
    }

    #[test]
    fn restores_spacing_variants() {
        let masker = PlaceholderMasker::new().unwrap();
        let spans = vec!["50%".to_string(), "www.kisan.gov.in".to_string()];
        let out = masker.unmask("कीमत < ID1 > बढ़ी, देखें [ID2] और <ID7>", &spans);
        assert_eq!(out, "कीमत 50% बढ़ी, देखें www.kisan.gov.in और <ID7>");
    }
}
