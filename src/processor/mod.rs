//! Text pre/post-processing around the model.
//!
//! Before tokenization: fold punctuation, mask spans the model must not
//! touch, and attach the language tags. After decoding: restore the masked
//! spans and tidy spacing for the target script.

mod normalize;
mod placeholder;

use crate::error::TranslateError;
use crate::language::LanguageTag;

pub use normalize::Normalizer;
pub use placeholder::PlaceholderMasker;

/// One sentence ready for the tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSentence {
    pub src_tag: &'static str,
    pub tgt_tag: LanguageTag,
    pub text: String,
    /// Original spans, `placeholders[i]` stands for `<ID{i+1}>`.
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TextProcessor {
    normalizer: Normalizer,
    masker: PlaceholderMasker,
}

impl TextProcessor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            normalizer: Normalizer::new()?,
            masker: PlaceholderMasker::new()?,
        })
    }

    pub fn preprocess_batch(
        &self,
        texts: &[String],
        src_tag: &'static str,
        tgt_tag: LanguageTag,
    ) -> Result<Vec<PreparedSentence>, TranslateError> {
        let batch: Vec<PreparedSentence> = texts
            .iter()
            .map(|text| {
                let normalized = self.normalizer.normalize_source(text);
                let (text, placeholders) = self.masker.mask(&normalized);
                PreparedSentence {
                    src_tag,
                    tgt_tag,
                    text,
                    placeholders,
                }
            })
            .collect();

        if batch.is_empty() || batch.len() != texts.len() {
            return Err(TranslateError::Preprocessing);
        }
        Ok(batch)
    }

    /// `outputs[i]` must be the decoded translation of `prepared[i]`.
    pub fn postprocess_batch(
        &self,
        outputs: &[String],
        prepared: &[PreparedSentence],
        tgt_tag: LanguageTag,
    ) -> Vec<String> {
        let uses_danda = tgt_tag.uses_danda();
        outputs
            .iter()
            .zip(prepared)
            .map(|(out, sent)| {
                let restored = self.masker.unmask(out, &sent.placeholders);
                self.normalizer.detokenize(&restored, uses_danda)
            })
            .collect()
    }
}
