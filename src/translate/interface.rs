use async_trait::async_trait;

use crate::error::TranslateError;
use crate::language::LanguageTag;

/// Translates English text into one target language.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates every text into `target`, preserving order.
    ///
    /// Texts are already trimmed; the batch succeeds or fails as a whole.
    async fn translate_batch(
        &self,
        texts: Vec<String>,
        target: LanguageTag,
    ) -> Result<Vec<String>, TranslateError>;

    /// Short identifier reported by the health endpoint.
    fn name(&self) -> &str;

    /// Where inference runs (`cpu`, `cuda`, ...).
    fn device(&self) -> &str;
}
