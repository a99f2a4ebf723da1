use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::TranslateError;
use crate::language::LanguageRegistry;
use crate::translate::Translator;

/// Validates requests and runs them through the shared translator.
///
/// Invalid input is rejected before the translator is touched.
pub struct TranslationService {
    translator: Arc<dyn Translator>,
    registry: LanguageRegistry,
}

impl TranslationService {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            registry: LanguageRegistry::new(),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn translator(&self) -> &dyn Translator {
        self.translator.as_ref()
    }

    pub async fn translate(
        &self,
        texts: Vec<String>,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslateError> {
        let texts: Vec<String> = texts.iter().map(|t| t.trim().to_string()).collect();
        if texts.iter().all(|t| t.is_empty()) {
            warn!("Rejected request with empty texts");
            return Err(TranslateError::EmptyInput);
        }
        let target = self.registry.require(target_lang).map_err(|e| {
            warn!(target_lang, "Rejected unsupported target language");
            e
        })?;

        let request_id = Uuid::new_v4();
        let batch = texts.len();
        info!(%request_id, batch, target = %target, "Translating");

        let started = Instant::now();
        match self.translator.translate_batch(texts, target).await {
            Ok(translated) => {
                info!(
                    %request_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Translation complete"
                );
                Ok(translated)
            }
            Err(e) => {
                error!(%request_id, error = %e, "Translation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageTag;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for Recording {
        async fn translate_batch(
            &self,
            texts: Vec<String>,
            target: LanguageTag,
        ) -> Result<Vec<String>, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.into_iter().map(|t| format!("{}:{}", target, t)).collect())
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn device(&self) -> &str {
            "cpu"
        }
    }

    fn service() -> (TranslationService, Arc<Recording>) {
        let translator = Arc::new(Recording {
            calls: AtomicUsize::new(0),
        });
        (TranslationService::new(translator.clone()), translator)
    }

    #[tokio::test]
    async fn trims_and_forwards_valid_requests() {
        let (svc, rec) = service();
        let out = svc
            .translate(vec!["  Hello ".to_string(), "".to_string()], "HI")
            .await
            .unwrap();
        assert_eq!(out, vec!["hin_Deva:Hello", "hin_Deva:"]);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn whitespace_only_input_never_reaches_translator() {
        let (svc, rec) = service();
        for texts in [vec![], vec![" ".to_string(), "\n\t".to_string()]] {
            let err = svc.translate(texts, "hi").await.unwrap_err();
            assert!(matches!(err, TranslateError::EmptyInput));
        }
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_input_is_reported_before_bad_language() {
        let (svc, _) = service();
        let err = svc.translate(vec!["".to_string()], "xx").await.unwrap_err();
        assert!(matches!(err, TranslateError::EmptyInput));
    }

    #[tokio::test]
    async fn unsupported_language_never_reaches_translator() {
        let (svc, rec) = service();
        let err = svc.translate(vec!["Hello".to_string()], "fr").await.unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedLanguage { .. }));
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    }
}
