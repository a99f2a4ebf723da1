use std::sync::Arc;

use crate::config::Config;
use crate::service::TranslationService;
use crate::translate::Translator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<TranslationService>,
}

impl AppState {
    pub fn new(config: Config, translator: Arc<dyn Translator>) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(TranslationService::new(translator)),
        }
    }
}
