use thiserror::Error;

/// Everything that can go wrong between receiving texts and returning translations.
///
/// None of these reach the client as an HTTP failure status; the endpoint
/// renders them into the `error` field of a 200 response.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Texts cannot be empty")]
    EmptyInput,

    #[error("Unsupported target language: {code}. Supported: {supported}")]
    UnsupportedLanguage { code: String, supported: String },

    #[error("Preprocessing failed. Check text processor configuration.")]
    Preprocessing,

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model download failed: {0}")]
    Hub(#[from] hf_hub::api::tokio::ApiError),

    #[error("translation task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TranslateError {
    /// Message placed in the response `error` field.
    ///
    /// Validation errors are reported verbatim; anything raised by the
    /// pipeline itself is prefixed so clients can tell the two apart.
    pub fn client_message(&self) -> String {
        match self {
            Self::EmptyInput | Self::UnsupportedLanguage { .. } | Self::Preprocessing => {
                self.to_string()
            }
            other => format!("Translation failed: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
