use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::language::SOURCE_TAG;
use crate::state::AppState;

pub const ROOT_MESSAGE: &str = "IndicTrans2 Translation API running 🚀";

/// Body of `POST /translate`, in either batch or single-text form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TranslateRequest {
    Batch { texts: Vec<String>, target_lang: String },
    Single { text: String, target_lang: String },
}

/// Mirrors the request shape; errors still go out with HTTP 200.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TranslateResponse {
    Batch { translated_texts: Vec<String> },
    Single { translated_text: String },
    Error { error: String },
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": ROOT_MESSAGE }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let translator = state.service.translator();
    Json(json!({
        "status": "ok",
        "model": translator.name(),
        "device": translator.device(),
    }))
}

pub async fn languages(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "source": SOURCE_TAG,
        "languages": state.service.registry().entries(),
    }))
}

pub async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Json<TranslateResponse> {
    let response = match request {
        TranslateRequest::Batch { texts, target_lang } => {
            match state.service.translate(texts, &target_lang).await {
                Ok(translated_texts) => TranslateResponse::Batch { translated_texts },
                Err(e) => TranslateResponse::Error {
                    error: e.client_message(),
                },
            }
        }
        TranslateRequest::Single { text, target_lang } => {
            match state.service.translate(vec![text], &target_lang).await {
                Ok(mut translated) => TranslateResponse::Single {
                    translated_text: translated.pop().unwrap_or_default(),
                },
                Err(e) => TranslateResponse::Error {
                    error: e.client_message(),
                },
            }
        }
    };
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shapes_deserialize() {
        let batch: TranslateRequest =
            serde_json::from_str(r#"{"texts": ["a", "b"], "target_lang": "hi"}"#).unwrap();
        assert!(matches!(batch, TranslateRequest::Batch { ref texts, .. } if texts.len() == 2));

        let single: TranslateRequest =
            serde_json::from_str(r#"{"text": "a", "target_lang": "ta"}"#).unwrap();
        assert!(matches!(single, TranslateRequest::Single { .. }));

        assert!(serde_json::from_str::<TranslateRequest>(r#"{"target_lang": "hi"}"#).is_err());
    }

    #[test]
    fn responses_serialize_flat() {
        let ok = serde_json::to_value(TranslateResponse::Single {
            translated_text: "नमस्ते".to_string(),
        })
        .unwrap();
        assert_eq!(ok, json!({"translated_text": "नमस्ते"}));

        let err = serde_json::to_value(TranslateResponse::Error {
            error: "Texts cannot be empty".to_string(),
        })
        .unwrap();
        assert_eq!(err, json!({"error": "Texts cannot be empty"}));
    }
}
