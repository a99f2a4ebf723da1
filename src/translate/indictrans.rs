use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::Device;
use tracing::debug;

use super::interface::Translator;
use crate::config::ModelConfig;
use crate::error::{Result, TranslateError};
use crate::generation::GenerationConfig;
use crate::language::{LanguageTag, SOURCE_TAG};
use crate::model::{device, IndicTransModel};
use crate::processor::TextProcessor;
use crate::tokenizer::IndicTransTokenizer;

struct Inner {
    model: IndicTransModel,
    tokenizer: IndicTransTokenizer,
    processor: TextProcessor,
    generation: GenerationConfig,
}

impl Inner {
    /// preprocess → tokenize → generate → decode → postprocess
    fn run(&self, texts: &[String], target: LanguageTag) -> Result<Vec<String>> {
        let prepared = self.processor.preprocess_batch(texts, SOURCE_TAG, target)?;
        debug!(?prepared, "Preprocessed batch");

        let encoded = self.tokenizer.encode_batch(&prepared)?;
        debug!(
            batch = encoded.batch_size(),
            seq_len = encoded.seq_len(),
            "Tokenized inputs"
        );

        let generated = self.model.generate(&encoded, &self.generation)?;
        let decoded = self.tokenizer.decode_batch(&generated);
        debug!(?decoded, "Decoded tokens");

        Ok(self.processor.postprocess_batch(&decoded, &prepared, target))
    }
}

/// IndicTrans2 en→indic running in-process on candle.
pub struct IndicTransEngine {
    inner: Arc<Inner>,
    device_name: &'static str,
}

impl IndicTransEngine {
    /// Loads model, tokenizer and processor from a checkpoint directory.
    pub fn load(dir: &Path, model: &ModelConfig, generation: GenerationConfig) -> Result<Self> {
        let device = device::select_device(model.device)?;
        let dtype = device::select_dtype(model.dtype, &device);

        let started = Instant::now();
        let net = IndicTransModel::load(dir, &device, dtype)?;
        let tokenizer = IndicTransTokenizer::from_dir(dir, model.max_source_length)?;
        let processor = TextProcessor::new()
            .map_err(|e| TranslateError::Tokenizer(format!("invalid text processor pattern: {}", e)))?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            device = device::describe(&device),
            "IndicTrans2 model loaded successfully"
        );

        Ok(Self {
            device_name: device::describe(&device),
            inner: Arc::new(Inner {
                model: net,
                tokenizer,
                processor,
                generation,
            }),
        })
    }

    fn compute_device(&self) -> &Device {
        self.inner.model.device()
    }
}

#[async_trait]
impl Translator for IndicTransEngine {
    async fn translate_batch(&self, texts: Vec<String>, target: LanguageTag) -> Result<Vec<String>> {
        let inner = Arc::clone(&self.inner);
        let device = self.compute_device().clone();

        // Inference is CPU/GPU bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let out = inner.run(&texts, target);
            // Request tensors are dropped by now; wait for queued kernels so
            // their buffers go back to the allocator before the next request.
            device.synchronize()?;
            out
        })
        .await?
    }

    fn name(&self) -> &str {
        "indictrans2-en-indic"
    }

    fn device(&self) -> &str {
        self.device_name
    }
}
