//! IndicTrans2 encoder-decoder on candle.

mod config;
pub mod device;
mod layers;

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{embedding, layer_norm, linear_no_bias, Embedding, LayerNorm, Linear, VarBuilder};
use tracing::info;

use crate::error::{Result as TranslateResult, TranslateError};
use crate::generation::{beam_search, GenerationConfig, StepScorer};
use crate::tokenizer::EncodedBatch;

pub use config::{Activation, IndicTransConfig};
use layers::{position_ids, sinusoidal_table, DecoderLayer, EncoderLayer};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const PTH_WEIGHTS_FILE: &str = "pytorch_model.bin";

/// The checkpoint's weights in `dir`, safetensors preferred.
pub fn find_weights(dir: &Path) -> Option<PathBuf> {
    [WEIGHTS_FILE, PTH_WEIGHTS_FILE]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// fairseq reserves the first rows of the position table.
const POSITION_OFFSET: usize = 2;
const LAYER_NORM_EPS: f64 = 1e-5;

fn optional_layer_norm(dim: usize, vb: VarBuilder) -> candle_core::Result<Option<LayerNorm>> {
    if vb.contains_tensor("weight") {
        Ok(Some(layer_norm(dim, LAYER_NORM_EPS, vb)?))
    } else {
        Ok(None)
    }
}

struct Encoder {
    embed_tokens: Embedding,
    embed_positions: Tensor,
    embed_scale: f64,
    layernorm_embedding: Option<LayerNorm>,
    layers: Vec<EncoderLayer>,
    layer_norm: Option<LayerNorm>,
    padding_idx: usize,
    dtype: DType,
}

impl Encoder {
    fn new(cfg: &IndicTransConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let dim = cfg.encoder_embed_dim;
        let layers = (0..cfg.encoder_layers)
            .map(|i| {
                EncoderLayer::new(
                    dim,
                    cfg.encoder_ffn_dim,
                    cfg.encoder_attention_heads,
                    cfg.activation_function,
                    cfg.encoder_normalize_before,
                    vb.pp(format!("layers.{}", i)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            embed_tokens: embedding(cfg.encoder_vocab_size, dim, vb.pp("embed_tokens"))?,
            embed_positions: sinusoidal_table(
                cfg.max_source_positions + POSITION_OFFSET,
                dim,
                cfg.pad_token_id as usize,
                vb.dtype(),
                vb.device(),
            )?,
            embed_scale: if cfg.scale_embedding { (dim as f64).sqrt() } else { 1.0 },
            layernorm_embedding: optional_layer_norm(dim, vb.pp("layernorm_embedding"))?,
            layers,
            layer_norm: if cfg.encoder_normalize_before {
                Some(layer_norm(dim, LAYER_NORM_EPS, vb.pp("layer_norm"))?)
            } else {
                None
            },
            padding_idx: cfg.pad_token_id as usize,
            dtype: vb.dtype(),
        })
    }

    fn forward(&self, batch: &EncodedBatch, device: &Device) -> candle_core::Result<Tensor> {
        let (b, s) = (batch.batch_size(), batch.seq_len());
        let flat: Vec<u32> = batch.input_ids.iter().flatten().copied().collect();
        let ids = Tensor::from_vec(flat, (b, s), device)?;

        let tokens = (self.embed_tokens.forward(&ids)? * self.embed_scale)?;
        let (_, _, dim) = tokens.dims3()?;
        let pos_ids = position_ids(&batch.attention_mask, self.padding_idx, 0);
        let positions = lookup_positions(&self.embed_positions, pos_ids, self.padding_idx)?
            .reshape((b, s, dim))?;

        let mut hidden = (tokens + positions)?;
        if let Some(ln) = &self.layernorm_embedding {
            hidden = ln.forward(&hidden)?;
        }

        let mask = padding_mask(&batch.attention_mask, self.dtype, device)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, Some(&mask))?;
        }
        match &self.layer_norm {
            Some(ln) => ln.forward(&hidden),
            None => Ok(hidden),
        }
    }
}

/// Rows of the sinusoidal table for `pos_ids`.
///
/// Positions past the end of `table` get a larger table built for this call;
/// rows are identical whatever the table length.
fn lookup_positions(
    table: &Tensor,
    pos_ids: Vec<u32>,
    padding_idx: usize,
) -> candle_core::Result<Tensor> {
    let (rows, dim) = table.dims2()?;
    let needed = pos_ids.iter().max().map_or(0, |&p| p as usize + 1);
    let len = pos_ids.len();
    let ids = Tensor::from_vec(pos_ids, len, table.device())?;
    if needed <= rows {
        return table.index_select(&ids, 0);
    }
    sinusoidal_table(needed, dim, padding_idx, table.dtype(), table.device())?.index_select(&ids, 0)
}

/// `(batch, 1, 1, src)` additive mask hiding pad positions.
fn padding_mask(attention_mask: &[Vec<u32>], dtype: DType, device: &Device) -> candle_core::Result<Tensor> {
    let b = attention_mask.len();
    let s = attention_mask.first().map_or(0, Vec::len);
    let neg = device::mask_value(dtype) as f32;
    let data: Vec<f32> = attention_mask
        .iter()
        .flatten()
        .map(|&m| if m == 0 { neg } else { 0.0 })
        .collect();
    Tensor::from_vec(data, (b, 1, 1, s), device)?.to_dtype(dtype)
}

/// `(1, 1, len, len)` mask hiding future positions.
fn causal_mask(len: usize, dtype: DType, device: &Device) -> candle_core::Result<Tensor> {
    let neg = device::mask_value(dtype) as f32;
    let data: Vec<f32> = (0..len)
        .flat_map(|i| (0..len).map(move |j| if j > i { neg } else { 0.0 }))
        .collect();
    Tensor::from_vec(data, (1, 1, len, len), device)?.to_dtype(dtype)
}

struct Decoder {
    embed_tokens: Embedding,
    embed_positions: Tensor,
    embed_scale: f64,
    layernorm_embedding: Option<LayerNorm>,
    layers: Vec<DecoderLayer>,
    layer_norm: Option<LayerNorm>,
    padding_idx: usize,
    dtype: DType,
}

impl Decoder {
    fn new(cfg: &IndicTransConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let dim = cfg.decoder_embed_dim;
        let layers = (0..cfg.decoder_layers)
            .map(|i| {
                DecoderLayer::new(
                    dim,
                    cfg.decoder_ffn_dim,
                    cfg.decoder_attention_heads,
                    cfg.activation_function,
                    cfg.decoder_normalize_before,
                    vb.pp(format!("layers.{}", i)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            embed_tokens: embedding(cfg.decoder_vocab_size, dim, vb.pp("embed_tokens"))?,
            embed_positions: sinusoidal_table(
                cfg.max_target_positions + POSITION_OFFSET,
                dim,
                cfg.pad_token_id as usize,
                vb.dtype(),
                vb.device(),
            )?,
            embed_scale: if cfg.scale_embedding { (dim as f64).sqrt() } else { 1.0 },
            layernorm_embedding: optional_layer_norm(dim, vb.pp("layernorm_embedding"))?,
            layers,
            layer_norm: if cfg.decoder_normalize_before {
                Some(layer_norm(dim, LAYER_NORM_EPS, vb.pp("layer_norm"))?)
            } else {
                None
            },
            padding_idx: cfg.pad_token_id as usize,
            dtype: vb.dtype(),
        })
    }

    /// Full-prefix decoder pass; `ids` holds unpadded, equal-length prefixes.
    fn forward(&self, ids: &Tensor, memory: &Tensor) -> candle_core::Result<Tensor> {
        let (_, t) = ids.dims2()?;
        let device = ids.device();

        let tokens = (self.embed_tokens.forward(ids)? * self.embed_scale)?;
        let pos_ids: Vec<u32> = (0..t).map(|i| (self.padding_idx + 1 + i) as u32).collect();
        let positions =
            lookup_positions(&self.embed_positions, pos_ids, self.padding_idx)?.unsqueeze(0)?;

        let mut hidden = tokens.broadcast_add(&positions)?;
        if let Some(ln) = &self.layernorm_embedding {
            hidden = ln.forward(&hidden)?;
        }

        let mask = causal_mask(t, self.dtype, device)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, memory, Some(&mask), None)?;
        }
        match &self.layer_norm {
            Some(ln) => ln.forward(&hidden),
            None => Ok(hidden),
        }
    }
}

pub struct IndicTransModel {
    encoder: Encoder,
    decoder: Decoder,
    lm_head: Linear,
    config: IndicTransConfig,
    device: Device,
}

impl IndicTransModel {
    pub fn new(config: IndicTransConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let encoder = Encoder::new(&config, vb.pp("model.encoder"))?;
        let decoder = Decoder::new(&config, vb.pp("model.decoder"))?;
        // Checkpoints sharing decoder input/output embeddings ship no lm_head.
        let lm_head = if vb.contains_tensor("lm_head.weight") {
            linear_no_bias(config.decoder_embed_dim, config.decoder_vocab_size, vb.pp("lm_head"))?
        } else {
            Linear::new(decoder.embed_tokens.embeddings().clone(), None)
        };

        Ok(Self {
            encoder,
            decoder,
            lm_head,
            device: vb.device().clone(),
            config,
        })
    }

    /// Loads `config.json` and the weights (`model.safetensors`, else
    /// `pytorch_model.bin`) from `dir`.
    pub fn load(dir: &Path, device: &Device, dtype: DType) -> TranslateResult<Self> {
        let config = IndicTransConfig::from_file(&dir.join(CONFIG_FILE))?;
        let weights = find_weights(dir).ok_or_else(|| {
            TranslateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {} or {} in {}", WEIGHTS_FILE, PTH_WEIGHTS_FILE, dir.display()),
            ))
        })?;

        info!(
            path = %weights.display(),
            ?dtype,
            encoder_layers = config.encoder_layers,
            decoder_layers = config.decoder_layers,
            "Loading IndicTrans2 weights"
        );

        let vb = if weights.ends_with(WEIGHTS_FILE) {
            // SAFETY: the weights file is not modified while the model is alive.
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights], dtype, device)? }
        } else {
            VarBuilder::from_pth(&weights, dtype, device)?
        };
        Ok(Self::new(config, vb)?)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn encode(&self, batch: &EncodedBatch) -> candle_core::Result<Tensor> {
        self.encoder.forward(batch, &self.device)
    }

    /// Beam-searches every sentence of the batch and returns the best
    /// token sequence for each, in input order.
    pub fn generate(
        &self,
        batch: &EncodedBatch,
        generation: &GenerationConfig,
    ) -> candle_core::Result<Vec<Vec<u32>>> {
        let memory = self.encode(batch)?;
        let mut outputs = Vec::with_capacity(batch.batch_size());

        for (i, mask) in batch.attention_mask.iter().enumerate() {
            // Left padding: real tokens are the tail of the row.
            let pad = mask.iter().take_while(|&&m| m == 0).count();
            let sentence_memory = memory.i((i..i + 1, pad.., ..))?.contiguous()?;

            let mut scorer = DecoderScorer {
                model: self,
                memory: sentence_memory,
            };
            let best = beam_search(
                &mut scorer,
                self.config.decoder_start_token_id,
                self.config.eos_token_id,
                generation,
            )?
            .into_iter()
            .next()
            .map(|h| h.tokens)
            .unwrap_or_default();
            outputs.push(best);
        }

        Ok(outputs)
    }
}

/// Scores beam prefixes for one source sentence against its encoder output.
struct DecoderScorer<'a> {
    model: &'a IndicTransModel,
    memory: Tensor,
}

impl StepScorer for DecoderScorer<'_> {
    type Error = candle_core::Error;

    fn log_probs(&mut self, prefixes: &[Vec<u32>]) -> candle_core::Result<Vec<Vec<f32>>> {
        let n = prefixes.len();
        let t = prefixes.first().map_or(0, Vec::len);
        let flat: Vec<u32> = prefixes.iter().flatten().copied().collect();
        let ids = Tensor::from_vec(flat, (n, t), &self.model.device)?;
        let memory = self.memory.repeat((n, 1, 1))?;

        let hidden = self.model.decoder.forward(&ids, &memory)?;
        let last = hidden.narrow(1, t - 1, 1)?;
        let logits = self.model.lm_head.forward(&last)?.squeeze(1)?.to_dtype(DType::F32)?;
        candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec2::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::pad_longest;

    fn tiny_config() -> IndicTransConfig {
        tiny_config_with_positions(32)
    }

    fn tiny_config_with_positions(max_positions: usize) -> IndicTransConfig {
        let mut config: IndicTransConfig = serde_json::from_str(
            r#"{
                "encoder_vocab_size": 16, "decoder_vocab_size": 12,
                "encoder_embed_dim": 8, "decoder_embed_dim": 8,
                "encoder_layers": 1, "decoder_layers": 1,
                "encoder_ffn_dim": 16, "decoder_ffn_dim": 16,
                "encoder_attention_heads": 2, "decoder_attention_heads": 2,
                "max_source_positions": 32, "max_target_positions": 32
            }"#,
        )
        .unwrap();
        config.max_source_positions = max_positions;
        config.max_target_positions = max_positions;
        config
    }

    #[test]
    fn encoder_output_covers_padded_batch() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = IndicTransModel::new(tiny_config(), vb).unwrap();
        let batch = pad_longest(vec![vec![5, 6, 7, 2], vec![5, 2]], 1);
        let memory = model.encode(&batch).unwrap();
        assert_eq!(memory.dims(), &[2, 4, 8]);
    }

    #[test]
    fn generate_returns_one_sequence_per_input() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = IndicTransModel::new(tiny_config(), vb).unwrap();
        let batch = pad_longest(vec![vec![5, 6, 2], vec![7, 2]], 1);
        let generation = GenerationConfig {
            num_beams: 2,
            max_length: 4,
            ..GenerationConfig::default()
        };
        let out = model.generate(&batch, &generation).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|seq| seq.len() < 4));
    }

    #[test]
    fn generation_runs_past_max_target_positions() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = IndicTransModel::new(tiny_config_with_positions(4), vb).unwrap();
        let batch = pad_longest(vec![vec![5, 6, 2]], 1);
        let generation = GenerationConfig {
            num_beams: 1,
            max_length: 10,
            min_length: 9,
            ..GenerationConfig::default()
        };
        let out = model.generate(&batch, &generation).unwrap();
        assert!(out[0].len() >= 8, "stopped early: {:?}", out[0]);
    }

    #[test]
    fn encoder_accepts_inputs_longer_than_max_source_positions() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = IndicTransModel::new(tiny_config_with_positions(4), vb).unwrap();
        let batch = pad_longest(vec![(3..12).collect(), vec![5, 2]], 1);
        let memory = model.encode(&batch).unwrap();
        assert_eq!(memory.dims(), &[2, 9, 8]);
    }

    #[test]
    fn grown_position_rows_match_the_table() {
        let table = sinusoidal_table(6, 8, 1, DType::F32, &Device::Cpu).unwrap();
        let rows = lookup_positions(&table, vec![2, 5, 9], 1)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        let full = sinusoidal_table(10, 8, 1, DType::F32, &Device::Cpu)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(rows[0], full[2]);
        assert_eq!(rows[1], full[5]);
        assert_eq!(rows[2], full[9]);
    }
}
