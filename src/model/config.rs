use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Gelu,
    Relu,
}

/// Hyperparameters from the checkpoint's `config.json`.
///
/// Defaults are those of the 1B en→indic checkpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicTransConfig {
    #[serde(default = "d::encoder_vocab_size")]
    pub encoder_vocab_size: usize,
    #[serde(default = "d::decoder_vocab_size")]
    pub decoder_vocab_size: usize,
    #[serde(default = "d::embed_dim")]
    pub encoder_embed_dim: usize,
    #[serde(default = "d::embed_dim")]
    pub decoder_embed_dim: usize,
    #[serde(default = "d::layers")]
    pub encoder_layers: usize,
    #[serde(default = "d::layers")]
    pub decoder_layers: usize,
    #[serde(default = "d::ffn_dim")]
    pub encoder_ffn_dim: usize,
    #[serde(default = "d::ffn_dim")]
    pub decoder_ffn_dim: usize,
    #[serde(default = "d::heads")]
    pub encoder_attention_heads: usize,
    #[serde(default = "d::heads")]
    pub decoder_attention_heads: usize,
    #[serde(default = "d::yes")]
    pub encoder_normalize_before: bool,
    #[serde(default = "d::yes")]
    pub decoder_normalize_before: bool,
    #[serde(default = "d::yes")]
    pub scale_embedding: bool,
    #[serde(default = "d::activation")]
    pub activation_function: Activation,
    #[serde(default = "d::max_positions")]
    pub max_source_positions: usize,
    #[serde(default = "d::max_positions")]
    pub max_target_positions: usize,
    #[serde(default = "d::pad")]
    pub pad_token_id: u32,
    #[serde(default = "d::bos")]
    pub bos_token_id: u32,
    #[serde(default = "d::eos")]
    pub eos_token_id: u32,
    #[serde(default = "d::eos")]
    pub decoder_start_token_id: u32,
}

mod d {
    use super::Activation;

    pub fn encoder_vocab_size() -> usize {
        32322
    }
    pub fn decoder_vocab_size() -> usize {
        122672
    }
    pub fn embed_dim() -> usize {
        1024
    }
    pub fn layers() -> usize {
        18
    }
    pub fn ffn_dim() -> usize {
        8192
    }
    pub fn heads() -> usize {
        16
    }
    pub fn yes() -> bool {
        true
    }
    pub fn activation() -> Activation {
        Activation::Gelu
    }
    pub fn max_positions() -> usize {
        256
    }
    pub fn pad() -> u32 {
        1
    }
    pub fn bos() -> u32 {
        0
    }
    pub fn eos() -> u32 {
        2
    }
}

impl IndicTransConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_checkpoint_config() {
        let json = r#"{
            "encoder_embed_dim": 512,
            "decoder_embed_dim": 512,
            "encoder_layers": 6,
            "activation_function": "relu",
            "decoder_normalize_before": false,
            "architectures": ["IndicTransForConditionalGeneration"]
        }"#;
        let config: IndicTransConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.encoder_embed_dim, 512);
        assert_eq!(config.encoder_layers, 6);
        assert_eq!(config.decoder_layers, 18);
        assert_eq!(config.activation_function, Activation::Relu);
        assert!(config.encoder_normalize_before);
        assert!(!config.decoder_normalize_before);
        assert_eq!(config.decoder_start_token_id, 2);
    }

    #[test]
    fn empty_config_matches_one_billion_checkpoint() {
        let config: IndicTransConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.decoder_vocab_size, 122672);
        assert_eq!(config.encoder_attention_heads, 16);
        assert_eq!(config.pad_token_id, 1);
    }
}
