//! Decoding strategy for the seq2seq model.
//!
//! The search itself only needs per-step log-probabilities, so it is written
//! against [`StepScorer`] and never touches tensors directly.

mod beam;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use beam::{beam_search, Hypothesis};

/// Produces next-token log-probabilities for a set of equal-length prefixes.
pub trait StepScorer {
    type Error;

    /// Returns one row of vocabulary log-probabilities per prefix.
    fn log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, Self::Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
    /// Upper bound on output length, decoder start token included.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub min_length: usize,
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: usize,
    #[serde(default = "default_length_penalty")]
    pub length_penalty: f32,
    #[serde(default)]
    pub early_stopping: bool,
}

fn default_num_beams() -> usize {
    5
}

fn default_max_length() -> usize {
    256
}

fn default_num_return_sequences() -> usize {
    1
}

fn default_length_penalty() -> f32 {
    1.0
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_beams: default_num_beams(),
            max_length: default_max_length(),
            min_length: 0,
            num_return_sequences: default_num_return_sequences(),
            length_penalty: default_length_penalty(),
            early_stopping: false,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_beams == 0 {
            anyhow::bail!("generation.num_beams must be at least 1");
        }
        if self.num_return_sequences == 0 || self.num_return_sequences > self.num_beams {
            anyhow::bail!(
                "generation.num_return_sequences must be between 1 and num_beams ({})",
                self.num_beams
            );
        }
        if self.max_length <= self.min_length {
            anyhow::bail!("generation.max_length must be greater than min_length");
        }
        Ok(())
    }
}
