use std::collections::HashMap;
use std::path::Path;

use sentencepiece::SentencePieceProcessor;
use tracing::debug;

use crate::error::{Result, TranslateError};
use crate::processor::PreparedSentence;

pub const SRC_SPM_FILE: &str = "model.SRC";
pub const SRC_VOCAB_FILE: &str = "dict.SRC.json";
pub const TGT_VOCAB_FILE: &str = "dict.TGT.json";

const SPM_SPACE: char = '\u{2581}';

/// Token ↔ id table read from a `dict.*.json` file.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
    pub bos_id: u32,
    pub pad_id: u32,
    pub eos_id: u32,
    pub unk_id: u32,
}

impl Vocabulary {
    pub fn from_map(token_to_id: HashMap<String, u32>) -> Self {
        let id_to_token = token_to_id.iter().map(|(k, v)| (*v, k.clone())).collect();
        let lookup = |tok: &str, fallback: u32| token_to_id.get(tok).copied().unwrap_or(fallback);
        let bos_id = lookup("<s>", 0);
        let pad_id = lookup("<pad>", 1);
        let eos_id = lookup("</s>", 2);
        let unk_id = lookup("<unk>", 3);
        Self {
            token_to_id,
            id_to_token,
            bos_id,
            pad_id,
            eos_id,
            unk_id,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let map: HashMap<String, u32> = serde_json::from_str(&content)?;
        Ok(Self::from_map(map))
    }

    pub fn id(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(self.unk_id)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn is_special(&self, id: u32) -> bool {
        id == self.bos_id || id == self.pad_id || id == self.eos_id || id == self.unk_id
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// Joins sentencepiece pieces back into text, skipping special tokens.
    pub fn decode(&self, ids: &[u32]) -> String {
        let joined: String = ids
            .iter()
            .filter(|&&id| !self.is_special(id))
            .filter_map(|id| self.id_to_token.get(id).map(String::as_str))
            .collect();
        joined.replace(SPM_SPACE, " ").trim().to_string()
    }
}

/// Left-padded token ids with their attention mask.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub input_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.len()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }
}

/// Pads every sequence on the left to the longest one.
pub fn pad_longest(sequences: Vec<Vec<u32>>, pad_id: u32) -> EncodedBatch {
    let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut input_ids = Vec::with_capacity(sequences.len());
    let mut attention_mask = Vec::with_capacity(sequences.len());

    for seq in sequences {
        let pad = longest - seq.len();
        let mut ids = vec![pad_id; pad];
        let mut mask = vec![0u32; pad];
        mask.resize(longest, 1);
        ids.extend(seq);
        input_ids.push(ids);
        attention_mask.push(mask);
    }

    EncodedBatch {
        input_ids,
        attention_mask,
    }
}

/// `[src_tag, tgt_tag, pieces.., eos]`, with pieces cut so the total fits `max_length`.
pub fn build_source_ids(
    src_tag_id: u32,
    tgt_tag_id: u32,
    mut piece_ids: Vec<u32>,
    eos_id: u32,
    max_length: usize,
) -> Vec<u32> {
    let budget = max_length.saturating_sub(3);
    piece_ids.truncate(budget);

    let mut ids = Vec::with_capacity(piece_ids.len() + 3);
    ids.push(src_tag_id);
    ids.push(tgt_tag_id);
    ids.extend(piece_ids);
    ids.push(eos_id);
    ids
}

/// IndicTrans tokenizer: sentencepiece on the source side, vocabulary lookups on both.
pub struct IndicTransTokenizer {
    spm: SentencePieceProcessor,
    src_vocab: Vocabulary,
    tgt_vocab: Vocabulary,
    max_length: usize,
}

impl IndicTransTokenizer {
    pub fn from_dir(dir: &Path, max_length: usize) -> Result<Self> {
        let spm = SentencePieceProcessor::open(dir.join(SRC_SPM_FILE)).map_err(|e| {
            TranslateError::Tokenizer(format!("failed to load {}: {}", SRC_SPM_FILE, e))
        })?;
        let src_vocab = Vocabulary::from_file(&dir.join(SRC_VOCAB_FILE))?;
        let tgt_vocab = Vocabulary::from_file(&dir.join(TGT_VOCAB_FILE))?;

        debug!(
            src_vocab = src_vocab.len(),
            tgt_vocab = tgt_vocab.len(),
            max_length,
            "Loaded IndicTrans tokenizer"
        );

        Ok(Self {
            spm,
            src_vocab,
            tgt_vocab,
            max_length,
        })
    }

    fn encode_one(&self, sentence: &PreparedSentence) -> Result<Vec<u32>> {
        for tag in [sentence.src_tag, sentence.tgt_tag.as_str()] {
            if !self.src_vocab.contains(tag) {
                return Err(TranslateError::Tokenizer(format!(
                    "language tag {} missing from source vocabulary",
                    tag
                )));
            }
        }

        let pieces = self
            .spm
            .encode(&sentence.text)
            .map_err(|e| TranslateError::Tokenizer(format!("sentencepiece encode failed: {}", e)))?;
        let piece_ids = pieces.iter().map(|p| self.src_vocab.id(&p.piece)).collect();

        Ok(build_source_ids(
            self.src_vocab.id(sentence.src_tag),
            self.src_vocab.id(sentence.tgt_tag.as_str()),
            piece_ids,
            self.src_vocab.eos_id,
            self.max_length,
        ))
    }

    /// Truncates each sentence and pads the batch to its longest member.
    pub fn encode_batch(&self, batch: &[PreparedSentence]) -> Result<EncodedBatch> {
        let sequences = batch
            .iter()
            .map(|s| self.encode_one(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(pad_longest(sequences, self.src_vocab.pad_id))
    }

    pub fn decode_batch(&self, outputs: &[Vec<u32>]) -> Vec<String> {
        outputs.iter().map(|ids| self.tgt_vocab.decode(ids)).collect()
    }
}
