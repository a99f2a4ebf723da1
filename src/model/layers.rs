use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, VarBuilder};

use super::config::Activation;

const LAYER_NORM_EPS: f64 = 1e-5;

/// Fairseq sinusoidal table; row `padding_idx` is all zeros.
pub fn sinusoidal_table(
    num_positions: usize,
    dim: usize,
    padding_idx: usize,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    let half = dim / 2;
    let scale = (10000f64).ln() / (half.max(2) - 1) as f64;

    let mut data = vec![0f32; num_positions * dim];
    for pos in 0..num_positions {
        if pos == padding_idx {
            continue;
        }
        let row = &mut data[pos * dim..(pos + 1) * dim];
        for i in 0..half {
            let angle = pos as f64 * (-scale * i as f64).exp();
            row[i] = angle.sin() as f32;
            row[half + i] = angle.cos() as f32;
        }
    }

    Tensor::from_vec(data, (num_positions, dim), device)?.to_dtype(dtype)
}

/// Position ids counted over non-pad tokens, offset past `padding_idx`.
/// Pad positions map to `padding_idx` itself (a zero row).
pub fn position_ids(attention_mask: &[Vec<u32>], padding_idx: usize, offset: usize) -> Vec<u32> {
    let mut ids = Vec::with_capacity(attention_mask.iter().map(Vec::len).sum());
    for row in attention_mask {
        let mut seen = 0;
        for &m in row {
            if m == 0 {
                ids.push(padding_idx as u32);
            } else {
                seen += 1;
                ids.push((padding_idx + offset + seen) as u32);
            }
        }
    }
    ids
}

pub struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl Attention {
    pub fn new(embed_dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        let head_dim = embed_dim / num_heads;
        Ok(Self {
            q_proj: linear(embed_dim, embed_dim, vb.pp("q_proj"))?,
            k_proj: linear(embed_dim, embed_dim, vb.pp("k_proj"))?,
            v_proj: linear(embed_dim, embed_dim, vb.pp("v_proj"))?,
            out_proj: linear(embed_dim, embed_dim, vb.pp("out_proj"))?,
            num_heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    fn split_heads(&self, x: &Tensor, batch: usize, len: usize) -> Result<Tensor> {
        x.reshape((batch, len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    /// `mask` is additive and broadcast over `(batch, heads, tgt, src)`.
    pub fn forward(&self, query: &Tensor, kv: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, tgt_len, _) = query.dims3()?;
        let (_, src_len, _) = kv.dims3()?;

        let q = self.split_heads(&(self.q_proj.forward(query)? * self.scale)?, batch, tgt_len)?;
        let k = self.split_heads(&self.k_proj.forward(kv)?, batch, src_len)?;
        let v = self.split_heads(&self.v_proj.forward(kv)?, batch, src_len)?;

        let scores = q.matmul(&k.t()?)?;
        let scores = match mask {
            Some(mask) => scores.broadcast_add(mask)?,
            None => scores,
        };
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let out = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, tgt_len, self.num_heads * self.head_dim))?;
        self.out_proj.forward(&out)
    }
}

struct FeedForward {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
}

impl FeedForward {
    fn new(embed_dim: usize, ffn_dim: usize, activation: Activation, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: linear(embed_dim, ffn_dim, vb.pp("fc1"))?,
            fc2: linear(ffn_dim, embed_dim, vb.pp("fc2"))?,
            activation,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.fc1.forward(x)?;
        let x = match self.activation {
            Activation::Gelu => x.gelu_erf()?,
            Activation::Relu => x.relu()?,
        };
        self.fc2.forward(&x)
    }
}

/// Runs `f` as a residual block with pre- or post-layer-norm.
fn residual<F>(x: &Tensor, norm: &LayerNorm, normalize_before: bool, f: F) -> Result<Tensor>
where
    F: FnOnce(&Tensor) -> Result<Tensor>,
{
    if normalize_before {
        x + f(&norm.forward(x)?)?
    } else {
        norm.forward(&(x + f(x)?)?)
    }
}

pub struct EncoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
    normalize_before: bool,
}

impl EncoderLayer {
    pub fn new(
        embed_dim: usize,
        ffn_dim: usize,
        num_heads: usize,
        activation: Activation,
        normalize_before: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            self_attn: Attention::new(embed_dim, num_heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            ffn: FeedForward::new(embed_dim, ffn_dim, activation, &vb)?,
            final_layer_norm: layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
            normalize_before,
        })
    }

    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let x = residual(x, &self.self_attn_layer_norm, self.normalize_before, |h| {
            self.self_attn.forward(h, h, mask)
        })?;
        residual(&x, &self.final_layer_norm, self.normalize_before, |h| {
            self.ffn.forward(h)
        })
    }
}

pub struct DecoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    encoder_attn: Attention,
    encoder_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
    normalize_before: bool,
}

impl DecoderLayer {
    pub fn new(
        embed_dim: usize,
        ffn_dim: usize,
        num_heads: usize,
        activation: Activation,
        normalize_before: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            self_attn: Attention::new(embed_dim, num_heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            encoder_attn: Attention::new(embed_dim, num_heads, vb.pp("encoder_attn"))?,
            encoder_attn_layer_norm: layer_norm(
                embed_dim,
                LAYER_NORM_EPS,
                vb.pp("encoder_attn_layer_norm"),
            )?,
            ffn: FeedForward::new(embed_dim, ffn_dim, activation, &vb)?,
            final_layer_norm: layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
            normalize_before,
        })
    }

    pub fn forward(
        &self,
        x: &Tensor,
        memory: &Tensor,
        causal_mask: Option<&Tensor>,
        memory_mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        let x = residual(x, &self.self_attn_layer_norm, self.normalize_before, |h| {
            self.self_attn.forward(h, h, causal_mask)
        })?;
        let x = residual(&x, &self.encoder_attn_layer_norm, self.normalize_before, |h| {
            self.encoder_attn.forward(h, memory, memory_mask)
        })?;
        residual(&x, &self.final_layer_norm, self.normalize_before, |h| {
            self.ffn.forward(h)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_ids_skip_left_padding() {
        let mask = vec![vec![0, 0, 1, 1], vec![1, 1, 1, 1]];
        assert_eq!(position_ids(&mask, 1, 0), vec![1, 1, 2, 3, 2, 3, 4, 5]);
        assert_eq!(position_ids(&[vec![1, 1]], 1, 3), vec![5, 6]);
    }

    #[test]
    fn sinusoidal_table_zeroes_padding_row() {
        let table = sinusoidal_table(6, 4, 1, DType::F32, &Device::Cpu).unwrap();
        let rows = table.to_vec2::<f32>().unwrap();
        assert_eq!(rows[1], vec![0.0; 4]);
        // position 0: sin(0) = 0, cos(0) = 1
        assert_eq!(rows[0], vec![0.0, 0.0, 1.0, 1.0]);
        assert!((rows[2][0] - 2f32.sin()).abs() < 1e-6);
    }

    #[test]
    fn attention_preserves_shape() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let attn = Attention::new(8, 2, vb).unwrap();
        let q = Tensor::ones((3, 4, 8), DType::F32, &Device::Cpu).unwrap();
        let kv = Tensor::ones((3, 6, 8), DType::F32, &Device::Cpu).unwrap();
        let out = attn.forward(&q, &kv, None).unwrap();
        assert_eq!(out.dims(), &[3, 4, 8]);
    }
}
