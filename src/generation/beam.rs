use std::cmp::Ordering;

use super::{GenerationConfig, StepScorer};

/// A finished (or length-capped) output sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Generated tokens, without the decoder start token or the final EOS.
    pub tokens: Vec<u32>,
    /// Length-normalized log-probability.
    pub score: f32,
}

struct Beam {
    tokens: Vec<u32>,
    sum_logprobs: f32,
}

struct Candidate {
    beam: usize,
    token: u32,
    sum_logprobs: f32,
}

/// Best `num_beams` hypotheses seen so far, worst evicted first.
struct FinishedHypotheses {
    capacity: usize,
    length_penalty: f32,
    items: Vec<Hypothesis>,
}

impl FinishedHypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn normalize(&self, sum_logprobs: f32, generated_len: usize) -> f32 {
        sum_logprobs / (generated_len.max(1) as f32).powf(self.length_penalty)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32, generated_len: usize) {
        let score = self.normalize(sum_logprobs, generated_len);
        if self.items.len() >= self.capacity && score <= self.worst_score() {
            return;
        }
        self.items.push(Hypothesis { tokens, score });
        if self.items.len() > self.capacity {
            if let Some(worst) = self
                .items
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
                .map(|(i, _)| i)
            {
                self.items.swap_remove(worst);
            }
        }
    }

    fn worst_score(&self) -> f32 {
        self.items
            .iter()
            .map(|h| h.score)
            .min_by(f32::total_cmp)
            .unwrap_or(f32::NEG_INFINITY)
    }

    fn is_done(&self, best_live_sum: f32, generated_len: usize, early_stopping: bool) -> bool {
        if self.items.len() < self.capacity {
            return false;
        }
        if early_stopping {
            return true;
        }
        self.worst_score() >= self.normalize(best_live_sum, generated_len)
    }

    fn into_sorted(mut self) -> Vec<Hypothesis> {
        self.items.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.items
    }
}

/// Indices of the `k` largest entries of `row`, in no particular order.
fn top_k(row: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..row.len()).collect();
    if k < indices.len() {
        indices.select_nth_unstable_by(k, |&a, &b| row[b].total_cmp(&row[a]));
        indices.truncate(k);
    }
    indices
}

/// Beam search for a single source sentence.
///
/// Returns up to `num_return_sequences` hypotheses, best first.
pub fn beam_search<S: StepScorer>(
    scorer: &mut S,
    start_token: u32,
    eos_token: u32,
    config: &GenerationConfig,
) -> Result<Vec<Hypothesis>, S::Error> {
    let num_beams = config.num_beams.max(1);
    let mut finished = FinishedHypotheses::new(num_beams, config.length_penalty);
    let mut live = vec![Beam {
        tokens: vec![start_token],
        sum_logprobs: 0.0,
    }];

    while let Some(cur_len) = live.first().map(|b| b.tokens.len()) {
        if cur_len >= config.max_length {
            break;
        }

        let prefixes: Vec<Vec<u32>> = live.iter().map(|b| b.tokens.clone()).collect();
        let mut rows = scorer.log_probs(&prefixes)?;

        if cur_len < config.min_length {
            for row in rows.iter_mut() {
                if let Some(p) = row.get_mut(eos_token as usize) {
                    *p = f32::NEG_INFINITY;
                }
            }
        }

        let mut candidates: Vec<Candidate> = Vec::with_capacity(live.len() * 2 * num_beams);
        for (beam_idx, (beam, row)) in live.iter().zip(rows.iter()).enumerate() {
            for token in top_k(row, 2 * num_beams) {
                let logprob = row[token];
                if logprob == f32::NEG_INFINITY {
                    continue;
                }
                candidates.push(Candidate {
                    beam: beam_idx,
                    token: token as u32,
                    sum_logprobs: beam.sum_logprobs + logprob,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.sum_logprobs
                .partial_cmp(&a.sum_logprobs)
                .unwrap_or(Ordering::Equal)
        });

        // Bound for stopping: the best continuation this step, EOS included.
        let best_candidate = candidates.first().map(|c| c.sum_logprobs);

        let mut next = Vec::with_capacity(num_beams);
        for (rank, cand) in candidates.into_iter().enumerate() {
            let parent = &live[cand.beam];
            if cand.token == eos_token {
                // EOS below the first num_beams candidates cannot displace a live beam.
                if rank < num_beams {
                    let generated = parent.tokens[1..].to_vec();
                    let len = generated.len() + 1;
                    finished.add(generated, cand.sum_logprobs, len);
                }
                continue;
            }
            let mut tokens = parent.tokens.clone();
            tokens.push(cand.token);
            next.push(Beam {
                tokens,
                sum_logprobs: cand.sum_logprobs,
            });
            if next.len() == num_beams {
                break;
            }
        }

        let done = match best_candidate {
            Some(best) if !next.is_empty() => {
                finished.is_done(best, cur_len, config.early_stopping)
            }
            _ => true,
        };
        live = next;
        if done {
            break;
        }
    }

    // Beams cut off by max_length still compete with finished ones.
    // Length counts the start token, as for EOS-finished hypotheses.
    for beam in live {
        let len = beam.tokens.len();
        let generated = beam.tokens[1..].to_vec();
        finished.add(generated, beam.sum_logprobs, len);
    }

    let mut hypotheses = finished.into_sorted();
    hypotheses.truncate(config.num_return_sequences.max(1));
    Ok(hypotheses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u32 = 0;
    const EOS: u32 = 1;

    /// Next-token distribution depends only on the last token of the prefix.
    struct ScriptedScorer {
        table: fn(u32) -> [f32; 5],
        calls: usize,
    }

    impl StepScorer for ScriptedScorer {
        type Error = String;

        fn log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, String> {
            self.calls += 1;
            Ok(prefixes
                .iter()
                .map(|p| {
                    let last = *p.last().unwrap();
                    (self.table)(last).iter().map(|x| x.ln()).collect()
                })
                .collect())
        }
    }

    fn garden_path(last: u32) -> [f32; 5] {
        // tokens: 0 start, 1 eos, 2/3/4 words
        match last {
            START => [1e-6, 0.1, 0.5, 0.4, 1e-6],
            2 => [1e-6, 0.35, 1e-6, 0.33, 0.32],
            3 => [1e-6, 0.95, 0.02, 1e-6, 0.03],
            _ => [1e-6, 0.9, 0.05, 0.025, 0.025],
        }
    }

    fn never_ends(_last: u32) -> [f32; 5] {
        [1e-6, 1e-6, 0.7, 0.2, 0.1]
    }

    fn always_ends(_last: u32) -> [f32; 5] {
        [1e-6, 0.9, 0.05, 0.03, 0.02]
    }

    fn config(num_beams: usize) -> GenerationConfig {
        GenerationConfig {
            num_beams,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn single_beam_is_greedy() {
        let mut scorer = ScriptedScorer { table: garden_path, calls: 0 };
        let out = beam_search(&mut scorer, START, EOS, &config(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tokens, vec![2]);
    }

    #[test]
    fn wider_beam_finds_better_sequence() {
        let mut scorer = ScriptedScorer { table: garden_path, calls: 0 };
        let out = beam_search(&mut scorer, START, EOS, &config(2)).unwrap();
        assert_eq!(out[0].tokens, vec![3]);
        let expected = (0.4f32.ln() + 0.95f32.ln()) / 2.0;
        assert!((out[0].score - expected).abs() < 1e-5);
        // [2] ends with EOS at step two, but [2, 3] + EOS could still
        // outscore it, so one more step runs.
        assert_eq!(scorer.calls, 3);
    }

    #[test]
    fn stops_at_max_length() {
        let mut scorer = ScriptedScorer { table: never_ends, calls: 0 };
        let cfg = GenerationConfig {
            max_length: 4,
            ..config(5)
        };
        let out = beam_search(&mut scorer, START, EOS, &cfg).unwrap();
        assert_eq!(out[0].tokens, vec![2, 2, 2]);
        assert_eq!(scorer.calls, 3);
        // normalized over start + three tokens, like an EOS-finished hypothesis
        let expected = 3.0 * 0.7f32.ln() / 4.0;
        assert!((out[0].score - expected).abs() < 1e-5);
    }

    #[test]
    fn min_length_suppresses_early_eos() {
        let mut scorer = ScriptedScorer { table: always_ends, calls: 0 };
        let cfg = GenerationConfig {
            min_length: 3,
            ..config(5)
        };
        let out = beam_search(&mut scorer, START, EOS, &cfg).unwrap();
        assert_eq!(out[0].tokens.len(), 2);
    }

    #[test]
    fn returns_requested_number_of_sequences_best_first() {
        let mut scorer = ScriptedScorer { table: garden_path, calls: 0 };
        let cfg = GenerationConfig {
            num_return_sequences: 2,
            ..config(2)
        };
        let out = beam_search(&mut scorer, START, EOS, &cfg).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].score >= out[1].score);
        assert_eq!(out[0].tokens, vec![3]);
        assert_eq!(out[1].tokens, vec![2, 3]);
    }

    #[test]
    fn scorer_errors_propagate() {
        struct Failing;
        impl StepScorer for Failing {
            type Error = &'static str;
            fn log_probs(&mut self, _: &[Vec<u32>]) -> Result<Vec<Vec<f32>>, &'static str> {
                Err("device lost")
            }
        }
        let err = beam_search(&mut Failing, START, EOS, &config(5)).unwrap_err();
        assert_eq!(err, "device lost");
    }

    #[test]
    fn top_k_picks_largest() {
        let mut picked = top_k(&[0.1, 0.9, 0.3, 0.7], 2);
        picked.sort();
        assert_eq!(picked, vec![1, 3]);
        assert_eq!(top_k(&[0.5], 4), vec![0]);
    }
}
