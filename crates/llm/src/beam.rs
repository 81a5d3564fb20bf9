//! Deterministic beam search over an arbitrary decoder step function
//!
//! Sequence lengths count the decoder start token, so `max_length` bounds the
//! full decoder sequence and `min_length` forbids EOS until that many tokens
//! exist. Finished hypotheses are scored `sum_logprobs / len^length_penalty`.

use std::cmp::Ordering;

use condense_common::{CondenseError, EngineOperation, GenerationParameters, Result};

/// A running hypothesis
#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
}

/// A completed hypothesis
#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
    /// Ended by EOS rather than by the length limit
    ended: bool,
}

/// Best-N finished hypotheses
#[derive(Debug)]
struct Hypotheses {
    capacity: usize,
    length_penalty: f32,
    early_stopping: bool,
    items: Vec<Hypothesis>,
}

impl Hypotheses {
    fn new(params: &GenerationParameters) -> Self {
        Self {
            capacity: params.num_beams,
            length_penalty: params.length_penalty,
            early_stopping: params.early_stopping,
            items: Vec::with_capacity(params.num_beams + 1),
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn normalize(&self, sum_logprobs: f32, len: usize) -> f32 {
        sum_logprobs / (len as f32).powf(self.length_penalty)
    }

    fn worst_score(&self) -> f32 {
        self.items
            .iter()
            .map(|h| h.score)
            .fold(f32::INFINITY, f32::min)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32, ended: bool) {
        let score = self.normalize(sum_logprobs, tokens.len());
        if self.items.len() < self.capacity || score > self.worst_score() {
            self.items.push(Hypothesis {
                tokens,
                score,
                ended,
            });

            if self.items.len() > self.capacity {
                // Drop the first worst entry
                let worst = self
                    .items
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.score.partial_cmp(&b.1.score).unwrap_or(Ordering::Equal))
                    .map(|(i, _)| i);
                if let Some(i) = worst {
                    self.items.remove(i);
                }
            }
        }
    }

    /// Whether no running beam can improve the finished set
    fn is_done(&self, best_running: f32, cur_len: usize) -> bool {
        if self.len() < self.capacity {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        self.worst_score() >= self.normalize(best_running, cur_len)
    }

    fn into_best(self) -> Option<Hypothesis> {
        // First maximum wins on ties
        self.items.into_iter().fold(None, |best: Option<Hypothesis>, h| match best {
            Some(b) if b.score >= h.score => Some(b),
            _ => Some(h),
        })
    }
}

/// Tokens that would complete an n-gram already present in `tokens`
fn banned_ngram_tokens(tokens: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || tokens.len() + 1 < n {
        return Vec::new();
    }
    if n == 1 {
        return tokens.to_vec();
    }

    let prefix = &tokens[tokens.len() - (n - 1)..];
    tokens
        .windows(n)
        .filter(|w| &w[..n - 1] == prefix)
        .map(|w| w[n - 1])
        .collect()
}

/// Indices of the `k` largest finite scores, best first, ties by lower index
fn top_k(scores: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut ranked: Vec<(u32, f32)> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .map(|(i, &s)| (i as u32, s))
        .collect();

    let by_score = |a: &(u32, f32), b: &(u32, f32)| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    };

    if ranked.len() > k && k > 0 {
        ranked.select_nth_unstable_by(k - 1, by_score);
        ranked.truncate(k);
    }
    ranked.sort_by(by_score);
    ranked.truncate(k);
    ranked
}

/// Run beam search
///
/// `step` receives the running decoder sequences (all of equal length, each
/// starting with `start_token`) and must return one row of log-probabilities
/// over the vocabulary per sequence. Returns the best sequence including the
/// start token, and the EOS token when the hypothesis ended with one.
pub fn beam_search<F>(
    params: &GenerationParameters,
    start_token: u32,
    eos_token: u32,
    mut step: F,
) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    params.validate()?;

    let num_beams = params.num_beams;
    let mut finished = Hypotheses::new(params);
    let mut beams = vec![Beam {
        tokens: vec![start_token],
        score: 0.0,
    }];

    loop {
        let cur_len = beams[0].tokens.len();
        if cur_len >= params.max_length {
            break;
        }

        let sequences: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let rows = step(&sequences)?;
        if rows.len() != beams.len() {
            return Err(CondenseError::engine(
                EngineOperation::Generate,
                anyhow::anyhow!(
                    "decoder returned {} rows for {} beams",
                    rows.len(),
                    beams.len()
                ),
            ));
        }

        let mut candidates: Vec<(f32, usize, u32)> = Vec::with_capacity(beams.len() * 2 * num_beams);
        for (b, (beam, mut row)) in beams.iter().zip(rows).enumerate() {
            if cur_len < params.min_length {
                if let Some(p) = row.get_mut(eos_token as usize) {
                    *p = f32::NEG_INFINITY;
                }
            }
            for token in banned_ngram_tokens(&beam.tokens, params.no_repeat_ngram_size) {
                if let Some(p) = row.get_mut(token as usize) {
                    *p = f32::NEG_INFINITY;
                }
            }

            for (token, logprob) in top_k(&row, 2 * num_beams) {
                candidates.push((beam.score + logprob, b, token));
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
        candidates.truncate(2 * num_beams);

        let mut next = Vec::with_capacity(num_beams);
        for (rank, &(score, b, token)) in candidates.iter().enumerate() {
            if token == eos_token {
                // EOS outside the top beam slots never finishes a hypothesis
                if rank < num_beams {
                    finished.add(beams[b].tokens.clone(), score, true);
                }
            } else {
                let mut tokens = beams[b].tokens.clone();
                tokens.push(token);
                next.push(Beam { tokens, score });
            }

            if next.len() == num_beams {
                break;
            }
        }

        if next.is_empty() {
            beams.clear();
            break;
        }
        beams = next;

        let best_running = beams[0].score;
        if finished.is_done(best_running, cur_len + 1) {
            beams.clear();
            break;
        }
    }

    // Beams still running hit the length limit
    for beam in beams {
        finished.add(beam.tokens, beam.score, false);
    }

    let best = match finished.into_best() {
        Some(best) => best,
        None => return Ok(vec![start_token]),
    };

    let mut tokens = best.tokens;
    if best.ended {
        tokens.push(eos_token);
    }
    Ok(tokens)
}
