//! Masked mean pooling over per-token hidden states, and L2 normalization.
//!
//! The token positions are split into contiguous chunks of `ceil(seq_len / parallelism)`
//! positions. Each chunk is reduced on the rayon pool into a [`PartialSum`]; partials are then
//! merged in chunk order so the result does not depend on scheduling.

use rayon::prelude::*;

/// Per-dimension running sum over mask==1 positions, and how many positions contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSum {
    pub sum: Vec<f32>,
    pub valid_tokens: usize,
}

impl PartialSum {
    pub fn zeros(hidden_size: usize) -> Self {
        Self {
            sum: vec![0.0; hidden_size],
            valid_tokens: 0,
        }
    }

    pub fn merge(mut self, other: &PartialSum) -> Self {
        for (acc, v) in self.sum.iter_mut().zip(&other.sum) {
            *acc += v;
        }
        self.valid_tokens += other.valid_tokens;
        self
    }

    /// Mean over the contributing positions; `None` when no position contributed.
    pub fn mean(self) -> Option<Vec<f32>> {
        if self.valid_tokens == 0 {
            return None;
        }
        let n = self.valid_tokens as f32;
        Some(self.sum.into_iter().map(|v| v / n).collect())
    }
}

pub fn chunk_size(seq_len: usize, parallelism: usize) -> usize {
    seq_len.div_ceil(parallelism.max(1)).max(1)
}

fn accumulate(mask: &[i64], hidden: &[f32], hidden_size: usize) -> PartialSum {
    let mut partial = PartialSum::zeros(hidden_size);
    for (&m, row) in mask.iter().zip(hidden.chunks_exact(hidden_size)) {
        if m != 1 {
            continue;
        }
        partial.valid_tokens += 1;
        for (acc, v) in partial.sum.iter_mut().zip(row) {
            *acc += v;
        }
    }
    partial
}

/// Sum the hidden rows whose mask is 1.
///
/// `hidden` is row-major `[seq_len, hidden_size]` with `seq_len == mask.len()`; callers validate
/// the shape before pooling.
pub fn masked_sum(
    hidden: &[f32],
    mask: &[i64],
    hidden_size: usize,
    parallelism: usize,
) -> PartialSum {
    if hidden_size == 0 || mask.is_empty() {
        return PartialSum::zeros(hidden_size);
    }
    debug_assert_eq!(hidden.len(), mask.len() * hidden_size);

    let chunk = chunk_size(mask.len(), parallelism);
    let partials: Vec<PartialSum> = mask
        .par_chunks(chunk)
        .zip(hidden.par_chunks(chunk * hidden_size))
        .map(|(m, h)| accumulate(m, h, hidden_size))
        .collect();

    partials
        .iter()
        .fold(PartialSum::zeros(hidden_size), PartialSum::merge)
}

/// Scale to unit Euclidean norm; `None` when the norm is zero or not finite.
pub fn l2_normalize(v: Vec<f32>) -> Option<Vec<f32>> {
    let norm = v
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.into_iter().map(|x| (f64::from(x) / norm) as f32).collect())
}
