//! Read-distribution model: the probability of observing a fragment at a given
//! transcript position.
//!
//! The pipeline only talks to the model through [`ReadModel`]. [`ReadDistribution`]
//! is the uniform model shipped with the binary: fragments start uniformly along
//! the transcript, their length follows a log-normal distribution, and the read
//! sequence contributes a mismatch-based likelihood.

use crate::fragment::Fragment;
use anyhow::{Context, Result};
use statrs::distribution::{Continuous, ContinuousCDF, LogNormal};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default number of mismatches an alignment from the noise source is assumed to carry.
pub const DEFAULT_NOISE_MISMATCHES: u32 = 6;

/// Fewer observed proper pairs than this and no length model is fitted.
const MIN_FRAGMENTS: u64 = 10;
const MIN_SIGMA: f64 = 1e-2;
const DEFAULT_PHRED: f64 = 30.0;

/// Log-scale probability of one alignment and its noise floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentProbability {
    pub prob: f64,
    pub noise: f64,
}

/// Capability the pipeline needs from a read-distribution model.
pub trait ReadModel {
    /// Training observation: a read with exactly one mapped alignment.
    fn observe(&mut self, fragment: &Fragment);

    /// Called once between the two passes.
    fn normalize(&mut self);

    /// `None` when the alignment cannot be scored.
    fn probability(&mut self, fragment: &Fragment) -> Option<AlignmentProbability>;

    /// Per-transcript effective lengths, in transcript index order.
    fn effective_lengths(&self) -> Vec<f64>;

    fn write_warnings(&self) {}

    fn write_distribution(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Fixed log-normal fragment length parameters `(mu, sigma^2)`.
    pub fragment_length: Option<(f64, f64)>,
    pub noise_mismatches: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            fragment_length: None,
            noise_mismatches: DEFAULT_NOISE_MISMATCHES,
        }
    }
}

#[derive(Debug, Clone)]
struct LengthModel {
    mu: f64,
    sigma: f64,
    dist: LogNormal,
}

impl LengthModel {
    fn new(mu: f64, sigma2: f64) -> Result<Self> {
        let sigma = sigma2.max(0.0).sqrt().max(MIN_SIGMA);
        let dist = LogNormal::new(mu, sigma)
            .with_context(|| format!("invalid fragment length distribution (mu {mu}, sigma^2 {sigma2})"))?;
        Ok(Self { mu, sigma, dist })
    }

    /// Log density of `len`, truncated to fragments that fit on a transcript of `tr_len`.
    fn ln_prob(&self, len: u64, tr_len: u64) -> Option<f64> {
        let norm = self.dist.cdf(tr_len as f64);
        if norm <= 0.0 {
            return None;
        }
        Some(self.dist.ln_pdf(len as f64) - norm.ln())
    }

    fn truncated_mean(&self, tr_len: u64) -> Option<f64> {
        let cutoff = (self.mu + 6.0 * self.sigma).exp().ceil() as u64;
        let (mut weight, mut total) = (0.0, 0.0);
        for len in 1..=tr_len.min(cutoff.max(1)) {
            let p = self.dist.pdf(len as f64);
            weight += p;
            total += p * len as f64;
        }
        (weight > 0.0).then(|| total / weight)
    }
}

#[derive(Debug, Default, Clone)]
struct Warnings {
    no_reference: u64,
    unknown_transcript: u64,
    mates_apart: u64,
    no_position: u64,
    too_long: u64,
}

/// Uniform read distribution with a log-normal fragment length model.
#[derive(Debug, Clone)]
pub struct ReadDistribution {
    tr_lengths: Vec<u64>,
    noise_mismatches: u32,
    fixed_length: bool,
    length_model: Option<LengthModel>,
    fragments_observed: u64,
    log_len_sum: f64,
    log_len_sq_sum: f64,
    reads_observed: u64,
    read_len_sum: u64,
    warnings: Warnings,
}

impl ReadDistribution {
    pub fn new(tr_lengths: Vec<u64>, config: &ModelConfig) -> Result<Self> {
        let length_model = config
            .fragment_length
            .map(|(mu, sigma2)| LengthModel::new(mu, sigma2))
            .transpose()?;
        Ok(Self {
            tr_lengths,
            noise_mismatches: config.noise_mismatches,
            fixed_length: length_model.is_some(),
            length_model,
            fragments_observed: 0,
            log_len_sum: 0.0,
            log_len_sq_sum: 0.0,
            reads_observed: 0,
            read_len_sum: 0,
            warnings: Warnings::default(),
        })
    }

    /// Whether `observe` still has anything to learn.
    pub fn needs_training(&self) -> bool {
        !self.fixed_length
    }

    pub fn fragment_length_params(&self) -> Option<(f64, f64)> {
        self.length_model.as_ref().map(|m| (m.mu, m.sigma * m.sigma))
    }

    fn mean_read_len(&self) -> f64 {
        if self.reads_observed == 0 {
            0.0
        } else {
            self.read_len_sum as f64 / self.reads_observed as f64
        }
    }
}

/// Length of the transcript region covered by the fragment.
pub fn fragment_span(fragment: &Fragment) -> Option<u64> {
    let first = &fragment.first;
    let (mut start, mut end) = (first.start?, first.end?);
    if let Some(second) = fragment.second_mate() {
        start = start.min(second.start?);
        end = end.max(second.end?);
    }
    Some(u64::from(end.saturating_sub(start)) + 1)
}

/// Log probability of a read of `len` bases carrying `mismatches` sequencing errors.
pub fn sequence_ln_prob(len: usize, mismatches: u32, mean_phred: Option<f64>) -> f64 {
    let phred = mean_phred.unwrap_or(DEFAULT_PHRED);
    let err = 10f64.powf(-phred / 10.0).clamp(1e-6, 0.75);
    let m = (mismatches as usize).min(len) as f64;
    (len as f64 - m) * (1.0 - err).ln() + m * (err / 3.0).ln()
}

impl ReadModel for ReadDistribution {
    fn observe(&mut self, fragment: &Fragment) {
        self.reads_observed += 1;
        self.read_len_sum += fragment.first.read_len as u64;
        if self.fixed_length {
            return;
        }
        let Some(second) = fragment.second_mate() else {
            return;
        };
        if second.ref_id != fragment.first.ref_id {
            return;
        }
        if let Some(span) = fragment_span(fragment) {
            let log_len = (span as f64).ln();
            self.fragments_observed += 1;
            self.log_len_sum += log_len;
            self.log_len_sq_sum += log_len * log_len;
        }
    }

    fn normalize(&mut self) {
        if self.fixed_length {
            return;
        }
        if self.fragments_observed < MIN_FRAGMENTS {
            if self.fragments_observed > 0 {
                tracing::warn!(
                    observed = self.fragments_observed,
                    "too few uniquely aligned pairs to estimate the fragment length distribution"
                );
            }
            self.length_model = None;
            return;
        }
        let n = self.fragments_observed as f64;
        let mu = self.log_len_sum / n;
        let sigma2 = (self.log_len_sq_sum / n - mu * mu).max(0.0);
        match LengthModel::new(mu, sigma2) {
            Ok(model) => {
                tracing::info!(mu, sigma2, fragments = self.fragments_observed, "estimated fragment length distribution");
                self.length_model = Some(model);
            }
            Err(e) => {
                tracing::warn!(error = %e, "fragment length distribution not used");
                self.length_model = None;
            }
        }
    }

    fn probability(&mut self, fragment: &Fragment) -> Option<AlignmentProbability> {
        let first = &fragment.first;
        let Some(tid) = first.ref_id else {
            self.warnings.no_reference += 1;
            return None;
        };
        let Some(&tr_len) = self.tr_lengths.get(tid) else {
            self.warnings.unknown_transcript += 1;
            return None;
        };
        let second = fragment.second_mate();
        if second.is_some_and(|s| s.ref_id != Some(tid)) {
            self.warnings.mates_apart += 1;
            return None;
        }
        let Some(span) = fragment_span(fragment) else {
            self.warnings.no_position += 1;
            return None;
        };
        if span > tr_len {
            self.warnings.too_long += 1;
            return None;
        }

        let mut position = -((tr_len - span + 1) as f64).ln();
        if let (Some(model), true) = (&self.length_model, fragment.paired) {
            match model.ln_prob(span, tr_len) {
                Some(p) => position += p,
                None => {
                    self.warnings.too_long += 1;
                    return None;
                }
            }
        }

        let mut seq = sequence_ln_prob(first.read_len, first.mismatches.unwrap_or(0), first.mean_quality);
        let mut bases = first.read_len;
        if let Some(second) = second {
            seq += sequence_ln_prob(second.read_len, second.mismatches.unwrap_or(0), second.mean_quality);
            bases += second.read_len;
        }
        let noise = sequence_ln_prob(bases, self.noise_mismatches, first.mean_quality);

        Some(AlignmentProbability {
            prob: position + seq,
            noise: position + noise,
        })
    }

    fn effective_lengths(&self) -> Vec<f64> {
        let mean_read_len = self.mean_read_len();
        self.tr_lengths
            .iter()
            .map(|&len| {
                let mean = match &self.length_model {
                    Some(model) => model.truncated_mean(len).unwrap_or(len as f64),
                    None => mean_read_len,
                };
                (len as f64 - mean + 1.0).max(1.0)
            })
            .collect()
    }

    fn write_warnings(&self) {
        let w = &self.warnings;
        if w.no_reference > 0 {
            tracing::warn!(count = w.no_reference, "alignments without a reference sequence");
        }
        if w.unknown_transcript > 0 {
            tracing::warn!(count = w.unknown_transcript, "alignments to transcripts missing from the transcript table");
        }
        if w.mates_apart > 0 {
            tracing::warn!(count = w.mates_apart, "pairs with mates aligned to different transcripts");
        }
        if w.no_position > 0 {
            tracing::warn!(count = w.no_position, "alignments without a position");
        }
        if w.too_long > 0 {
            tracing::warn!(count = w.too_long, "fragments longer than their transcript");
        }
    }

    fn write_distribution(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create distribution file {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "# read distribution: uniform")?;
        writeln!(out, "# fragment length: log-normal (mu, sigma^2 on log scale)")?;
        match self.fragment_length_params() {
            Some((mu, sigma2)) => {
                writeln!(out, "mu {mu:.9e}")?;
                writeln!(out, "sigma2 {sigma2:.9e}")?;
            }
            None => writeln!(out, "# no fragment length model")?,
        }
        writeln!(out, "fixed {}", u8::from(self.fixed_length))?;
        writeln!(out, "fragments_observed {}", self.fragments_observed)?;
        writeln!(out, "reads_observed {}", self.reads_observed)?;
        writeln!(out, "mean_read_length {:.3}", self.mean_read_len())?;
        out.flush()?;
        Ok(())
    }
}
