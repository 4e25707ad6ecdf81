//! Per-phase FIR models and the shared phase-bucket rule.
//!
//! Fitting, prediction and calibration all assign a sample to its bucket
//! through [`phase_bucket`]; nothing else in the crate computes the modulo.

use serde::{Deserialize, Serialize};

use crate::design::{clamp_index, DesignMatrix};
use crate::error::{TapperError, TapperResult};
use crate::ridge::{ridge_solve, LinearFit};

pub const CHANNELS: usize = 3;

/// Bucket of sample `n` under a given phase bias.
#[inline]
pub fn phase_bucket(n: usize, phase_bias: usize, phases: usize) -> usize {
    (n + phase_bias) % phases
}

/// Sample indices of each bucket, ascending within a bucket.
pub fn bucket_indices(len: usize, phase_bias: usize, phases: usize) -> Vec<Vec<usize>> {
    let mut buckets = vec![Vec::with_capacity(len / phases.max(1) + 1); phases];
    for n in 0..len {
        buckets[phase_bucket(n, phase_bias, phases)].push(n);
    }
    buckets
}

/// One linear model per (phase, channel), all sharing a tap count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseFits {
    pub taps: usize,
    pub phase_bias: usize,
    /// Indexed `[phase][channel]`.
    pub models: Vec<[LinearFit; CHANNELS]>,
}

impl PhaseFits {
    pub fn phases(&self) -> usize {
        self.models.len()
    }

    /// Predict one color from a design row using the model of bucket `phase`.
    #[inline]
    pub fn predict_row(&self, phase: usize, row: &[f64]) -> [f64; CHANNELS] {
        let models = &self.models[phase];
        [
            models[0].predict(row),
            models[1].predict(row),
            models[2].predict(row),
        ]
    }

    /// `phases × taps` weight table for one channel.
    pub fn weight_table(&self, channel: usize) -> Vec<Vec<f64>> {
        self.models
            .iter()
            .map(|m| m[channel].weights.clone())
            .collect()
    }

    pub fn bias_vector(&self, channel: usize) -> Vec<f64> {
        self.models.iter().map(|m| m[channel].bias).collect()
    }
}

/// Fit an independent ridge model for every bucket and channel.
pub fn fit_per_phase(
    design: &DesignMatrix,
    targets: &[[f64; CHANNELS]],
    phases: usize,
    phase_bias: usize,
    lambda: f64,
) -> TapperResult<PhaseFits> {
    let buckets = bucket_indices(design.rows(), phase_bias, phases);
    let mut models = Vec::with_capacity(phases);

    for (phase, idx) in buckets.iter().enumerate() {
        let rows: Vec<&[f64]> = idx.iter().map(|&n| design.row(n)).collect();
        let fit_channel = |channel: usize| -> TapperResult<LinearFit> {
            let y: Vec<f64> = idx.iter().map(|&n| targets[n][channel]).collect();
            ridge_solve(&rows, &y, lambda).ok_or(TapperError::Numeric { phase, channel })
        };
        models.push([fit_channel(0)?, fit_channel(1)?, fit_channel(2)?]);
    }

    Ok(PhaseFits {
        taps: design.taps(),
        phase_bias,
        models,
    })
}

/// Predict every sample. Output `n` reads the design row at
/// `clamp(n + x_shift)` but keeps the model of `n`'s own bucket.
pub fn predict(design: &DesignMatrix, fits: &PhaseFits, x_shift: i64) -> Vec<[f64; CHANNELS]> {
    let len = design.rows();
    let phases = fits.phases();
    (0..len)
        .map(|n| {
            let nn = clamp_index(n as isize + x_shift as isize, len);
            let phase = phase_bucket(n, fits.phase_bias, phases);
            fits.predict_row(phase, design.row(nn))
        })
        .collect()
}

/// Mean squared error over all samples and channels.
pub fn mse(pred: &[[f64; CHANNELS]], target: &[[f64; CHANNELS]]) -> f64 {
    let count = pred.len() * CHANNELS;
    if count == 0 {
        return 0.0;
    }
    let total: f64 = pred
        .iter()
        .zip(target.iter())
        .map(|(p, t)| {
            (0..CHANNELS)
                .map(|c| {
                    let d = p[c] - t[c];
                    d * d
                })
                .sum::<f64>()
        })
        .sum();
    total / count as f64
}
