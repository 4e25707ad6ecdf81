//! Black/white reference levels and per-phase gain.

use serde::{Deserialize, Serialize};

use crate::design::DesignMatrix;
use crate::error::TapperResult;
use crate::phase::{phase_bucket, PhaseFits, CHANNELS};
use crate::waveform::WaveSource;

/// Denominators smaller than this are treated as degenerate.
pub const GAIN_EPSILON: f64 = 1e-6;

/// Per-phase mean predicted color, indexed `[phase][channel]`.
pub type PhaseLevels = Vec<[f64; CHANNELS]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseGain {
    pub gain: PhaseLevels,
    /// `true` where |white - black| was below [`GAIN_EPSILON`] and 1.0 was used.
    pub degenerate: Vec<[bool; CHANNELS]>,
}

impl PhaseGain {
    pub fn degenerate_count(&self) -> usize {
        self.degenerate
            .iter()
            .flat_map(|d| d.iter())
            .filter(|&&d| d)
            .count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub black: Option<PhaseLevels>,
    pub white: Option<PhaseLevels>,
    pub gain: Option<PhaseGain>,
}

/// Indices of the first all-zero and first all-0x7F pattern bands.
pub fn find_reference_bands(sources: &[WaveSource]) -> (Option<usize>, Option<usize>) {
    let black = sources.iter().position(WaveSource::is_black_reference);
    let white = sources.iter().position(WaveSource::is_white_reference);
    (black, white)
}

/// Mean prediction of every bucket over a reference waveform.
///
/// The window is built from the reference band alone, with no shift applied.
pub fn phase_levels(wave: &[f64], fits: &PhaseFits) -> TapperResult<PhaseLevels> {
    let design = DesignMatrix::build(wave, fits.taps)?;
    let phases = fits.phases();

    let (sums, counts) = (0..design.rows()).fold(
        (vec![[0.0f64; CHANNELS]; phases], vec![0usize; phases]),
        |(mut sums, mut counts), n| {
            let ph = phase_bucket(n, fits.phase_bias, phases);
            let color = fits.predict_row(ph, design.row(n));
            for c in 0..CHANNELS {
                sums[ph][c] += color[c];
            }
            counts[ph] += 1;
            (sums, counts)
        },
    );

    Ok(sums
        .into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                sum
            } else {
                sum.map(|v| v / count as f64)
            }
        })
        .collect())
}

/// `1 / (white - black)` per phase and channel, with 1.0 substituted for
/// near-zero denominators.
pub fn compute_gain(black: &[[f64; CHANNELS]], white: &[[f64; CHANNELS]]) -> PhaseGain {
    let mut gain = Vec::with_capacity(black.len());
    let mut degenerate = Vec::with_capacity(black.len());
    for (b, w) in black.iter().zip(white.iter()) {
        let mut g = [0.0f64; CHANNELS];
        let mut d = [false; CHANNELS];
        for c in 0..CHANNELS {
            let denom = w[c] - b[c];
            if denom.abs() < GAIN_EPSILON {
                d[c] = true;
                g[c] = 1.0;
            } else {
                g[c] = 1.0 / denom;
            }
        }
        gain.push(g);
        degenerate.push(d);
    }
    PhaseGain { gain, degenerate }
}

/// Derive whichever reference levels the pattern list allows.
pub fn calibrate(
    sources: &[WaveSource],
    waves: &[Vec<f64>],
    fits: &PhaseFits,
) -> TapperResult<Calibration> {
    let (black_idx, white_idx) = find_reference_bands(sources);

    let black = match black_idx {
        Some(i) => Some(phase_levels(&waves[i], fits)?),
        None => {
            log::warn!("No .byte $00,$00,$00,$00 band found; black calibration disabled.");
            None
        }
    };
    let white = match white_idx {
        Some(i) => Some(phase_levels(&waves[i], fits)?),
        None => {
            log::warn!("No .byte $7f,$7f,$7f,$7f band found; white calibration disabled.");
            None
        }
    };

    let gain = match (&black, &white) {
        (Some(b), Some(w)) => {
            let gain = compute_gain(b, w);
            for (ph, flags) in gain.degenerate.iter().enumerate() {
                for (c, degenerate) in flags.iter().enumerate() {
                    if *degenerate {
                        log::warn!(
                            "Degenerate white-black span at phase {} channel {}; gain forced to 1.0",
                            ph,
                            c
                        );
                    }
                }
            }
            Some(gain)
        }
        _ => None,
    };

    Ok(Calibration { black, white, gain })
}
