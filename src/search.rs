//! Brute-force search over phase bias and horizontal sample shift.
//!
//! Every phase bias gets its own set of per-phase fits; every shift under it
//! is scored by prediction MSE against the target. Biases are evaluated in
//! parallel with rayon, then reduced in enumeration order so ties always go
//! to the smallest (phase_bias, x_shift).

use rayon::prelude::*;
use serde::Serialize;

use crate::design::DesignMatrix;
use crate::error::{TapperError, TapperResult};
use crate::phase::{fit_per_phase, mse, predict, PhaseFits, CHANNELS};

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub taps: usize,
    pub phases: usize,
    pub lambda: f64,
    pub xshift_min: i64,
    pub xshift_max: i64,
}

/// Score of one grid cell.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellScore {
    pub phase_bias: usize,
    pub x_shift: i64,
    pub mse: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub phase_bias: usize,
    pub x_shift: i64,
    pub fits: PhaseFits,
    pub mse: f64,
    /// All evaluated cells in enumeration order.
    pub grid: Vec<CellScore>,
}

/// Index of the first minimum; later equal scores never displace it.
pub fn select_best(scores: &[CellScore]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, cell) in scores.iter().enumerate() {
        match best {
            Some(b) if cell.mse >= scores[b].mse => {}
            Some(_) if cell.mse.is_nan() => {}
            _ => best = Some(i),
        }
    }
    best
}

pub fn search_alignment(
    wave: &[f64],
    targets: &[[f64; CHANNELS]],
    params: &SearchParams,
) -> TapperResult<SearchResult> {
    let design = DesignMatrix::build(wave, params.taps)?;
    search_with_design(&design, targets, params)
}

pub fn search_with_design(
    design: &DesignMatrix,
    targets: &[[f64; CHANNELS]],
    params: &SearchParams,
) -> TapperResult<SearchResult> {
    let shifts: Vec<i64> = (params.xshift_min..=params.xshift_max).collect();

    let per_bias: Vec<(PhaseFits, Vec<CellScore>)> = (0..params.phases)
        .into_par_iter()
        .map(|phase_bias| {
            let fits = fit_per_phase(design, targets, params.phases, phase_bias, params.lambda)?;
            let scores = shifts
                .iter()
                .map(|&x_shift| CellScore {
                    phase_bias,
                    x_shift,
                    mse: mse(&predict(design, &fits, x_shift), targets),
                })
                .collect::<Vec<_>>();
            Ok((fits, scores))
        })
        .collect::<TapperResult<Vec<_>>>()?;

    let grid: Vec<CellScore> = per_bias
        .iter()
        .flat_map(|(_, scores)| scores.iter().copied())
        .collect();
    for cell in &grid {
        log::debug!(
            "phase_bias={} x_shift={} mse={:.8e}",
            cell.phase_bias,
            cell.x_shift,
            cell.mse
        );
    }

    let best_idx = select_best(&grid).ok_or_else(|| {
        TapperError::Config("empty phase_bias × x_shift search grid".to_string())
    })?;
    let best = grid[best_idx];
    let fits = per_bias
        .into_iter()
        .nth(best.phase_bias)
        .map(|(fits, _)| fits)
        .ok_or_else(|| TapperError::Config("phase bias out of range".to_string()))?;

    Ok(SearchResult {
        phase_bias: best.phase_bias,
        x_shift: best.x_shift,
        fits,
        mse: best.mse,
        grid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::clamp_index;
    use crate::phase::phase_bucket;
    use crate::waveform::WaveSource;

    fn params(taps: usize, phases: usize) -> SearchParams {
        SearchParams {
            taps,
            phases,
            lambda: 1e-9,
            xshift_min: -2,
            xshift_max: 2,
        }
    }

    fn synthetic_wave() -> Vec<f64> {
        let mut wave = Vec::new();
        for bytes in [
            [0x08, 0x11, 0x22, 0x44],
            [0x55, 0x2A, 0x55, 0x2A],
            [0x13, 0x4C, 0x31, 0x06],
            [0x7F, 0x00, 0x3C, 0x43],
        ] {
            wave.extend(WaveSource::packed(bytes).synthesize(56).unwrap());
        }
        wave
    }

    /// Noiseless target from known per-phase taps read at `n + x_shift`.
    fn render_target(
        wave: &[f64],
        taps: usize,
        phases: usize,
        bias: usize,
        shift: i64,
    ) -> Vec<[f64; 3]> {
        let design = DesignMatrix::build(wave, taps).unwrap();
        (0..wave.len())
            .map(|n| {
                let ph = phase_bucket(n, bias, phases);
                let row = design.row(clamp_index(n as isize + shift as isize, wave.len()));
                let mut out = [0.0; 3];
                for (c, value) in out.iter_mut().enumerate() {
                    *value = row
                        .iter()
                        .enumerate()
                        .map(|(t, x)| x * (0.1 * (t + 1) as f64 - 0.05 * (ph + c) as f64))
                        .sum::<f64>()
                        + 0.2 * c as f64;
                }
                out
            })
            .collect()
    }

    #[test]
    fn recovers_true_alignment_on_noiseless_target() {
        let wave = synthetic_wave();
        let target = render_target(&wave, 5, 4, 0, 0);
        let result = search_alignment(&wave, &target, &params(5, 4)).unwrap();

        assert_eq!(result.phase_bias, 0);
        assert_eq!(result.x_shift, 0);
        assert!(result.mse < 1e-12, "mse {}", result.mse);
        assert_eq!(result.grid.len(), 4 * 5);
        assert_eq!(result.fits.phases(), 4);
        assert_eq!(result.fits.taps, 5);
    }

    #[test]
    fn shifted_cells_score_worse_than_the_true_one() {
        let wave = synthetic_wave();
        let target = render_target(&wave, 5, 4, 0, 0);
        let result = search_alignment(&wave, &target, &params(5, 4)).unwrap();
        for cell in result.grid.iter().filter(|c| c.x_shift != 0) {
            assert!(cell.mse > result.mse);
        }
    }

    #[test]
    fn ties_resolve_to_first_enumerated_cell() {
        let scores = vec![
            CellScore {
                phase_bias: 0,
                x_shift: -1,
                mse: 0.5,
            },
            CellScore {
                phase_bias: 0,
                x_shift: 0,
                mse: 0.25,
            },
            CellScore {
                phase_bias: 1,
                x_shift: -1,
                mse: 0.25,
            },
            CellScore {
                phase_bias: 1,
                x_shift: 0,
                mse: f64::NAN,
            },
        ];
        assert_eq!(select_best(&scores), Some(1));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn grid_is_enumerated_bias_then_shift() {
        let wave = synthetic_wave();
        let target = render_target(&wave, 3, 2, 0, 0);
        let result = search_alignment(&wave, &target, &params(3, 2)).unwrap();
        let order: Vec<(usize, i64)> = result
            .grid
            .iter()
            .map(|c| (c.phase_bias, c.x_shift))
            .collect();
        let expected: Vec<(usize, i64)> = (0..2)
            .flat_map(|pb| (-2..=2).map(move |xs| (pb, xs)))
            .collect();
        assert_eq!(order, expected);
    }
}
