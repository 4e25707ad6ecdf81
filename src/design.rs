use crate::error::{TapperError, TapperResult};

/// Clamp a possibly out-of-range sample index into `[0, len)`.
///
/// Used both for window taps and for the prediction shift, so edge samples
/// are replicated rather than zero-padded in every pass.
#[inline]
pub fn clamp_index(idx: isize, len: usize) -> usize {
    if idx < 0 {
        0
    } else if idx as usize >= len {
        len - 1
    } else {
        idx as usize
    }
}

/// N×T sliding-window matrix, row-major. Row `n` holds the input window
/// centered on sample `n`.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    rows: usize,
    taps: usize,
    data: Vec<f64>,
}

impl DesignMatrix {
    pub fn build(wave: &[f64], taps: usize) -> TapperResult<Self> {
        if taps % 2 == 0 {
            return Err(TapperError::Config(format!(
                "taps must be odd (got {})",
                taps
            )));
        }
        let n = wave.len();
        let radius = (taps / 2) as isize;
        let mut data = Vec::with_capacity(n * taps);
        for row in 0..n {
            for t in 0..taps {
                let idx = clamp_index(row as isize + t as isize - radius, n);
                data.push(wave[idx]);
            }
        }
        Ok(Self {
            rows: n,
            taps,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    #[inline]
    pub fn row(&self, n: usize) -> &[f64] {
        let start = n * self.taps;
        &self.data[start..start + self.taps]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_rows_by_taps() {
        let wave: Vec<f64> = (0..7).map(|v| v as f64).collect();
        for taps in [1, 3, 5, 9, 15] {
            let x = DesignMatrix::build(&wave, taps).unwrap();
            assert_eq!(x.rows(), 7);
            assert_eq!(x.taps(), taps);
            for n in 0..7 {
                assert_eq!(x.row(n).len(), taps);
            }
        }
    }

    #[test]
    fn edges_replicate_instead_of_zero_padding() {
        let wave = vec![10.0, 20.0, 30.0, 40.0];
        let x = DesignMatrix::build(&wave, 5).unwrap();
        assert_eq!(x.row(0), &[10.0, 10.0, 10.0, 20.0, 30.0]);
        assert_eq!(x.row(1), &[10.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(x.row(3), &[20.0, 30.0, 40.0, 40.0, 40.0]);
    }

    #[test]
    fn single_sample_wave_fills_every_tap() {
        let x = DesignMatrix::build(&[-1.0], 3).unwrap();
        assert_eq!(x.row(0), &[-1.0, -1.0, -1.0]);
    }

    #[test]
    fn even_taps_rejected() {
        assert!(matches!(
            DesignMatrix::build(&[1.0, -1.0], 4),
            Err(TapperError::Config(_))
        ));
    }

    #[test]
    fn clamp_index_bounds() {
        assert_eq!(clamp_index(-3, 5), 0);
        assert_eq!(clamp_index(2, 5), 2);
        assert_eq!(clamp_index(9, 5), 4);
    }
}
