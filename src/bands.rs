//! Band segmentation of a calibration strip.
//!
//! Stepping captures have no gaps between bands, but each band boundary shows
//! a strong jump in the row-mean color. Rows are split wherever that jump
//! exceeds a threshold.

use crate::image_loader::StripImage;

pub const DEFAULT_DIFF_THRESHOLD: f64 = 0.03;

/// Minimum band height; thinner slices are boundary noise.
const MIN_BAND_ROWS: usize = 2;

/// Contiguous run of rows `[start_row, end_row)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Band {
    pub start_row: usize,
    pub end_row: usize,
}

impl Band {
    pub fn height(&self) -> usize {
        self.end_row - self.start_row
    }
}

fn row_means(strip: &StripImage) -> Vec<[f64; 3]> {
    (0..strip.height)
        .map(|y| {
            let mut sum = [0.0f64; 3];
            for p in strip.row(y) {
                sum[0] += p[0];
                sum[1] += p[1];
                sum[2] += p[2];
            }
            let w = strip.width.max(1) as f64;
            [sum[0] / w, sum[1] / w, sum[2] / w]
        })
        .collect()
}

pub fn segment_bands(strip: &StripImage, diff_threshold: f64) -> Vec<Band> {
    let h = strip.height;
    let means = row_means(strip);

    // edge at y means a boundary between row y and y + 1
    let edges: Vec<usize> = means
        .windows(2)
        .enumerate()
        .filter_map(|(y, pair)| {
            let d0 = pair[1][0] - pair[0][0];
            let d1 = pair[1][1] - pair[0][1];
            let d2 = pair[1][2] - pair[0][2];
            let norm = (d0 * d0 + d1 * d1 + d2 * d2).sqrt();
            (norm > diff_threshold).then_some(y)
        })
        .collect();

    if edges.is_empty() {
        return vec![Band {
            start_row: 0,
            end_row: h,
        }];
    }

    let mut bounds = Vec::with_capacity(edges.len() + 2);
    bounds.push(0);
    bounds.extend(edges.iter().map(|e| e + 1));
    bounds.push(h);

    bounds
        .windows(2)
        .map(|pair| Band {
            start_row: pair[0],
            end_row: pair[1],
        })
        .filter(|band| band.height() >= MIN_BAND_ROWS)
        .collect()
}

/// Average a band vertically into one color per column.
pub fn band_signal(strip: &StripImage, band: Band) -> Vec<[f64; 3]> {
    let rows = band.height().max(1) as f64;
    let mut out = vec![[0.0f64; 3]; strip.width];
    for y in band.start_row..band.end_row {
        for (acc, p) in out.iter_mut().zip(strip.row(y)) {
            acc[0] += p[0];
            acc[1] += p[1];
            acc[2] += p[2];
        }
    }
    for acc in &mut out {
        acc[0] /= rows;
        acc[1] /= rows;
        acc[2] /= rows;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_from_rows(width: usize, rows: &[[f64; 3]]) -> StripImage {
        let mut pixels = Vec::with_capacity(width * rows.len());
        for color in rows {
            pixels.extend(std::iter::repeat(*color).take(width));
        }
        StripImage {
            width,
            height: rows.len(),
            pixels,
        }
    }

    #[test]
    fn uniform_strip_is_a_single_band() {
        let strip = strip_from_rows(5, &[[0.5, 0.5, 0.5]; 6]);
        assert_eq!(
            segment_bands(&strip, DEFAULT_DIFF_THRESHOLD),
            vec![Band {
                start_row: 0,
                end_row: 6
            }]
        );
    }

    #[test]
    fn splits_on_color_jumps() {
        let red = [1.0, 0.0, 0.0];
        let blue = [0.0, 0.0, 1.0];
        let gray = [0.4, 0.4, 0.4];
        let strip = strip_from_rows(4, &[red, red, red, blue, blue, gray, gray, gray]);
        let bands = segment_bands(&strip, DEFAULT_DIFF_THRESHOLD);
        assert_eq!(
            bands,
            vec![
                Band {
                    start_row: 0,
                    end_row: 3
                },
                Band {
                    start_row: 3,
                    end_row: 5
                },
                Band {
                    start_row: 5,
                    end_row: 8
                },
            ]
        );
    }

    #[test]
    fn single_row_slices_are_dropped() {
        let a = [0.1, 0.1, 0.1];
        let b = [0.9, 0.9, 0.9];
        let c = [0.5, 0.0, 0.5];
        let strip = strip_from_rows(3, &[a, a, b, c, c]);
        let bands = segment_bands(&strip, DEFAULT_DIFF_THRESHOLD);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].end_row, 2);
        assert_eq!(bands[1].start_row, 3);
    }

    #[test]
    fn band_signal_is_vertical_mean() {
        let strip = StripImage {
            width: 2,
            height: 2,
            pixels: vec![[0.0, 0.2, 0.4], [1.0, 1.0, 1.0], [0.2, 0.4, 0.6], [0.0, 0.0, 0.0]],
        };
        let sig = band_signal(
            &strip,
            Band {
                start_row: 0,
                end_row: 2,
            },
        );
        assert_eq!(sig.len(), 2);
        assert!((sig[0][0] - 0.1).abs() < 1e-12);
        assert!((sig[0][2] - 0.5).abs() < 1e-12);
        assert!((sig[1][1] - 0.5).abs() < 1e-12);
    }
}
