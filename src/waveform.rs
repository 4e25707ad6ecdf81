//! ±1 input waveforms reconstructed from the known bit patterns.

use serde::{Deserialize, Serialize};

use crate::error::{TapperError, TapperResult};

/// Dots in one repeating unit (four 7-bit bytes).
pub const UNIT_SAMPLES: usize = 28;

pub const BLACK_PATTERN: [u8; 4] = [0x00; 4];
pub const WHITE_PATTERN: [u8; 4] = [0x7F; 4];

/// Where a band's input signal comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveSource {
    /// Four bytes in file order, packed LSB-first into a 28-dot stream.
    Packed([u8; 4]),
    /// Literal bitstring, optionally reversed and then rotated left.
    Bitstring {
        bits: String,
        reverse: bool,
        rotate: i64,
    },
}

impl WaveSource {
    pub fn packed(bytes: [u8; 4]) -> Self {
        WaveSource::Packed(bytes.map(|b| b & 0x7F))
    }

    pub fn is_black_reference(&self) -> bool {
        matches!(self, WaveSource::Packed(bytes) if *bytes == BLACK_PATTERN)
    }

    pub fn is_white_reference(&self) -> bool {
        matches!(self, WaveSource::Packed(bytes) if *bytes == WHITE_PATTERN)
    }

    /// One period of the signal before tiling.
    pub fn unit(&self) -> TapperResult<Vec<f64>> {
        match self {
            WaveSource::Packed(bytes) => Ok(packed_unit(*bytes).to_vec()),
            WaveSource::Bitstring {
                bits,
                reverse,
                rotate,
            } => bitstring_unit(bits, *reverse, *rotate),
        }
    }

    pub fn synthesize(&self, width: usize) -> TapperResult<Vec<f64>> {
        Ok(tile(&self.unit()?, width))
    }
}

pub fn pack_stream(bytes: [u8; 4]) -> u32 {
    let [b0, b1, b2, b3] = bytes.map(|b| (b & 0x7F) as u32);
    (b3 << 21) | (b2 << 14) | (b1 << 7) | b0
}

fn packed_unit(bytes: [u8; 4]) -> [f64; UNIT_SAMPLES] {
    let stream = pack_stream(bytes);
    let mut unit = [0.0f64; UNIT_SAMPLES];
    for (i, sample) in unit.iter_mut().enumerate() {
        *sample = if (stream >> i) & 1 == 1 { 1.0 } else { -1.0 };
    }
    unit
}

fn bitstring_unit(bits: &str, reverse: bool, rotate: i64) -> TapperResult<Vec<f64>> {
    let mut chars: Vec<char> = bits.trim().chars().collect();
    if chars.is_empty() {
        return Err(TapperError::Config("Empty bitstring.".to_string()));
    }
    if reverse {
        chars.reverse();
    }
    if rotate != 0 {
        let rot = rotate.rem_euclid(chars.len() as i64) as usize;
        chars.rotate_left(rot);
    }
    Ok(chars
        .iter()
        .map(|&c| if c == '1' { 1.0 } else { -1.0 })
        .collect())
}

/// Repeat `unit` ceil(width / len) times and truncate to `width`.
pub fn tile(unit: &[f64], width: usize) -> Vec<f64> {
    unit.iter().copied().cycle().take(width).collect()
}

/// Largest multiple of the repeating unit that fits in `width`.
pub fn unit_aligned_width(width: usize) -> usize {
    (width / UNIT_SAMPLES) * UNIT_SAMPLES
}
