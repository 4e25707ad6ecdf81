//! Pattern file reader.
//!
//! One pattern per band, top to bottom. A line is either four byte values,
//! optionally behind an assembler `.byte` directive:
//!
//! ```text
//!   .byte $08, $11, $22, $44
//! ```
//!
//! or a single literal bitstring such as `0011011`, alone on its line.
//! Blank lines and lines starting with `#` or `;` are ignored.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{TapperError, TapperResult};
use crate::waveform::WaveSource;

static BYTE_VALUE: OnceLock<Regex> = OnceLock::new();
static BITSTRING: OnceLock<Regex> = OnceLock::new();

fn byte_value_re() -> &'static Regex {
    BYTE_VALUE.get_or_init(|| {
        Regex::new(r"^(?:\$|0[xX])?([0-9a-fA-F]{1,2})$").expect("static regex compiles")
    })
}

fn bitstring_re() -> &'static Regex {
    BITSTRING.get_or_init(|| Regex::new(r"^[01]+$").expect("static regex compiles"))
}

/// How bitstring lines are turned into waveforms.
#[derive(Debug, Copy, Clone)]
pub struct BitstringOptions {
    pub reverse: bool,
    pub rotate: i64,
}

impl Default for BitstringOptions {
    fn default() -> Self {
        Self {
            reverse: true,
            rotate: 0,
        }
    }
}

pub fn parse_patterns(text: &str, bit_opts: BitstringOptions) -> TapperResult<Vec<WaveSource>> {
    let mut out = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        // trailing assembler comment
        let line = line.split(';').next().unwrap_or("").trim();
        let (directive, body) = match line.split_once(".byte") {
            Some((_, tail)) => (true, tail.trim()),
            None => (false, line),
        };

        if directive || body.contains(',') {
            out.push(parse_byte_line(body, line_no)?);
            continue;
        }

        let mut tokens = body.split_whitespace();
        let token = tokens.next().unwrap_or("");
        if bitstring_re().is_match(token) {
            if tokens.next().is_some() {
                return Err(TapperError::Parse {
                    line: line_no,
                    message: format!("Expected a single bitstring: {}", raw.trim()),
                });
            }
            out.push(WaveSource::Bitstring {
                bits: token.to_string(),
                reverse: bit_opts.reverse,
                rotate: bit_opts.rotate,
            });
            continue;
        }

        return Err(TapperError::Parse {
            line: line_no,
            message: format!("Expected 4 byte values or a bitstring: {}", raw.trim()),
        });
    }

    if out.is_empty() {
        return Err(TapperError::NoPatterns);
    }
    Ok(out)
}

fn parse_byte_line(body: &str, line_no: usize) -> TapperResult<WaveSource> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(TapperError::Parse {
            line: line_no,
            message: format!("Expected 4 byte values, found {}: {}", parts.len(), body),
        });
    }

    let mut bytes = [0u8; 4];
    for (slot, part) in bytes.iter_mut().zip(parts.iter()) {
        let digits = byte_value_re()
            .captures(part)
            .and_then(|c| c.get(1))
            .ok_or_else(|| TapperError::Parse {
                line: line_no,
                message: format!("Invalid hex byte '{}'", part),
            })?;
        let value = u8::from_str_radix(digits.as_str(), 16).map_err(|e| TapperError::Parse {
            line: line_no,
            message: format!("Invalid hex byte '{}': {}", part, e),
        })?;
        *slot = value;
    }
    Ok(WaveSource::packed(bytes))
}
