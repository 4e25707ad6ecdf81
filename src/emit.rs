//! C source emission for the fitted tables, plus the optional JSON report.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::calibration::{Calibration, PhaseLevels};
use crate::config::{ColorSpace, FitConfig};
use crate::error::TapperResult;
use crate::phase::CHANNELS;
use crate::search::{CellScore, SearchResult};

const DECIMALS: usize = 6;

/// Bump when the fingerprinted inputs change meaning.
const FINGERPRINT_VERSION: u8 = 2;

pub fn fmt_c_array_2d(name: &str, table: &[Vec<f64>]) -> String {
    let phases = table.len();
    let taps = table.first().map(|row| row.len()).unwrap_or(0);
    let mut lines = vec![format!(
        "static const float {}[{}][{}] = {{",
        name, phases, taps
    )];
    for row in table {
        let vals = row
            .iter()
            .map(|v| format!("{:.*}f", DECIMALS, v))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("    {{{}}},", vals));
    }
    lines.push("};".to_string());
    lines.join("\n")
}

pub fn fmt_c_vector(name: &str, values: &[f64]) -> String {
    let vals = values
        .iter()
        .map(|v| format!("{:.*}f", DECIMALS, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("static const float {}[{}] = {{{}}};", name, values.len(), vals)
}

fn channel_column(levels: &[[f64; CHANNELS]], channel: usize) -> Vec<f64> {
    levels.iter().map(|l| l[channel]).collect()
}

fn push_level_block(out: &mut Vec<String>, prefix: &str, levels: &PhaseLevels, comment: &str) {
    out.push(String::new());
    out.push(comment.to_string());
    for (c, letter) in ColorSpace::Rgb.channel_names().iter().enumerate() {
        out.push(fmt_c_vector(
            &format!("{}{}", prefix, letter),
            &channel_column(levels, c),
        ));
    }
}

/// Hash of everything that determines the fit: image, patterns, parameters.
pub fn input_fingerprint(image_bytes: &[u8], pattern_bytes: &[u8], config: &FitConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update([FINGERPRINT_VERSION]);
    hasher.update((image_bytes.len() as u64).to_le_bytes());
    hasher.update(image_bytes);
    hasher.update((pattern_bytes.len() as u64).to_le_bytes());
    hasher.update(pattern_bytes);
    hasher.update((config.taps as u64).to_le_bytes());
    hasher.update((config.phases as u64).to_le_bytes());
    hasher.update(config.bg_threshold.to_le_bytes());
    hasher.update(config.diff_threshold.to_le_bytes());
    hasher.update(config.lambda.to_le_bytes());
    hasher.update([config.reverse_bits as u8]);
    hasher.update(config.bit_rotation.to_le_bytes());
    hasher.update(config.xshift_min.to_le_bytes());
    hasher.update(config.xshift_max.to_le_bytes());
    hasher.update([match config.space {
        ColorSpace::Rgb => 0,
        ColorSpace::Yiq => 1,
    }]);
    format!("{:x}", hasher.finalize())
}

/// Render the complete C source for a finished fit.
pub fn render_c_source(
    space: ColorSpace,
    result: &SearchResult,
    calibration: &Calibration,
    fingerprint: Option<&str>,
) -> String {
    let names = space.channel_names();
    let fits = &result.fits;
    let mut out: Vec<String> = Vec::new();

    out.push("// Auto-generated by tapper".to_string());
    out.push(format!(
        "// best phase_bias = {}, x_shift = {}, mse = {:.8e}",
        result.phase_bias, result.x_shift, result.mse
    ));
    if let Some(fp) = fingerprint {
        out.push(format!("// input sha256 = {}", fp));
    }
    out.push(String::new());

    for (c, letter) in names.iter().enumerate() {
        out.push(fmt_c_array_2d(&format!("fir{}", letter), &fits.weight_table(c)));
        out.push(String::new());
    }
    for (c, letter) in names.iter().enumerate() {
        out.push(fmt_c_vector(&format!("bias{}", letter), &fits.bias_vector(c)));
    }

    if let Some(black) = &calibration.black {
        push_level_block(
            &mut out,
            "black",
            black,
            "// Per-phase black level measured from .byte $00,$00,$00,$00 band",
        );
    }
    if let Some(white) = &calibration.white {
        push_level_block(
            &mut out,
            "white",
            white,
            "// Per-phase white level measured from .byte $7f,$7f,$7f,$7f band",
        );
    }
    if let Some(gain) = &calibration.gain {
        push_level_block(
            &mut out,
            "gain",
            &gain.gain,
            "// Per-phase gain so (rgb - black) * gain maps white->1.0",
        );
    }

    out.push(String::new());
    out.push(format!("static const int phase_bias = {};", result.phase_bias));
    out.push(format!("static const int x_shift = {};", result.x_shift));
    out.join("\n")
}

/// Contents written to a temporary sibling of `path`, not yet visible there.
/// Committing renames it into place, so a reader never observes a
/// half-written file.
///
/// Dropping an uncommitted write removes the temporary file.
#[derive(Debug)]
pub struct StagedWrite {
    path: PathBuf,
    temp_path: PathBuf,
    committed: bool,
}

impl StagedWrite {
    pub fn stage(path: &Path, contents: &[u8]) -> TapperResult<Self> {
        if path.is_dir() {
            return Err(io::Error::other(format!(
                "Output path is a directory: {}",
                path.display()
            ))
            .into());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let temp_name = format!(
            ".{}.{}.tmp",
            path.file_name()
                .and_then(|v| v.to_str())
                .unwrap_or("tapper-out"),
            stamp
        );
        let staged = Self {
            path: path.to_path_buf(),
            temp_path: path.with_file_name(temp_name),
            committed: false,
        };
        fs::write(&staged.temp_path, contents)?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temporary file into place.
    pub fn commit(mut self) -> TapperResult<()> {
        let result = match fs::rename(&self.temp_path, &self.path) {
            Ok(()) => Ok(()),
            Err(_) if self.path.exists() => fs::remove_file(&self.path)
                .and_then(|()| fs::rename(&self.temp_path, &self.path)),
            Err(rename_err) => Err(rename_err),
        };
        self.committed = result.is_ok();
        result.map_err(Into::into)
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitReport<'a> {
    pub config: &'a FitConfig,
    pub band_count: usize,
    pub sample_count: usize,
    pub phase_bias: usize,
    pub x_shift: i64,
    pub mse: f64,
    pub calibration: &'a Calibration,
    pub degenerate_gains: usize,
    pub grid: &'a [CellScore],
    pub input_sha256: &'a str,
}

pub fn render_report(report: &FitReport<'_>) -> TapperResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::compute_gain;
    use crate::phase::PhaseFits;
    use crate::ridge::LinearFit;

    fn tiny_result() -> SearchResult {
        let model = |w: f64, b: f64| LinearFit {
            weights: vec![w, -w, 0.5],
            bias: b,
        };
        SearchResult {
            phase_bias: 1,
            x_shift: -1,
            fits: PhaseFits {
                taps: 3,
                phase_bias: 1,
                models: vec![
                    [model(0.25, 0.1), model(0.5, 0.2), model(1.0, 0.3)],
                    [model(0.125, -0.1), model(0.0, 0.0), model(2.0, 1.0)],
                ],
            },
            mse: 1.5e-5,
            grid: Vec::new(),
        }
    }

    #[test]
    fn formats_c_arrays_with_float_suffix() {
        let text = fmt_c_array_2d("firR", &[vec![0.5, -1.0], vec![0.0, 2.25]]);
        assert_eq!(
            text,
            "static const float firR[2][2] = {\n    {0.500000f, -1.000000f},\n    {0.000000f, 2.250000f},\n};"
        );
        assert_eq!(
            fmt_c_vector("biasG", &[0.1, 0.2]),
            "static const float biasG[2] = {0.100000f, 0.200000f};"
        );
    }

    #[test]
    fn source_uses_color_space_names_and_trailing_scalars() {
        let black = vec![[0.0; 3]; 2];
        let white = vec![[1.0; 3]; 2];
        let calibration = Calibration {
            gain: Some(compute_gain(&black, &white)),
            black: Some(black),
            white: Some(white),
        };
        let text = render_c_source(ColorSpace::Yiq, &tiny_result(), &calibration, Some("abc"));
        assert!(text.starts_with("// Auto-generated by tapper"));
        assert!(text.contains("// input sha256 = abc"));
        assert!(text.contains("static const float firY[2][3]"));
        assert!(text.contains("static const float firQ[2][3]"));
        assert!(text.contains("static const float biasI[2] = {0.200000f, 0.000000f};"));
        assert!(text.contains("static const float blackR[2]"));
        assert!(text.contains("static const float gainB[2] = {1.000000f, 1.000000f};"));
        assert!(text.ends_with("static const int phase_bias = 1;\nstatic const int x_shift = -1;"));
    }

    #[test]
    fn calibration_blocks_are_optional() {
        let text = render_c_source(ColorSpace::Rgb, &tiny_result(), &Calibration::default(), None);
        assert!(text.contains("firR"));
        assert!(!text.contains("black"));
        assert!(!text.contains("gain"));
        assert!(!text.contains("sha256"));
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let config = FitConfig::default();
        let a = input_fingerprint(b"img", b"pat", &config);
        let b = input_fingerprint(b"img", b"pat", &config);
        let other = FitConfig {
            lambda: 1e-2,
            ..FitConfig::default()
        };
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, input_fingerprint(b"img", b"pat", &other));
    }

    #[test]
    fn fingerprint_separates_image_from_patterns() {
        let config = FitConfig::default();
        assert_ne!(
            input_fingerprint(b"imgp", b"at", &config),
            input_fingerprint(b"img", b"pat", &config)
        );
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> TapperResult<()> {
        StagedWrite::stage(path, contents)?.commit()
    }

    fn temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = std::env::temp_dir().join(format!("tapper-emit-{}", std::process::id()));
        let path = dir.join("out.c");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(temp_files(&dir), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn uncommitted_write_leaves_nothing_behind() {
        let dir = std::env::temp_dir().join(format!("tapper-stage-{}", std::process::id()));
        let path = dir.join("out.c");
        let staged = StagedWrite::stage(&path, b"pending").unwrap();
        assert_eq!(temp_files(&dir), 1);
        assert!(!path.exists());
        drop(staged);
        assert_eq!(temp_files(&dir), 0);
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_target_is_rejected_without_temp_file() {
        let dir = std::env::temp_dir().join(format!("tapper-dirout-{}", std::process::id()));
        let target = dir.join("report.json");
        fs::create_dir_all(target.join("sub")).unwrap();
        assert!(matches!(
            write_atomic(&target, b"{}"),
            Err(crate::error::TapperError::Io(_))
        ));
        assert!(target.is_dir());
        assert_eq!(temp_files(&dir), 0);
        let _ = fs::remove_dir_all(&dir);
    }
}
