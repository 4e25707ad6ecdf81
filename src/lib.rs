pub mod bands;
pub mod calibration;
pub mod color_space;
pub mod config;
pub mod design;
pub mod emit;
pub mod error;
pub mod image_loader;
pub mod patterns;
pub mod phase;
pub mod ridge;
pub mod search;
pub mod waveform;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use bands::{band_signal, segment_bands};
use calibration::{calibrate, Calibration};
use color_space::to_fit_space;
use config::FitConfig;
use design::DesignMatrix;
use emit::{input_fingerprint, render_c_source, render_report, FitReport, StagedWrite};
use error::{TapperError, TapperResult};
use image_loader::{find_foreground_bbox, load_image_rgb01, StripImage};
use patterns::{parse_patterns, BitstringOptions};
use phase::CHANNELS;
use search::{search_with_design, SearchParams, SearchResult};
use waveform::{unit_aligned_width, WaveSource};

/// Everything a finished fit produces before emission.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub search: SearchResult,
    pub calibration: Calibration,
    pub band_count: usize,
    pub sample_count: usize,
    /// Per-band input waveforms, in band order.
    pub waves: Vec<Vec<f64>>,
    /// Per-band targets in the fitting color space, in band order.
    pub targets: Vec<Vec<[f64; CHANNELS]>>,
}

/// Input and output locations for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub image: PathBuf,
    pub patterns: PathBuf,
    pub emit: PathBuf,
    pub report: Option<PathBuf>,
}

/// Fit per-phase FIR taps to an already cropped calibration strip.
///
/// Bands are paired with `sources` by position. Each band is truncated to a
/// whole number of 28-dot units before its waveform is synthesized; all
/// bands are then concatenated into one training signal.
pub fn fit_strip(
    strip: &StripImage,
    sources: &[WaveSource],
    config: &FitConfig,
) -> TapperResult<FitOutcome> {
    config.validate()?;

    let bands = segment_bands(strip, config.diff_threshold);
    if bands.len() != sources.len() {
        return Err(TapperError::InputMismatch {
            bands: bands.len(),
            patterns: sources.len(),
        });
    }
    log::info!("Segmented {} bands from {}x{} strip", bands.len(), strip.width, strip.height);

    let mut waves = Vec::with_capacity(bands.len());
    let mut targets = Vec::with_capacity(bands.len());
    for (band, source) in bands.iter().zip(sources.iter()) {
        let mut signal = band_signal(strip, *band);

        // the capture is usually a column wider than the unit; train only on
        // whole units
        let width = unit_aligned_width(signal.len());
        if width == 0 {
            return Err(TapperError::Data(format!(
                "Band too narrow: width={}",
                signal.len()
            )));
        }
        signal.truncate(width);

        waves.push(source.synthesize(width)?);
        targets.push(to_fit_space(&signal, config.space));
    }

    let wave_all: Vec<f64> = waves.iter().flatten().copied().collect();
    let target_all: Vec<[f64; CHANNELS]> = targets.iter().flatten().copied().collect();

    let params = SearchParams {
        taps: config.taps,
        phases: config.phases,
        lambda: config.lambda,
        xshift_min: config.xshift_min,
        xshift_max: config.xshift_max,
    };
    let design = DesignMatrix::build(&wave_all, config.taps)?;
    let search = search_with_design(&design, &target_all, &params)?;
    log::info!(
        "Best phase_bias={}, x_shift={}, mse={:.8e}",
        search.phase_bias,
        search.x_shift,
        search.mse
    );

    let calibration = calibrate(sources, &waves, &search.fits)?;

    Ok(FitOutcome {
        search,
        calibration,
        band_count: bands.len(),
        sample_count: wave_all.len(),
        waves,
        targets,
    })
}

/// Decode the image, crop to its foreground, parse the patterns and fit.
pub fn fit_from_bytes(
    image_bytes: &[u8],
    pattern_text: &str,
    config: &FitConfig,
) -> TapperResult<FitOutcome> {
    let img = load_image_rgb01(image_bytes)?;
    let bbox = find_foreground_bbox(&img, config.bg_threshold)?;
    let strip = img.crop(bbox);
    log::debug!("Foreground bbox {:?}", bbox);

    let sources = parse_patterns(
        pattern_text,
        BitstringOptions {
            reverse: config.reverse_bits,
            rotate: config.bit_rotation,
        },
    )?;

    fit_strip(&strip, &sources, config)
}

/// Run the whole pipeline from files and write the emitted source.
///
/// Nothing is written unless every stage succeeds.
///
/// # Arguments
/// * `paths` - Image, pattern file, output and optional report locations
/// * `config` - Fitting configuration
///
/// # Returns
/// The fit outcome, after the C source (and report) are on disk
pub fn run(paths: &RunPaths, config: &FitConfig) -> TapperResult<FitOutcome> {
    let start = Instant::now();

    let image_bytes = fs::read(&paths.image)?;
    let pattern_text = fs::read_to_string(&paths.patterns)?;
    log::info!(
        "Fitting {} ({} bytes) against {}",
        paths.image.display(),
        image_bytes.len(),
        paths.patterns.display()
    );

    let outcome = fit_from_bytes(&image_bytes, &pattern_text, config)?;
    let fingerprint = input_fingerprint(&image_bytes, pattern_text.as_bytes(), config);

    let source = render_c_source(
        config.space,
        &outcome.search,
        &outcome.calibration,
        Some(&fingerprint),
    );
    let report = match &paths.report {
        Some(report_path) => {
            let report = FitReport {
                config,
                band_count: outcome.band_count,
                sample_count: outcome.sample_count,
                phase_bias: outcome.search.phase_bias,
                x_shift: outcome.search.x_shift,
                mse: outcome.search.mse,
                calibration: &outcome.calibration,
                degenerate_gains: outcome
                    .calibration
                    .gain
                    .as_ref()
                    .map(|g| g.degenerate_count())
                    .unwrap_or(0),
                grid: &outcome.search.grid,
                input_sha256: &fingerprint,
            };
            Some((report_path, render_report(&report)?))
        }
        None => None,
    };

    // stage every output before any of them becomes visible
    let staged_source = StagedWrite::stage(&paths.emit, source.as_bytes())?;
    let staged_report = match &report {
        Some((report_path, payload)) => Some(StagedWrite::stage(report_path, payload)?),
        None => None,
    };

    staged_source.commit()?;
    log::info!("Wrote: {}", paths.emit.display());
    if let Some(staged) = staged_report {
        let report_path = staged.path().to_path_buf();
        if let Err(err) = staged.commit() {
            let _ = fs::remove_file(&paths.emit);
            return Err(err);
        }
        log::info!("Wrote report: {}", report_path.display());
    }

    log::info!("Run finished in {}ms", start.elapsed().as_millis());
    Ok(outcome)
}
