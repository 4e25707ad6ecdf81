use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tapper_lib::config::{ColorSpace, FitConfig};
use tapper_lib::error::TapperError;
use tapper_lib::{run, RunPaths};

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum Space {
    Rgb,
    Yiq,
}

impl From<Space> for ColorSpace {
    fn from(space: Space) -> Self {
        match space {
            Space::Rgb => ColorSpace::Rgb,
            Space::Yiq => ColorSpace::Yiq,
        }
    }
}

/// Learn per-phase FIR taps from a stepping calibration capture.
#[derive(Parser, Debug)]
#[command(name = "tapper", version, about)]
struct Args {
    /// Input calibration capture (BMP/PNG/etc.).
    #[arg(long)]
    image: PathBuf,

    /// Pattern file, one pattern per band (top to bottom).
    #[arg(long)]
    patterns: PathBuf,

    /// Output C file path.
    #[arg(long, default_value = "fir_out.c")]
    emit: PathBuf,

    /// Optional JSON report with the full search grid and calibration.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Fit in RGB directly or in YIQ space.
    #[arg(long, value_enum, default_value_t = Space::Rgb)]
    space: Space,

    /// Odd number of FIR taps (e.g. 9, 17, 33).
    #[arg(long, default_value_t = 9)]
    taps: usize,

    /// Phase buckets.
    #[arg(long, default_value_t = 4)]
    phases: usize,

    /// Non-black threshold in [0,1] for cropping.
    #[arg(long, default_value_t = 0.02)]
    thr: f32,

    /// Row-mean diff threshold for band segmentation.
    #[arg(long, default_value_t = 0.03)]
    diff_thr: f64,

    /// Ridge lambda (regularization).
    #[arg(long, default_value_t = 1e-3)]
    lam: f64,

    /// Do not reverse bitstrings when building the input wave.
    #[arg(long)]
    no_reverse_bits: bool,

    /// Rotate bitstrings left by this many bits after reversal.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    bit_rot: i64,

    /// Min horizontal sample shift to search (in pixels).
    #[arg(long, default_value_t = -2, allow_negative_numbers = true)]
    xshift_min: i64,

    /// Max horizontal sample shift to search (in pixels).
    #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
    xshift_max: i64,

    /// Log every search cell.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn fit_config(&self) -> FitConfig {
        FitConfig {
            space: self.space.into(),
            taps: self.taps,
            phases: self.phases,
            bg_threshold: self.thr,
            diff_threshold: self.diff_thr,
            lambda: self.lam,
            reverse_bits: !self.no_reverse_bits,
            bit_rotation: self.bit_rot,
            xshift_min: self.xshift_min,
            xshift_max: self.xshift_max,
        }
    }
}

/// The single line a fatal error is reported with on stderr.
fn failure_message(err: &TapperError) -> String {
    format!("error: {}", err)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let paths = RunPaths {
        image: args.image.clone(),
        patterns: args.patterns.clone(),
        emit: args.emit.clone(),
        report: args.report.clone(),
    };

    match run(&paths, &args.fit_config()) {
        Ok(outcome) => {
            println!("Wrote: {}", paths.emit.display());
            println!(
                "Best phase_bias={}, x_shift={}, mse={:.8e}",
                outcome.search.phase_bias, outcome.search.x_shift, outcome.search.mse
            );
            println!("Tip: try --lam 1e-4 .. 1e-2 and/or --taps 17 if results are unstable.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}
