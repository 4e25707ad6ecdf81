//! Error types for the fitting pipeline

/// Every fatal condition the pipeline can hit. All of these abort the run
/// before anything is written to the output path.
#[derive(Debug, thiserror::Error)]
pub enum TapperError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Band count ({bands}) != pattern count ({patterns}); make the pattern file match the bands in the image")]
    InputMismatch { bands: usize, patterns: usize },

    #[error("Pattern file line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("No patterns found in pattern file")]
    NoPatterns,

    #[error("{0}")]
    Data(String),

    #[error("Singular ridge system for phase {phase}, channel {channel}; try a larger --lam")]
    Numeric { phase: usize, channel: usize },

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TapperResult<T> = Result<T, TapperError>;
