use crate::bands::DEFAULT_DIFF_THRESHOLD;
use crate::error::{TapperError, TapperResult};
use serde::{Deserialize, Serialize};

/// Color representation the fit is performed in.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ColorSpace {
    /// Fit the sampled RGB values directly.
    Rgb,
    /// Convert targets to YIQ before fitting.
    Yiq,
}

impl ColorSpace {
    /// Single-letter channel names used for the emitted tables.
    pub fn channel_names(self) -> [&'static str; 3] {
        match self {
            ColorSpace::Rgb => ["R", "G", "B"],
            ColorSpace::Yiq => ["Y", "I", "Q"],
        }
    }
}

/// Fitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitConfig {
    pub space: ColorSpace,
    pub taps: usize,
    pub phases: usize,
    /// Non-black threshold in [0,1] used to crop the strip.
    pub bg_threshold: f32,
    /// Row-mean difference threshold for band segmentation.
    pub diff_threshold: f64,
    pub lambda: f64,
    pub reverse_bits: bool,
    pub bit_rotation: i64,
    pub xshift_min: i64,
    pub xshift_max: i64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            space: ColorSpace::Rgb,
            taps: 9,
            phases: 4,
            bg_threshold: 0.02,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            lambda: 1e-3,
            reverse_bits: true,
            bit_rotation: 0,
            xshift_min: -2,
            xshift_max: 2,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> TapperResult<()> {
        if self.taps % 2 == 0 {
            return Err(TapperError::Config(format!(
                "taps must be odd (got {})",
                self.taps
            )));
        }
        if self.phases == 0 {
            return Err(TapperError::Config("phases must be at least 1".to_string()));
        }
        if self.lambda.is_nan() || self.lambda < 0.0 {
            return Err(TapperError::Config(format!(
                "ridge lambda must be >= 0 (got {})",
                self.lambda
            )));
        }
        if self.xshift_min > self.xshift_max {
            return Err(TapperError::Config(format!(
                "empty x_shift range [{}, {}]",
                self.xshift_min, self.xshift_max
            )));
        }
        Ok(())
    }
}
