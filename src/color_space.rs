//! Fixed linear conversion between RGB and YIQ.

use nalgebra::{Matrix3, Vector3};
use std::sync::OnceLock;

use crate::config::ColorSpace;

/// Forward transform:
///   r = Y + 0.956 I + 0.621 Q
///   g = Y - 0.272 I - 0.647 Q
///   b = Y - 1.106 I + 1.703 Q
#[rustfmt::skip]
const RGB_FROM_YIQ: [f64; 9] = [
    1.0,  0.956,  0.621,
    1.0, -0.272, -0.647,
    1.0, -1.106,  1.703,
];

static YIQ_FROM_RGB: OnceLock<Matrix3<f64>> = OnceLock::new();

pub fn rgb_from_yiq_matrix() -> Matrix3<f64> {
    Matrix3::from_row_slice(&RGB_FROM_YIQ)
}

/// Inverse of [`rgb_from_yiq_matrix`], computed once.
pub fn yiq_from_rgb_matrix() -> &'static Matrix3<f64> {
    YIQ_FROM_RGB.get_or_init(|| {
        rgb_from_yiq_matrix()
            .try_inverse()
            .expect("RGB_FROM_YIQ is a constant non-singular matrix")
    })
}

pub fn rgb_to_yiq(rgb: [f64; 3]) -> [f64; 3] {
    let v = yiq_from_rgb_matrix() * Vector3::new(rgb[0], rgb[1], rgb[2]);
    [v.x, v.y, v.z]
}

/// Map a target signal into the fitting color space.
pub fn to_fit_space(samples: &[[f64; 3]], space: ColorSpace) -> Vec<[f64; 3]> {
    match space {
        ColorSpace::Rgb => samples.to_vec(),
        ColorSpace::Yiq => samples.iter().map(|s| rgb_to_yiq(*s)).collect(),
    }
}
