use image::RgbImage;
use palette::Srgb;
use rayon::prelude::*;

use crate::error::{TapperError, TapperResult};

/// Row-major H×W grid of RGB samples normalized to [0,1].
#[derive(Debug, Clone)]
pub struct StripImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f64; 3]>,
}

impl StripImage {
    pub fn from_rgb8(rgb: &RgbImage) -> Self {
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let pixels = rgb
            .as_raw()
            .par_chunks_exact(3)
            .map(|p| {
                let srgb: Srgb<f64> = Srgb::new(p[0], p[1], p[2]).into_format();
                let (r, g, b) = srgb.into_components();
                [r, g, b]
            })
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [f64; 3] {
        self.pixels[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[[f64; 3]] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    /// Copy out the region [x0,x1) × [y0,y1).
    pub fn crop(&self, bbox: BoundingBox) -> StripImage {
        let width = bbox.x1 - bbox.x0;
        let height = bbox.y1 - bbox.y0;
        let mut pixels = Vec::with_capacity(width * height);
        for y in bbox.y0..bbox.y1 {
            pixels.extend_from_slice(&self.row(y)[bbox.x0..bbox.x1]);
        }
        StripImage {
            width,
            height,
            pixels,
        }
    }
}

/// Pixel bounds with exclusive upper edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

/// Decode any raster the `image` crate understands into a normalized grid.
pub fn load_image_rgb01(bytes: &[u8]) -> TapperResult<StripImage> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(StripImage::from_rgb8(&decoded.to_rgb8()))
}

/// Bounding box of every pixel whose brightest channel exceeds `threshold`.
pub fn find_foreground_bbox(img: &StripImage, threshold: f32) -> TapperResult<BoundingBox> {
    let threshold = threshold as f64;
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut found = false;

    for y in 0..img.height {
        for (x, p) in img.row(y).iter().enumerate() {
            if p[0].max(p[1]).max(p[2]) > threshold {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if !found {
        return Err(TapperError::Data(
            "No non-black pixels found. Try lowering --thr or use a cropped image.".to_string(),
        ));
    }

    Ok(BoundingBox {
        x0: min_x,
        y0: min_y,
        x1: max_x + 1,
        y1: max_y + 1,
    })
}
