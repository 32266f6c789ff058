//! Edge mask used by template matching

use crate::config::PreprocessConfig;
use crate::error::DetectionError;
use opencv::{
    core::{self, Mat, Point, Size},
    imgproc,
    prelude::*,
};

/// Converts a color frame into a closed binary edge mask.
///
/// grayscale -> CLAHE -> Gaussian blur -> Canny -> morphological close.
/// Holds no state between calls.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    config: PreprocessConfig,
}

impl FramePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Compute the edge mask of `frame`
    pub fn mask(&self, frame: &Mat) -> Result<Mat, DetectionError> {
        let gray = to_gray(frame)?;
        let enhanced = equalize(&gray, self.config.clahe_clip_limit, self.config.clahe_tile_grid)?;

        let mut blurred = Mat::default();
        let k = self.config.blur_kernel;
        imgproc::gaussian_blur(&enhanced, &mut blurred, Size::new(k, k), 0.0, 0.0, core::BORDER_DEFAULT)?;

        let mut edges = Mat::default();
        imgproc::canny(&blurred, &mut edges, self.config.canny_low, self.config.canny_high, 3, false)?;

        let kernel = elliptical_kernel(self.config.close_kernel)?;
        morph(&edges, imgproc::MORPH_CLOSE, &kernel, self.config.close_iterations)
    }
}

/// Single-channel copy of `frame`, whatever its channel count
pub(crate) fn to_gray(frame: &Mat) -> Result<Mat, DetectionError> {
    if frame.empty() {
        return Err(DetectionError::Processing("Empty frame".to_string()));
    }
    let mut gray = Mat::default();
    match frame.channels() {
        1 => gray = frame.try_clone()?,
        3 => imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?,
        4 => imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGRA2GRAY, 0)?,
        n => {
            return Err(DetectionError::Processing(format!("Unsupported channel count: {}", n)));
        }
    }
    Ok(gray)
}

/// Tile-wise clipped histogram equalization
pub(crate) fn equalize(gray: &Mat, clip_limit: f64, tiles: i32) -> Result<Mat, DetectionError> {
    let mut clahe = imgproc::create_clahe(clip_limit, Size::new(tiles, tiles))?;
    let mut enhanced = Mat::default();
    clahe.apply(gray, &mut enhanced)?;
    Ok(enhanced)
}

pub(crate) fn elliptical_kernel(size: i32) -> Result<Mat, DetectionError> {
    Ok(imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        Size::new(size, size),
        Point::new(-1, -1),
    )?)
}

pub(crate) fn morph(src: &Mat, op: i32, kernel: &Mat, iterations: i32) -> Result<Mat, DetectionError> {
    let mut dst = Mat::default();
    imgproc::morphology_ex(
        src,
        &mut dst,
        op,
        kernel,
        Point::new(-1, -1),
        iterations,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(dst)
}
