//! Reference template loading

use crate::config::{PreprocessConfig, TemplateConfig};
use crate::error::DetectionError;
use crate::processing::FramePreprocessor;
use opencv::{
    core::{Mat, Point, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Reference glyph: the largest outline of the preprocessed template image
pub struct Template {
    name: String,
    contour: Vector<Point>,
    image: Mat,
}

impl Template {
    /// `<dir>/<name>.png`, or `<dir>/<fallback>.png` when the first is missing
    pub fn resolve_path(config: &TemplateConfig) -> Result<PathBuf, DetectionError> {
        let primary = config.dir.join(format!("{}.png", config.name));
        if primary.is_file() {
            return Ok(primary);
        }

        let fallback = config.dir.join(format!("{}.png", config.fallback));
        if fallback.is_file() {
            warn!("Template {} not found, falling back to {}", primary.display(), fallback.display());
            return Ok(fallback);
        }

        Err(DetectionError::Template(format!(
            "No template at {} or {}",
            primary.display(),
            fallback.display()
        )))
    }

    /// Load and preprocess a template image from disk
    pub fn load(path: impl AsRef<Path>, preprocess: &PreprocessConfig) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| DetectionError::Template(format!("Non UTF-8 template path: {}", path.display())))?;

        let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            return Err(DetectionError::Template(format!("Could not read template {}", path.display())));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("template")
            .to_string();
        let template = Self::from_image(name, image, preprocess)?;
        info!("Loaded template {} ({} contour points)", path.display(), template.contour.len());
        Ok(template)
    }

    pub fn from_image(name: impl Into<String>, image: Mat, preprocess: &PreprocessConfig) -> Result<Self, DetectionError> {
        if image.empty() {
            return Err(DetectionError::Template("Template image is empty".to_string()));
        }

        let mask = FramePreprocessor::new(preprocess.clone())
            .mask(&image)
            .map_err(|e| DetectionError::Template(format!("Template preprocessing failed: {}", e)))?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut largest: Option<(f64, Vector<Point>)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if largest.as_ref().map_or(true, |(best, _)| area > *best) {
                largest = Some((area, contour));
            }
        }

        let (_, contour) = largest.ok_or_else(|| DetectionError::Template("No contour in template image".to_string()))?;

        Ok(Self {
            name: name.into(),
            contour,
            image,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contour(&self) -> &Vector<Point> {
        &self.contour
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }
}
