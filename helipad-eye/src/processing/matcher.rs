//! Template matching over edge contours

use crate::config::{AreaBounds, MatcherConfig, PreprocessConfig};
use crate::error::DetectionError;
use crate::overlay;
use crate::processing::preprocess::FramePreprocessor;
use crate::shapes::{BoundingBox, ShapeMatch};
use crate::template::Template;
use opencv::{
    core::{Mat, Point, Rect, Vector},
    imgproc,
    prelude::*,
};
use tracing::debug;

/// Best match of one call plus a copy of the input with the match drawn on it
pub struct MatchOutcome {
    pub best: Option<ShapeMatch>,
    pub annotated: Mat,
}

/// Cross-checked similarity: `min(m1, m2)` if it is under `threshold` and
/// neither metric reaches `threshold * factor`.
pub fn dual_metric(m1: f64, m2: f64, threshold: f64, factor: f64) -> Option<f64> {
    let similarity = m1.min(m2);
    if similarity < threshold && m1.max(m2) < threshold * factor {
        Some(similarity)
    } else {
        None
    }
}

/// Lowest similarity wins
pub fn select_best(matches: impl IntoIterator<Item = ShapeMatch>) -> Option<ShapeMatch> {
    matches
        .into_iter()
        .min_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal))
}

/// Matches contours of an image region against a reference glyph
pub struct ShapeMatcher {
    template: Template,
    config: MatcherConfig,
    preprocessor: FramePreprocessor,
}

impl ShapeMatcher {
    pub fn new(template: Template, config: MatcherConfig, preprocess: PreprocessConfig) -> Self {
        Self {
            template,
            config,
            preprocessor: FramePreprocessor::new(preprocess),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Top-1 match in `image`, coordinates relative to `image`
    pub fn best_match(&self, image: &Mat, bounds: AreaBounds) -> Result<Option<ShapeMatch>, DetectionError> {
        let mask = self.preprocessor.mask(image)?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &mask,
            &mut contours,
            imgproc::RETR_LIST,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let (width, height) = (image.cols(), image.rows());
        let (min_area, max_area) = bounds.resolve(width as f64 * height as f64);

        let mut accepted = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area < min_area || area > max_area {
                continue;
            }
            let rect = imgproc::bounding_rect(&contour)?;
            if !self.passes_geometry(&rect, width, height) {
                continue;
            }

            let m1 = imgproc::match_shapes(&contour, self.template.contour(), imgproc::CONTOURS_MATCH_I1, 0.0)?;
            let m2 = imgproc::match_shapes(&contour, self.template.contour(), imgproc::CONTOURS_MATCH_I2, 0.0)?;
            if let Some(similarity) = dual_metric(m1, m2, self.config.threshold, self.config.cross_check_factor) {
                accepted.push(ShapeMatch {
                    bounding_box: BoundingBox::from(rect),
                    similarity,
                    area,
                    aspect_ratio: rect.width as f64 / rect.height as f64,
                });
            }
        }

        debug!("Matcher: {} of {} contours accepted", accepted.len(), contours.len());
        Ok(select_best(accepted))
    }

    /// Top-1 match with an annotated copy of `image`
    pub fn find(&self, image: &Mat, bounds: AreaBounds) -> Result<MatchOutcome, DetectionError> {
        let best = self.best_match(image, bounds)?;
        let mut annotated = image.try_clone()?;
        if let Some(m) = &best {
            overlay::annotate_match(&mut annotated, m, self.template.name())?;
        }
        Ok(MatchOutcome { best, annotated })
    }

    /// Match inside `region` of `frame`, returned in frame coordinates.
    /// A degenerate region yields no match.
    pub fn find_in_region(&self, frame: &Mat, region: &BoundingBox) -> Result<Option<ShapeMatch>, DetectionError> {
        if region.is_empty() {
            debug!("Skipping empty region {:?}", region);
            return Ok(None);
        }
        let crop = Mat::roi(frame, region.to_rect())?.try_clone()?;
        let found = self.best_match(&crop, self.config.roi_area)?;
        Ok(found.map(|m| m.translated(region.x, region.y)))
    }

    /// Match over the whole frame
    pub fn find_in_frame(&self, frame: &Mat) -> Result<Option<ShapeMatch>, DetectionError> {
        self.best_match(frame, self.config.frame_area)
    }

    fn passes_geometry(&self, rect: &Rect, width: i32, height: i32) -> bool {
        let margin = self.config.border_margin;
        if rect.x < margin || rect.y < margin || rect.x + rect.width > width - margin || rect.y + rect.height > height - margin {
            return false;
        }
        if rect.width < self.config.min_side || rect.height < self.config.min_side {
            return false;
        }
        let aspect = rect.width as f64 / rect.height as f64;
        aspect >= self.config.min_aspect && aspect <= self.config.max_aspect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    fn h_glyph(img: &mut Mat, x: i32, y: i32, size: i32) {
        let bar = size / 3;
        for rect in [
            Rect::new(x, y, bar, size),
            Rect::new(x + size - bar, y, bar, size),
            Rect::new(x + bar, y + bar, bar, bar),
        ] {
            imgproc::rectangle(img, rect, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
        }
    }

    /// H with a short right leg and the crossbar moved to the top
    fn bent_glyph(img: &mut Mat, x: i32, y: i32, size: i32) {
        let bar = size / 3;
        for rect in [
            Rect::new(x, y, bar, size),
            Rect::new(x + size - bar, y, bar, size / 2),
            Rect::new(x + bar, y, size - 2 * bar, bar),
        ] {
            imgproc::rectangle(img, rect, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
        }
    }

    fn canvas(rows: i32, cols: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn matcher() -> ShapeMatcher {
        let mut reference = canvas(200, 200);
        h_glyph(&mut reference, 40, 40, 120);
        let template = Template::from_image("H", reference, &PreprocessConfig::default()).unwrap();
        ShapeMatcher::new(template, MatcherConfig::default(), PreprocessConfig::default())
    }

    fn m(similarity: f64) -> ShapeMatch {
        ShapeMatch {
            bounding_box: BoundingBox::new(0, 0, 40, 40),
            similarity,
            area: 1000.0,
            aspect_ratio: 1.0,
        }
    }

    #[test]
    fn test_single_unstable_metric_is_rejected() {
        assert_eq!(dual_metric(0.3, 0.9, 0.5, 1.5), None);
        assert_eq!(dual_metric(0.9, 0.3, 0.5, 1.5), None);
    }

    #[test]
    fn test_dual_metric_accepts_consistent_pair() {
        assert_eq!(dual_metric(0.3, 0.7, 0.5, 1.5), Some(0.3));
        assert_eq!(dual_metric(0.5, 0.6, 0.5, 1.5), None);
        assert_eq!(dual_metric(0.1, 0.75, 0.5, 1.5), None);
    }

    #[test]
    fn test_select_best_is_minimum_similarity() {
        let best = select_best(vec![m(0.4), m(0.05), m(0.2)]).unwrap();
        assert_eq!(best.similarity, 0.05);
        assert!(select_best(Vec::new()).is_none());
    }

    #[test]
    fn test_finds_scaled_glyph() {
        let mut frame = canvas(300, 300);
        h_glyph(&mut frame, 120, 120, 60);
        let found = matcher().find_in_frame(&frame).unwrap().unwrap();
        let center = found.center();
        assert!((center.x - 150).abs() <= 4);
        assert!((center.y - 150).abs() <= 4);
        assert!(found.similarity < 0.5);
        assert!(found.aspect_ratio >= 0.4 && found.aspect_ratio <= 1.8);
    }

    #[test]
    fn test_closest_glyph_wins_over_distorted_one() {
        let matcher = matcher();
        let bounds = MatcherConfig::default().frame_area;

        let mut frame = canvas(300, 480);
        bent_glyph(&mut frame, 60, 100, 90);
        h_glyph(&mut frame, 330, 100, 90);
        let best = matcher.best_match(&frame, bounds).unwrap().unwrap();
        let center = best.center();
        assert!((center.x - 375).abs() <= 4);
        assert!((center.y - 145).abs() <= 4);

        // Alone, the distorted glyph is rejected or scores worse
        let mut bent_only = canvas(300, 480);
        bent_glyph(&mut bent_only, 60, 100, 90);
        if let Some(bent) = matcher.best_match(&bent_only, bounds).unwrap() {
            assert!(bent.similarity > best.similarity);
        }
    }

    #[test]
    fn test_glyph_near_border_is_ignored() {
        let mut frame = canvas(300, 300);
        h_glyph(&mut frame, 5, 5, 60);
        assert!(matcher().find_in_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn test_blank_region_has_no_match() {
        let frame = canvas(300, 300);
        assert!(matcher().find_in_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn test_region_match_is_translated_to_frame() {
        let mut frame = canvas(480, 640);
        h_glyph(&mut frame, 400, 300, 60);
        let region = BoundingBox::new(330, 230, 200, 200);
        let found = matcher().find_in_region(&frame, &region).unwrap().unwrap();
        let center = found.center();
        assert!((center.x - 430).abs() <= 4);
        assert!((center.y - 330).abs() <= 4);
    }

    #[test]
    fn test_empty_region_is_not_an_error() {
        let frame = canvas(100, 100);
        let region = BoundingBox::new(50, 50, 0, 20);
        assert!(matcher().find_in_region(&frame, &region).unwrap().is_none());
    }

    #[test]
    fn test_find_returns_annotated_copy() {
        let mut frame = canvas(300, 300);
        h_glyph(&mut frame, 120, 120, 60);
        let outcome = matcher().find(&frame, MatcherConfig::default().frame_area).unwrap();
        assert!(outcome.best.is_some());
        assert_eq!(outcome.annotated.rows(), 300);
        assert_eq!(outcome.annotated.cols(), 300);
    }
}
