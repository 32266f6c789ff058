//! Circle, ellipse and ring candidates from a blob mask

use crate::config::CircleConfig;
use crate::error::DetectionError;
use crate::processing::preprocess::{elliptical_kernel, equalize, morph, to_gray};
use crate::processing::ring::RingFitter;
use crate::shapes::{BoundingBox, ShapeCandidate, ShapeKind};
use opencv::{
    core::{self, Mat, Point, Point2f, Size, Vec4i, Vector},
    imgproc,
    prelude::*,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

/// Circularity `4*pi*area / perimeter^2`; `None` for a zero perimeter
pub fn circularity(area: f64, perimeter: f64) -> Option<f64> {
    if perimeter <= 0.0 || !perimeter.is_finite() {
        return None;
    }
    Some(4.0 * std::f64::consts::PI * area / (perimeter * perimeter))
}

/// Finds round blobs and classifies each as ring, ellipse or circle.
///
/// Owns its RNG for the RANSAC ring fit, so it is driven through `&mut self`
/// by a single detection stage.
pub struct CircleDetector {
    config: CircleConfig,
    ring_fitter: RingFitter,
    rng: StdRng,
}

impl CircleDetector {
    pub fn new(config: CircleConfig) -> Self {
        let rng = match config.ring.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            ring_fitter: RingFitter::new(config.ring.clone()),
            config,
            rng,
        }
    }

    /// Blob mask: blur -> CLAHE -> bilateral denoise -> Otsu threshold -> close -> open
    pub fn blob_mask(&self, frame: &Mat) -> Result<Mat, DetectionError> {
        let gray = to_gray(frame)?;

        let mut blurred = Mat::default();
        let k = self.config.blur_kernel;
        imgproc::gaussian_blur(&gray, &mut blurred, Size::new(k, k), 0.0, 0.0, core::BORDER_DEFAULT)?;

        let enhanced = equalize(&blurred, self.config.clahe_clip_limit, self.config.clahe_tile_grid)?;

        let mut denoised = Mat::default();
        imgproc::bilateral_filter(
            &enhanced,
            &mut denoised,
            self.config.bilateral_diameter,
            self.config.bilateral_sigma,
            self.config.bilateral_sigma,
            core::BORDER_DEFAULT,
        )?;

        // Otsu picks 0 on a flat image, which would turn the whole frame into one blob
        let mut min_val = 0.0;
        let mut max_val = 0.0;
        core::min_max_loc(&denoised, Some(&mut min_val), Some(&mut max_val), None, None, &Mat::default())?;
        if max_val - min_val < 1.0 {
            return Ok(Mat::new_rows_cols_with_default(
                denoised.rows(),
                denoised.cols(),
                core::CV_8UC1,
                core::Scalar::all(0.0),
            )?);
        }

        let polarity = if self.config.invert_threshold {
            imgproc::THRESH_BINARY_INV
        } else {
            imgproc::THRESH_BINARY
        };
        let mut binary = Mat::default();
        imgproc::threshold(&denoised, &mut binary, 0.0, 255.0, polarity | imgproc::THRESH_OTSU)?;

        let kernel = elliptical_kernel(self.config.morph_kernel)?;
        let closed = morph(&binary, imgproc::MORPH_CLOSE, &kernel, self.config.close_iterations)?;
        morph(&closed, imgproc::MORPH_OPEN, &kernel, self.config.open_iterations)
    }

    /// Candidates in `frame`, largest area first
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<ShapeCandidate>, DetectionError> {
        let mask = self.blob_mask(frame)?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        let mut hierarchy: Vector<Vec4i> = Vector::new();
        imgproc::find_contours_with_hierarchy(
            &mask,
            &mut contours,
            &mut hierarchy,
            imgproc::RETR_TREE,
            imgproc::CHAIN_APPROX_NONE,
            Point::new(0, 0),
        )?;

        let contours = contours.to_vec();
        let hierarchy = hierarchy.to_vec();
        let (width, height) = (frame.cols(), frame.rows());

        let mut candidates = Vec::new();
        for (idx, contour) in contours.iter().enumerate() {
            // [next, previous, first_child, parent]; blobs nested in a hole are not pads
            if hierarchy[idx].0[3] >= 0 {
                continue;
            }
            let holes = hole_points(idx, &contours, &hierarchy);
            match self.classify(contour, &holes, width, height) {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(e) => warn!("Skipping contour {}: {}", idx, e),
            }
        }

        candidates.sort_by(|a, b| b.area.partial_cmp(&a.area).unwrap_or(std::cmp::Ordering::Equal));
        debug!("Circle detector: {} candidates from {} contours", candidates.len(), contours.len());
        Ok(candidates)
    }

    fn classify(
        &mut self,
        contour: &Vector<Point>,
        holes: &[Point2f],
        width: i32,
        height: i32,
    ) -> Result<Option<ShapeCandidate>, DetectionError> {
        if contour.len() < self.config.min_points {
            return Ok(None);
        }
        let area = imgproc::contour_area(contour, false)?;
        if area < self.config.min_area {
            return Ok(None);
        }
        let perimeter = imgproc::arc_length(contour, true)?;
        let Some(circularity) = circularity(area, perimeter) else {
            return Ok(None);
        };
        if circularity < self.config.min_circularity {
            return Ok(None);
        }

        let boundary: Vec<Point2f> = contour
            .iter()
            .map(|p| Point2f::new(p.x as f32, p.y as f32))
            .collect();

        if let Some(ring) = self.ring_fitter.fit(&boundary, holes, &mut self.rng) {
            let radius_outer = ring.outer.radius as f32;
            let center = ring.outer.center();
            let half = radius_outer * (1.0 + self.config.ring_padding as f32);
            return Ok(Some(ShapeCandidate {
                kind: ShapeKind::Ring {
                    center: (center.x, center.y),
                    radius_outer,
                    radius_inner: ring.inner.radius as f32,
                },
                bounding_box: BoundingBox::around(center, half, width, height),
                area,
                circularity,
            }));
        }

        if contour.len() >= 5 {
            let ellipse = imgproc::fit_ellipse(contour)?;
            let (axis_a, axis_b) = (ellipse.size.width, ellipse.size.height);
            let (major, minor) = (axis_a.max(axis_b), axis_a.min(axis_b));
            if minor > 0.0 && (major / minor) < self.config.max_ellipse_ratio as f32 {
                let pad = major * self.config.ellipse_padding as f32;
                return Ok(Some(ShapeCandidate {
                    kind: ShapeKind::Ellipse {
                        center: (ellipse.center.x, ellipse.center.y),
                        axes: (axis_a, axis_b),
                        angle: ellipse.angle,
                    },
                    bounding_box: BoundingBox::spanning(
                        ellipse.center,
                        axis_a / 2.0 + pad,
                        axis_b / 2.0 + pad,
                        width,
                        height,
                    ),
                    area,
                    circularity,
                }));
            }
        }

        let mut center = Point2f::default();
        let mut radius = 0.0f32;
        imgproc::min_enclosing_circle(contour, &mut center, &mut radius)?;
        let half = radius * (1.0 + self.config.circle_padding as f32);
        Ok(Some(ShapeCandidate {
            kind: ShapeKind::Circle {
                center: (center.x, center.y),
                radius,
            },
            bounding_box: BoundingBox::around(center, half, width, height),
            area,
            circularity,
        }))
    }
}

/// Points of every hole directly inside outermost contour `idx`
fn hole_points(idx: usize, contours: &[Vector<Point>], hierarchy: &[Vec4i]) -> Vec<Point2f> {
    let mut points = Vec::new();
    let mut child = hierarchy[idx].0[2];
    while child >= 0 {
        let c = child as usize;
        points.extend(contours[c].iter().map(|p| Point2f::new(p.x as f32, p.y as f32)));
        child = hierarchy[c].0[0];
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingConfig;
    use opencv::core::{Rect, Scalar, CV_8UC3};

    fn black(rows: i32, cols: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn seeded() -> CircleDetector {
        CircleDetector::new(CircleConfig {
            ring: RingConfig {
                seed: Some(42),
                ..RingConfig::default()
            },
            ..CircleConfig::default()
        })
    }

    fn disk(frame: &mut Mat, center: Point, radius: i32, value: f64) {
        imgproc::circle(frame, center, radius, Scalar::all(value), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
    }

    #[test]
    fn test_circularity_of_circle_and_square() {
        let r: f64 = 50.0;
        let c = circularity(std::f64::consts::PI * r * r, 2.0 * std::f64::consts::PI * r).unwrap();
        assert!((c - 1.0).abs() < 1e-9);
        let square = circularity(100.0 * 100.0, 400.0).unwrap();
        assert!((square - std::f64::consts::PI / 4.0).abs() < 1e-9);
        assert!(circularity(10.0, 0.0).is_none());
    }

    #[test]
    fn test_empty_frame_yields_nothing() {
        let mut detector = seeded();
        assert!(detector.detect(&black(480, 640)).unwrap().is_empty());
    }

    #[test]
    fn test_filled_disk_is_a_circle_or_ellipse() {
        let mut frame = black(480, 640);
        disk(&mut frame, Point::new(320, 240), 90, 255.0);
        let mut detector = seeded();
        let candidates = detector.detect(&frame).unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert!(!c.is_ring());
        assert!((c.center().x - 320.0).abs() < 3.0);
        assert!((c.center().y - 240.0).abs() < 3.0);
        assert!(c.circularity >= 0.65);
    }

    #[test]
    fn test_ring_is_detected() {
        let mut frame = black(480, 640);
        disk(&mut frame, Point::new(320, 240), 100, 255.0);
        disk(&mut frame, Point::new(320, 240), 70, 0.0);
        let mut detector = seeded();
        let candidates = detector.detect(&frame).unwrap();
        assert_eq!(candidates.len(), 1);
        match candidates[0].kind {
            ShapeKind::Ring { center, radius_outer, radius_inner } => {
                assert!((center.0 - 320.0).abs() < 5.0);
                assert!((center.1 - 240.0).abs() < 5.0);
                assert!(radius_outer > radius_inner);
            }
            other => panic!("expected ring, got {:?}", other),
        }
    }

    #[test]
    fn test_blob_inside_ring_hole_is_not_a_second_candidate() {
        let mut frame = black(480, 640);
        disk(&mut frame, Point::new(320, 240), 100, 255.0);
        disk(&mut frame, Point::new(320, 240), 70, 0.0);
        // Bullseye centre, large enough to pass the area filter on its own
        disk(&mut frame, Point::new(320, 240), 55, 255.0);
        let mut detector = seeded();
        let candidates = detector.detect(&frame).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].area > std::f64::consts::PI * 90.0 * 90.0);
        assert!((candidates[0].center().x - 320.0).abs() < 5.0);
    }

    #[test]
    fn test_elongated_blob_is_not_a_candidate() {
        // 400x40 bar: circularity ~0.29
        let mut frame = black(480, 640);
        imgproc::rectangle(
            &mut frame,
            Rect::new(100, 200, 400, 40),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        let mut detector = seeded();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_small_disk_is_below_min_area() {
        let mut frame = black(480, 640);
        disk(&mut frame, Point::new(320, 240), 40, 255.0);
        let mut detector = seeded();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_sorted_by_area() {
        let mut frame = black(480, 900);
        disk(&mut frame, Point::new(200, 240), 60, 255.0);
        disk(&mut frame, Point::new(600, 240), 110, 255.0);
        let mut detector = seeded();
        let candidates = detector.detect(&frame).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].area > candidates[1].area);
        assert!((candidates[0].center().x - 600.0).abs() < 3.0);
    }
}
