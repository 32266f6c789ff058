//! RANSAC ring fitting
//!
//! A ring is two roughly concentric circles. Single least-squares circle fits
//! fall apart on partially occluded or noisy arcs, so each trial fits a pair of
//! circles to two minimal 3-point samples and scores the pair by inlier count
//! over the whole point set.

use crate::config::RingConfig;
use nalgebra::{Matrix3, Vector3};
use opencv::core::Point2f;
use rand::Rng;
use tracing::debug;

const MIN_SAMPLE: usize = 3;

/// Circle from an algebraic fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedCircle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

impl FittedCircle {
    pub fn residual(&self, p: &Point2f) -> f64 {
        let dx = p.x as f64 - self.cx;
        let dy = p.y as f64 - self.cy;
        ((dx * dx + dy * dy).sqrt() - self.radius).abs()
    }

    pub fn center_distance(&self, other: &FittedCircle) -> f64 {
        ((self.cx - other.cx).powi(2) + (self.cy - other.cy).powi(2)).sqrt()
    }

    pub fn center(&self) -> Point2f {
        Point2f::new(self.cx as f32, self.cy as f32)
    }
}

/// Accepted ring: `outer` is always the larger circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingFit {
    pub outer: FittedCircle,
    pub inner: FittedCircle,
    pub inliers: usize,
}

impl RingFit {
    pub fn width(&self) -> f64 {
        self.outer.radius - self.inner.radius
    }
}

/// Least-squares circle through `points`.
///
/// Solves `[2x 2y 1] * [a b c]^T = x^2 + y^2`, where (a, b) is the center and
/// `c = r^2 - a^2 - b^2`. Coordinates are centered on their mean first so that
/// the normal equations stay well conditioned. `None` for fewer than three
/// points, collinear points or a non-positive squared radius.
pub fn fit_circle(points: &[Point2f]) -> Option<FittedCircle> {
    if points.len() < MIN_SAMPLE {
        return None;
    }

    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y as f64).sum::<f64>() / n;

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let x = p.x as f64 - mx;
        let y = p.y as f64 - my;
        let row = Vector3::new(2.0 * x, 2.0 * y, 1.0);
        ata += row * row.transpose();
        atb += row * (x * x + y * y);
    }

    let scale = ata.trace();
    if !scale.is_finite() || scale <= 0.0 || ata.determinant().abs() <= 1e-12 * scale.powi(3) {
        return None;
    }
    let solution = ata.try_inverse()? * atb;

    let (a, b, c) = (solution[0], solution[1], solution[2]);
    let r2 = c + a * a + b * b;
    if !r2.is_finite() || r2 <= 0.0 {
        return None;
    }

    Some(FittedCircle {
        cx: a + mx,
        cy: b + my,
        radius: r2.sqrt(),
    })
}

/// Robust concentric-pair fitter
#[derive(Debug, Clone)]
pub struct RingFitter {
    config: RingConfig,
}

impl RingFitter {
    pub fn new(config: RingConfig) -> Self {
        Self { config }
    }

    /// Concentricity and ring-width constraints on a circle pair
    pub fn accepts(&self, a: &FittedCircle, b: &FittedCircle) -> bool {
        let width = (a.radius - b.radius).abs();
        a.center_distance(b) < self.config.max_center_offset
            && width > self.config.min_ring_width
            && width < self.config.max_ring_width
    }

    /// Fit a ring to a boundary and the boundaries of its holes.
    ///
    /// With at least three hole points, one circle is sampled from `boundary`
    /// and the other from `holes`; otherwise both come from `boundary`.
    pub fn fit<R: Rng + ?Sized>(&self, boundary: &[Point2f], holes: &[Point2f], rng: &mut R) -> Option<RingFit> {
        let split = holes.len() >= MIN_SAMPLE && boundary.len() >= MIN_SAMPLE;
        if !split && boundary.len() < 2 * MIN_SAMPLE {
            debug!("Ring fit skipped: {} boundary points", boundary.len());
            return None;
        }

        let mut best: Option<RingFit> = None;

        for _ in 0..self.config.iterations {
            let (first, second) = if split {
                (sample(boundary, MIN_SAMPLE, rng), sample(holes, MIN_SAMPLE, rng))
            } else {
                let mut six = sample(boundary, 2 * MIN_SAMPLE, rng);
                let tail = six.split_off(MIN_SAMPLE);
                (six, tail)
            };

            let (Some(a), Some(b)) = (fit_circle(&first), fit_circle(&second)) else {
                continue;
            };

            let inliers = self.count_inliers(&a, boundary, holes) + self.count_inliers(&b, boundary, holes);
            let improves = inliers > best.as_ref().map_or(0, |r| r.inliers);
            if improves && self.accepts(&a, &b) {
                let (outer, inner) = if a.radius >= b.radius { (a, b) } else { (b, a) };
                best = Some(RingFit { outer, inner, inliers });
            }
        }

        best
    }

    fn count_inliers(&self, circle: &FittedCircle, boundary: &[Point2f], holes: &[Point2f]) -> usize {
        boundary
            .iter()
            .chain(holes.iter())
            .filter(|p| circle.residual(p) < self.config.inlier_threshold)
            .count()
    }
}

fn sample<R: Rng + ?Sized>(points: &[Point2f], amount: usize, rng: &mut R) -> Vec<Point2f> {
    rand::seq::index::sample(rng, points.len(), amount)
        .iter()
        .map(|i| points[i])
        .collect()
}
