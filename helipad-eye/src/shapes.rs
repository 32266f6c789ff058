//! Shape candidates and template matches produced per detection cycle

use opencv::core::{Point, Point2f, Rect};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Square around `center` with half-side `half_extent`, clipped to the image
    pub fn around(center: Point2f, half_extent: f32, image_width: i32, image_height: i32) -> Self {
        Self::spanning(center, half_extent, half_extent, image_width, image_height)
    }

    /// Box around `center` with independent half-width and half-height, clipped to the image
    pub fn spanning(
        center: Point2f,
        half_width: f32,
        half_height: f32,
        image_width: i32,
        image_height: i32,
    ) -> Self {
        let x0 = ((center.x - half_width) as i32).max(0);
        let y0 = ((center.y - half_height) as i32).max(0);
        let x1 = ((center.x + half_width) as i32).min(image_width);
        let y1 = ((center.y + half_height) as i32).min(image_height);
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Shift by (dx, dy), e.g. from crop coordinates back to the full frame
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl From<Rect> for BoundingBox {
    fn from(rect: Rect) -> Self {
        Self::new(rect.x, rect.y, rect.width, rect.height)
    }
}

/// Variant-specific geometry of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    Circle {
        center: (f32, f32),
        radius: f32,
    },
    Ellipse {
        center: (f32, f32),
        /// Full axis lengths as reported by the ellipse fit
        axes: (f32, f32),
        angle: f32,
    },
    Ring {
        center: (f32, f32),
        radius_outer: f32,
        radius_inner: f32,
    },
}

/// A circular, elliptical or ring-shaped region found in a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeCandidate {
    pub kind: ShapeKind,
    pub bounding_box: BoundingBox,
    pub area: f64,
    pub circularity: f64,
}

impl ShapeCandidate {
    pub fn center(&self) -> Point2f {
        let (x, y) = match self.kind {
            ShapeKind::Circle { center, .. } => center,
            ShapeKind::Ellipse { center, .. } => center,
            ShapeKind::Ring { center, .. } => center,
        };
        Point2f::new(x, y)
    }

    /// Radius that encloses the marker: outer radius for rings, larger semi-axis for ellipses
    pub fn enclosing_radius(&self) -> f32 {
        match self.kind {
            ShapeKind::Circle { radius, .. } => radius,
            ShapeKind::Ellipse { axes, .. } => axes.0.max(axes.1) / 2.0,
            ShapeKind::Ring { radius_outer, .. } => radius_outer,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        let center = self.center();
        let dx = point.x as f32 - center.x;
        let dy = point.y as f32 - center.y;
        (dx * dx + dy * dy).sqrt() <= self.enclosing_radius()
    }

    pub fn is_ring(&self) -> bool {
        matches!(self.kind, ShapeKind::Ring { .. })
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Ellipse { .. } => "ellipse",
            ShapeKind::Ring { .. } => "ring",
        }
    }
}

/// Best template match of a cycle. Lower similarity is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeMatch {
    pub bounding_box: BoundingBox,
    pub similarity: f64,
    pub area: f64,
    pub aspect_ratio: f64,
}

impl ShapeMatch {
    pub fn center(&self) -> Point {
        self.bounding_box.center()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            bounding_box: self.bounding_box.translated(dx, dy),
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(cx: f32, cy: f32, outer: f32, inner: f32) -> ShapeCandidate {
        ShapeCandidate {
            kind: ShapeKind::Ring {
                center: (cx, cy),
                radius_outer: outer,
                radius_inner: inner,
            },
            bounding_box: BoundingBox::new(0, 0, 10, 10),
            area: 1.0,
            circularity: 0.9,
        }
    }

    #[test]
    fn test_bounding_box_around_clips_to_image() {
        let bbox = BoundingBox::around(Point2f::new(20.0, 300.0), 50.0, 640, 320);
        assert_eq!(bbox.x, 0);
        assert_eq!(bbox.y, 250);
        assert_eq!(bbox.width, 70);
        assert_eq!(bbox.height, 70);
    }

    #[test]
    fn test_bounding_box_outside_image_is_empty() {
        let bbox = BoundingBox::around(Point2f::new(-500.0, -500.0), 50.0, 640, 480);
        assert!(bbox.is_empty());
        assert_eq!(bbox.area(), 0);
    }

    #[test]
    fn test_translated_match_keeps_score() {
        let m = ShapeMatch {
            bounding_box: BoundingBox::new(10, 20, 30, 40),
            similarity: 0.1,
            area: 900.0,
            aspect_ratio: 0.75,
        };
        let moved = m.translated(100, 200);
        assert_eq!(moved.bounding_box, BoundingBox::new(110, 220, 30, 40));
        assert_eq!(moved.similarity, 0.1);
        assert_eq!(moved.center(), Point::new(125, 240));
    }

    #[test]
    fn test_ring_contains_uses_outer_radius() {
        let candidate = ring(100.0, 100.0, 50.0, 30.0);
        assert!(candidate.contains(Point::new(140, 100)));
        assert!(!candidate.contains(Point::new(160, 100)));
        assert_eq!(candidate.label(), "ring");
    }

    #[test]
    fn test_ellipse_enclosing_radius_is_major_semi_axis() {
        let candidate = ShapeCandidate {
            kind: ShapeKind::Ellipse {
                center: (0.0, 0.0),
                axes: (80.0, 120.0),
                angle: 10.0,
            },
            bounding_box: BoundingBox::new(0, 0, 1, 1),
            area: 1.0,
            circularity: 0.8,
        };
        assert_eq!(candidate.enclosing_radius(), 60.0);
    }
}
