//! Drawing helpers for annotated frames

use crate::error::DetectionError;
use crate::guidance::Guidance;
use crate::shapes::{ShapeCandidate, ShapeKind, ShapeMatch};
use opencv::{
    core::{Mat, Point, Scalar, Size},
    imgproc,
    prelude::*,
};

// BGR
pub const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
pub const MAGENTA: (f64, f64, f64) = (255.0, 0.0, 255.0);
pub const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);
pub const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);
pub const BLUE: (f64, f64, f64) = (255.0, 0.0, 0.0);

fn color(c: (f64, f64, f64)) -> Scalar {
    Scalar::new(c.0, c.1, c.2, 0.0)
}

fn text(img: &mut Mat, label: &str, origin: Point, scale: f64, c: (f64, f64, f64)) -> Result<(), DetectionError> {
    imgproc::put_text(
        img,
        label,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color(c),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Outline and center of a pad candidate; yellow when found by escalation
pub fn annotate_candidate(img: &mut Mat, candidate: &ShapeCandidate, escalated: bool) -> Result<(), DetectionError> {
    let c = if escalated { YELLOW } else { MAGENTA };
    let center = candidate.center();
    let center_px = Point::new(center.x.round() as i32, center.y.round() as i32);

    match candidate.kind {
        ShapeKind::Circle { radius, .. } => {
            imgproc::circle(img, center_px, radius.round() as i32, color(c), 2, imgproc::LINE_8, 0)?;
        }
        ShapeKind::Ring { radius_outer, radius_inner, .. } => {
            imgproc::circle(img, center_px, radius_outer.round() as i32, color(c), 2, imgproc::LINE_8, 0)?;
            imgproc::circle(img, center_px, radius_inner.round() as i32, color(c), 1, imgproc::LINE_8, 0)?;
        }
        ShapeKind::Ellipse { axes, angle, .. } => {
            let half_axes = Size::new((axes.0 / 2.0).round() as i32, (axes.1 / 2.0).round() as i32);
            imgproc::ellipse(img, center_px, half_axes, angle as f64, 0.0, 360.0, color(c), 2, imgproc::LINE_8, 0)?;
        }
    }
    imgproc::circle(img, center_px, 4, color(c), imgproc::FILLED, imgproc::LINE_8, 0)?;
    Ok(())
}

/// Green box with `<label> (<similarity>)`
pub fn annotate_match(img: &mut Mat, m: &ShapeMatch, label: &str) -> Result<(), DetectionError> {
    let rect = m.bounding_box.to_rect();
    imgproc::rectangle(img, rect, color(GREEN), 2, imgproc::LINE_8, 0)?;
    let origin = Point::new(rect.x, (rect.y - 8).max(12));
    text(img, &format!("{} ({:.2})", label, m.similarity), origin, 0.6, GREEN)
}

fn cross(img: &mut Mat, at: Point, half: i32, c: (f64, f64, f64)) -> Result<(), DetectionError> {
    imgproc::line(img, Point::new(at.x - half, at.y), Point::new(at.x + half, at.y), color(c), 2, imgproc::LINE_8, 0)?;
    imgproc::line(img, Point::new(at.x, at.y - half), Point::new(at.x, at.y + half), color(c), 2, imgproc::LINE_8, 0)?;
    Ok(())
}

/// Frame-center cross plus either the guidance vector or a searching banner
pub fn draw_guidance(img: &mut Mat, guidance: Option<&Guidance>) -> Result<(), DetectionError> {
    let size = img.size()?;
    let center = Point::new(size.width / 2, size.height / 2);
    cross(img, center, 15, BLUE)?;

    let Some(g) = guidance else {
        return text(img, "Searching...", Point::new(10, 30), 0.8, RED);
    };

    let target = g.target_point();
    cross(img, target, 10, GREEN)?;
    imgproc::line(img, target, center, color(YELLOW), 2, imgproc::LINE_8, 0)?;
    text(img, &format!("Move: {}", g), Point::new(10, 30), 0.8, GREEN)?;
    text(
        img,
        &format!("Offset: ({}, {})", g.offset.0, g.offset.1),
        Point::new(10, 60),
        0.6,
        GREEN,
    )?;
    if !g.inside_pad {
        text(img, "Outside pad", Point::new(10, 90), 0.6, RED)?;
    }
    Ok(())
}
