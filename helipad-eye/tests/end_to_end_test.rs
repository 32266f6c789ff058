//! Full detection cycle on synthetic frames

mod common;

use common::{black, draw_h, glyph_template, pad_frame, OUTER_RADIUS, PAD_CENTER};
use helipad_eye::config::RingConfig;
use helipad_eye::processing::CircleDetector;
use helipad_eye::{DetectionStage, LandingConfig, ShapeKind};
use opencv::prelude::*;

fn seeded_config() -> LandingConfig {
    let mut config = LandingConfig::default();
    config.circles.ring = RingConfig {
        seed: Some(2024),
        ..RingConfig::default()
    };
    config
}

fn distance(a: (f32, f32), b: (i32, i32)) -> f32 {
    ((a.0 - b.0 as f32).powi(2) + (a.1 - b.1 as f32).powi(2)).sqrt()
}

#[test]
fn test_pad_frame_yields_one_ring() {
    let mut detector = CircleDetector::new(seeded_config().circles);
    let candidates = detector.detect(&pad_frame()).unwrap();
    assert_eq!(candidates.len(), 1);
    match candidates[0].kind {
        ShapeKind::Ring { center, radius_outer, radius_inner } => {
            assert!(distance(center, PAD_CENTER) < 5.0);
            let width = radius_outer - radius_inner;
            assert!(width > 10.0 && width < 80.0);
        }
        other => panic!("expected a ring, got {:?}", other),
    }
}

#[test]
fn test_pad_frame_yields_match_inside_ring() {
    let config = seeded_config();
    let mut stage = DetectionStage::with_template(glyph_template(), &config);
    let result = stage.process(&pad_frame()).unwrap();

    assert_eq!(result.candidates_found, 1);
    let candidate = result.candidate.unwrap();
    assert!(candidate.is_ring());

    let m = result.shape_match.expect("glyph should match");
    let c = m.center();
    assert!(distance((c.x as f32, c.y as f32), PAD_CENTER) <= OUTER_RADIUS as f32);
    assert!(m.similarity < 0.5);
    assert!(m.aspect_ratio >= 0.4 && m.aspect_ratio <= 1.8);

    assert_eq!(result.annotated.rows(), 480);
    assert_eq!(result.mask.cols(), 640);
    assert!(!result.escalated);
}

#[test]
fn test_glyph_without_pad_uses_full_frame() {
    let mut frame = black(480, 640);
    draw_h(&mut frame, 400, 100, 90);
    let mut stage = DetectionStage::with_template(glyph_template(), &seeded_config());
    let result = stage.process(&frame).unwrap();
    assert_eq!(result.candidates_found, 0);
    assert!(result.candidate.is_none());
    let m = result.shape_match.expect("full-frame fallback should find the glyph");
    let c = m.center();
    assert!((c.x - 445).abs() <= 5);
    assert!((c.y - 145).abs() <= 5);
}

#[test]
fn test_guidance_after_stable_detection() {
    let mut stage = DetectionStage::with_template(glyph_template(), &seeded_config());
    let frame = pad_frame();
    let mut last = None;
    for _ in 0..7 {
        last = Some(stage.process(&frame).unwrap());
    }
    let result = last.unwrap();
    assert!(result.stable);
    let guidance = result.guidance.unwrap();
    assert!(guidance.inside_pad);
    assert!(guidance.is_centered());
    assert_eq!(guidance.to_string(), "CENTER");
}

#[test]
fn test_empty_scene_reports_nothing() {
    let mut stage = DetectionStage::with_template(glyph_template(), &seeded_config());
    let result = stage.process(&black(480, 640)).unwrap();
    assert!(result.shape_match.is_none());
    assert!(result.candidate.is_none());
    assert!(result.guidance.is_none());
    assert_eq!(stage.misses(), 1);
}
