//! Synthetic scenes shared by the integration tests

#![allow(dead_code)]

use helipad_eye::config::PreprocessConfig;
use helipad_eye::Template;
use opencv::{
    core::{Mat, Point, Rect, Scalar, CV_8UC3},
    imgproc,
};

pub const PAD_CENTER: (i32, i32) = (320, 240);
pub const OUTER_RADIUS: i32 = 100;
pub const INNER_RADIUS: i32 = 70;

pub fn black(rows: i32, cols: i32) -> Mat {
    Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0)).unwrap()
}

/// White H of side `size` with bars a third of the side, top-left at (x, y)
pub fn draw_h(img: &mut Mat, x: i32, y: i32, size: i32) {
    let bar = size / 3;
    for rect in [
        Rect::new(x, y, bar, size),
        Rect::new(x + size - bar, y, bar, size),
        Rect::new(x + bar, y + bar, bar, bar),
    ] {
        imgproc::rectangle(img, rect, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
    }
}

/// 480x640 black frame with a white ring and a 60x60 H at its center
pub fn pad_frame() -> Mat {
    let mut frame = black(480, 640);
    let center = Point::new(PAD_CENTER.0, PAD_CENTER.1);
    imgproc::circle(&mut frame, center, OUTER_RADIUS, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
    imgproc::circle(&mut frame, center, INNER_RADIUS, Scalar::all(0.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
    draw_h(&mut frame, PAD_CENTER.0 - 30, PAD_CENTER.1 - 30, 60);
    frame
}

pub fn glyph_image() -> Mat {
    let mut image = black(200, 200);
    draw_h(&mut image, 40, 40, 120);
    image
}

pub fn glyph_template() -> Template {
    Template::from_image("H", glyph_image(), &PreprocessConfig::default()).unwrap()
}
