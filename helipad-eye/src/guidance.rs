//! Offset of the matched glyph from the frame center

use crate::shapes::ShapeCandidate;
use opencv::core::{Point, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Horizontal {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vertical {
    Up,
    Down,
}

/// Correction the vehicle needs to bring the target onto the frame center.
///
/// Image axes: +x right, +y down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub target: (i32, i32),
    pub frame_center: (i32, i32),
    pub offset: (i32, i32),
    pub horizontal: Option<Horizontal>,
    pub vertical: Option<Vertical>,
    /// Target lies within the enclosing pad
    pub inside_pad: bool,
}

impl Guidance {
    pub fn compute(target: Point, frame: Size, pad: Option<&ShapeCandidate>, dead_band: i32) -> Self {
        let center = Point::new(frame.width / 2, frame.height / 2);
        let dx = target.x - center.x;
        let dy = target.y - center.y;

        let horizontal = if dx > dead_band {
            Some(Horizontal::Right)
        } else if dx < -dead_band {
            Some(Horizontal::Left)
        } else {
            None
        };
        let vertical = if dy > dead_band {
            Some(Vertical::Down)
        } else if dy < -dead_band {
            Some(Vertical::Up)
        } else {
            None
        };

        Self {
            target: (target.x, target.y),
            frame_center: (center.x, center.y),
            offset: (dx, dy),
            horizontal,
            vertical,
            inside_pad: pad.map_or(false, |c| c.contains(target)),
        }
    }

    pub fn is_centered(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none()
    }

    pub fn target_point(&self) -> Point {
        Point::new(self.target.0, self.target.1)
    }
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_centered() {
            return write!(f, "CENTER");
        }
        let mut parts = Vec::with_capacity(2);
        match self.horizontal {
            Some(Horizontal::Right) => parts.push("RIGHT"),
            Some(Horizontal::Left) => parts.push("LEFT"),
            None => {}
        }
        match self.vertical {
            Some(Vertical::Down) => parts.push("DOWN"),
            Some(Vertical::Up) => parts.push("UP"),
            None => {}
        }
        write!(f, "{}", parts.join(" "))
    }
}
