//! helipad-eye: landing pad detection for a downward-facing camera
//!
//! Finds a ring or circular pad in each frame, matches the glyph painted
//! inside it against a reference template, debounces the outcome over recent
//! cycles and reports the target's offset from the frame center.
//!
//! Capture and detection run on separate threads linked by single-slot
//! hand-off channels; see [`pipeline`].

pub mod camera;
pub mod config;
pub mod error;
pub mod guidance;
pub mod handoff;
pub mod overlay;
pub mod pipeline;
pub mod processing;
pub mod shapes;
pub mod stats;
pub mod template;

pub use camera::{CameraLease, CameraRegistry, FrameSource};
pub use config::LandingConfig;
pub use error::DetectionError;
pub use guidance::Guidance;
pub use pipeline::{DetectionResult, DetectionStage, PipelineHandle, PipelineScheduler};
pub use shapes::{BoundingBox, ShapeCandidate, ShapeKind, ShapeMatch};
pub use template::Template;
