//! Configuration for helipad-eye
//!
//! Every threshold used by the detection pipeline lives here. Values outside a
//! configured range exclude a candidate; they never signal a malfunction.

use crate::error::DetectionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LandingConfig {
    pub camera: CameraConfig,
    pub preprocess: PreprocessConfig,
    pub circles: CircleConfig,
    pub matcher: MatcherConfig,
    pub scheduler: SchedulerConfig,
    pub stabilizer: StabilizerConfig,
    pub guidance: GuidanceConfig,
    pub template: TemplateConfig,
}

/// Camera device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index (0, 1, 2, etc.)
    pub camera_id: u32,
    /// Requested resolution (width, height)
    pub resolution: (u32, u32),
    /// Requested frame rate (frames per second)
    pub frame_rate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            resolution: (640, 480),
            frame_rate: 30,
        }
    }
}

/// Edge mask used by the shape matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub clahe_clip_limit: f64,
    /// CLAHE tiles per side
    pub clahe_tile_grid: i32,
    /// Gaussian kernel size (odd)
    pub blur_kernel: i32,
    pub canny_low: f64,
    pub canny_high: f64,
    /// Elliptical closing kernel size
    pub close_kernel: i32,
    pub close_iterations: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 3,
            blur_kernel: 3,
            canny_low: 50.0,
            canny_high: 150.0,
            close_kernel: 2,
            close_iterations: 1,
        }
    }
}

/// Blob mask and geometric filters used by the circle detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    pub min_circularity: f64,
    pub min_area: f64,
    pub max_ellipse_ratio: f64,
    pub min_points: usize,
    pub blur_kernel: i32,
    pub clahe_clip_limit: f64,
    pub clahe_tile_grid: i32,
    pub bilateral_diameter: i32,
    pub bilateral_sigma: f64,
    pub morph_kernel: i32,
    pub close_iterations: i32,
    pub open_iterations: i32,
    /// Treat dark blobs on a bright field as foreground
    pub invert_threshold: bool,
    /// Bounding box padding, as a fraction of the radius / major axis
    pub ring_padding: f64,
    pub ellipse_padding: f64,
    pub circle_padding: f64,
    pub ring: RingConfig,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            min_circularity: 0.65,
            min_area: 8000.0,
            max_ellipse_ratio: 2.5,
            min_points: 30,
            blur_kernel: 3,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            bilateral_diameter: 5,
            bilateral_sigma: 25.0,
            morph_kernel: 5,
            close_iterations: 2,
            open_iterations: 1,
            invert_threshold: false,
            ring_padding: 0.3,
            ellipse_padding: 0.2,
            circle_padding: 0.3,
            ring: RingConfig::default(),
        }
    }
}

/// RANSAC ring fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub iterations: usize,
    /// Residual (pixels) under which a point counts as an inlier
    pub inlier_threshold: f64,
    /// Maximum distance between the outer and inner fitted centers
    pub max_center_offset: f64,
    /// Exclusive bounds on |r_outer - r_inner|
    pub min_ring_width: f64,
    pub max_ring_width: f64,
    /// Fixed RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            inlier_threshold: 2.0,
            max_center_offset: 5.0,
            min_ring_width: 10.0,
            max_ring_width: 80.0,
            seed: None,
        }
    }
}

/// Area limits applied to matcher contours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaBounds {
    pub min_area: f64,
    /// Upper bound as a fraction of the searched image area
    pub max_area_fraction: f64,
}

impl AreaBounds {
    /// Absolute (min, max) area for an image of `image_area` pixels
    pub fn resolve(&self, image_area: f64) -> (f64, f64) {
        (self.min_area, image_area * self.max_area_fraction)
    }
}

/// Template shape matching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f64,
    /// max(metric1, metric2) must stay under threshold * cross_check_factor
    pub cross_check_factor: f64,
    /// Contours closer than this to the image border are ignored
    pub border_margin: i32,
    pub min_side: i32,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Bounds used inside a candidate's region of interest
    pub roi_area: AreaBounds,
    /// Bounds used when searching the whole frame
    pub frame_area: AreaBounds,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            cross_check_factor: 1.5,
            border_margin: 30,
            min_side: 30,
            min_aspect: 0.4,
            max_aspect: 1.8,
            roi_area: AreaBounds {
                min_area: 2000.0,
                max_area_fraction: 0.5,
            },
            frame_area: AreaBounds {
                min_area: 100.0,
                max_area_fraction: 0.5,
            },
        }
    }
}

/// Capture/detection scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Forward one of every `frame_skip` captured frames
    pub frame_skip: u32,
    /// Consecutive missed cycles before escalating over all candidates
    pub miss_escalation: u32,
    /// Sleep after an empty capture
    pub capture_backoff_ms: u64,
    /// Sleep when the detection stage finds no frame waiting
    pub idle_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_skip: 3,
            miss_escalation: 10,
            capture_backoff_ms: 10,
            idle_poll_ms: 1,
        }
    }
}

/// Temporal debouncing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub capacity: usize,
    pub min_hits: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            min_hits: 7,
        }
    }
}

/// Guidance output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Offsets within this many pixels count as centered
    pub dead_band_px: i32,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self { dead_band_px: 20 }
    }
}

/// Reference template location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub dir: PathBuf,
    /// Template name, resolved as `<dir>/<name>.png`
    pub name: String,
    /// Used when `name` has no file
    pub fallback: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./templates"),
            name: "H".to_string(),
            fallback: "H".to_string(),
        }
    }
}

impl LandingConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: LandingConfig = serde_json::from_str(&raw)?;
        config.validate().map_err(DetectionError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let camera = &self.camera;
        if camera.frame_rate == 0 || camera.frame_rate > 120 {
            return Err("Frame rate must be between 1 and 120".to_string());
        }
        if camera.resolution.0 == 0 || camera.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }
        if camera.resolution.0 > 7680 || camera.resolution.1 > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }
        if camera.camera_id > 100 {
            return Err("Camera ID too large (max 100)".to_string());
        }

        let pre = &self.preprocess;
        if pre.blur_kernel <= 0 || pre.blur_kernel % 2 == 0 {
            return Err("Preprocess blur kernel must be positive and odd".to_string());
        }
        if pre.clahe_tile_grid <= 0 || pre.clahe_clip_limit <= 0.0 {
            return Err("CLAHE tile grid and clip limit must be positive".to_string());
        }
        if pre.canny_low <= 0.0 || pre.canny_high <= pre.canny_low {
            return Err("Canny thresholds must satisfy 0 < low < high".to_string());
        }
        if pre.close_kernel <= 0 {
            return Err("Closing kernel must be positive".to_string());
        }

        let circles = &self.circles;
        if !(0.0..=1.0).contains(&circles.min_circularity) {
            return Err("Circularity must be within [0, 1]".to_string());
        }
        if circles.min_area <= 0.0 {
            return Err("Minimum circle area must be positive".to_string());
        }
        if circles.max_ellipse_ratio < 1.0 {
            return Err("Ellipse ratio must be at least 1".to_string());
        }
        if circles.blur_kernel <= 0 || circles.blur_kernel % 2 == 0 {
            return Err("Circle blur kernel must be positive and odd".to_string());
        }
        if circles.morph_kernel <= 0 || circles.clahe_tile_grid <= 0 {
            return Err("Circle morphology kernel and tile grid must be positive".to_string());
        }

        let ring = &circles.ring;
        if ring.iterations == 0 {
            return Err("RANSAC needs at least one iteration".to_string());
        }
        if ring.inlier_threshold <= 0.0 || ring.max_center_offset <= 0.0 {
            return Err("RANSAC thresholds must be positive".to_string());
        }
        if ring.min_ring_width < 0.0 || ring.max_ring_width <= ring.min_ring_width {
            return Err("Ring width bounds must satisfy 0 <= min < max".to_string());
        }

        let matcher = &self.matcher;
        if matcher.threshold <= 0.0 || matcher.cross_check_factor < 1.0 {
            return Err("Matcher threshold must be positive and cross-check factor >= 1".to_string());
        }
        if matcher.min_aspect <= 0.0 || matcher.max_aspect <= matcher.min_aspect {
            return Err("Aspect bounds must satisfy 0 < min < max".to_string());
        }
        if matcher.border_margin < 0 || matcher.min_side < 0 {
            return Err("Border margin and minimum side cannot be negative".to_string());
        }
        for (name, bounds) in [("roi_area", &matcher.roi_area), ("frame_area", &matcher.frame_area)] {
            if bounds.min_area < 0.0 || bounds.max_area_fraction <= 0.0 || bounds.max_area_fraction > 1.0 {
                return Err(format!("Invalid {} bounds", name));
            }
        }

        if self.scheduler.frame_skip == 0 {
            return Err("Frame skip must be at least 1".to_string());
        }
        if self.scheduler.miss_escalation == 0 {
            return Err("Escalation threshold must be at least 1".to_string());
        }

        let stab = &self.stabilizer;
        if stab.capacity == 0 || stab.min_hits == 0 || stab.min_hits > stab.capacity {
            return Err("Stabilizer needs 0 < min_hits <= capacity".to_string());
        }

        if self.guidance.dead_band_px < 0 {
            return Err("Guidance dead band cannot be negative".to_string());
        }

        if self.template.name.is_empty() || self.template.fallback.is_empty() {
            return Err("Template names cannot be empty".to_string());
        }

        Ok(())
    }
}
