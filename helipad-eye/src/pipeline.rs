//! Capture and detection stages
//!
//! Two worker threads linked by single-slot hand-off channels:
//!
//! ```text
//! FrameSource -> capture loop -> [frame slot] -> detection loop -> [result slot] -> consumer
//! ```
//!
//! Neither stage waits on the other. A full slot is overwritten, so the
//! detection stage always works on the newest forwarded frame and the consumer
//! always reads the newest result.

use crate::camera::FrameSource;
use crate::config::{LandingConfig, SchedulerConfig};
use crate::error::DetectionError;
use crate::guidance::Guidance;
use crate::handoff::{handoff, HandoffReceiver, HandoffSender};
use crate::overlay;
use crate::processing::{CircleDetector, FramePreprocessor, ShapeMatcher, TemporalStabilizer};
use crate::shapes::{BoundingBox, ShapeCandidate, ShapeMatch};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::template::Template;
use opencv::{core::Mat, prelude::*};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finds pad candidates in a full frame, largest first
pub trait ShapeDetector: Send {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<ShapeCandidate>, DetectionError>;
}

impl ShapeDetector for CircleDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<ShapeCandidate>, DetectionError> {
        CircleDetector::detect(self, frame)
    }
}

/// Locates the glyph, either inside a region or over the whole frame.
/// Matches are always reported in frame coordinates.
pub trait GlyphMatcher: Send {
    fn match_region(&self, frame: &Mat, region: &BoundingBox) -> Result<Option<ShapeMatch>, DetectionError>;

    fn match_frame(&self, frame: &Mat) -> Result<Option<ShapeMatch>, DetectionError>;

    fn label(&self) -> &str {
        "H"
    }
}

impl GlyphMatcher for ShapeMatcher {
    fn match_region(&self, frame: &Mat, region: &BoundingBox) -> Result<Option<ShapeMatch>, DetectionError> {
        self.find_in_region(frame, region)
    }

    fn match_frame(&self, frame: &Mat) -> Result<Option<ShapeMatch>, DetectionError> {
        self.find_in_frame(frame)
    }

    fn label(&self) -> &str {
        self.template().name()
    }
}

/// Outcome of one detection cycle
pub struct DetectionResult {
    pub cycle: u64,
    pub shape_match: Option<ShapeMatch>,
    /// Candidate whose region produced the match, or the first candidate on a miss
    pub candidate: Option<ShapeCandidate>,
    pub candidates_found: usize,
    /// Match came from the multi-candidate retry
    pub escalated: bool,
    pub stable: bool,
    /// Present only when stable and matched
    pub guidance: Option<Guidance>,
    pub annotated: Mat,
    pub mask: Mat,
}

/// Image-free view of a [`DetectionResult`] for telemetry
#[derive(Debug, Clone, Serialize)]
pub struct DetectionSummary {
    pub cycle: u64,
    pub shape_match: Option<ShapeMatch>,
    pub candidate: Option<ShapeCandidate>,
    pub candidates_found: usize,
    pub escalated: bool,
    pub stable: bool,
    pub guidance: Option<Guidance>,
}

impl DetectionResult {
    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary {
            cycle: self.cycle,
            shape_match: self.shape_match,
            candidate: self.candidate,
            candidates_found: self.candidates_found,
            escalated: self.escalated,
            stable: self.stable,
            guidance: self.guidance,
        }
    }
}

/// Per-frame detection with miss tracking and debouncing.
///
/// Owned by the detection thread; the miss counter and history live here.
pub struct DetectionStage<D, M> {
    detector: D,
    matcher: M,
    preprocessor: FramePreprocessor,
    stabilizer: TemporalStabilizer,
    misses: u32,
    miss_escalation: u32,
    dead_band: i32,
    cycle: u64,
}

impl DetectionStage<CircleDetector, ShapeMatcher> {
    /// Stage wired with the OpenCV detector and matcher
    pub fn with_template(template: Template, config: &LandingConfig) -> Self {
        let detector = CircleDetector::new(config.circles.clone());
        let matcher = ShapeMatcher::new(template, config.matcher.clone(), config.preprocess.clone());
        Self::new(detector, matcher, config)
    }
}

impl<D: ShapeDetector, M: GlyphMatcher> DetectionStage<D, M> {
    pub fn new(detector: D, matcher: M, config: &LandingConfig) -> Self {
        Self {
            detector,
            matcher,
            preprocessor: FramePreprocessor::new(config.preprocess.clone()),
            stabilizer: TemporalStabilizer::new(&config.stabilizer),
            misses: 0,
            miss_escalation: config.scheduler.miss_escalation,
            dead_band: config.guidance.dead_band_px,
            cycle: 0,
        }
    }

    /// Consecutive completed cycles without a match
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Run one cycle on `frame`.
    ///
    /// Detector and matcher failures count as "nothing found". A frame the mask
    /// cannot be built from is returned as an error before any history changes,
    /// so every cycle that reaches the stabilizer yields a result.
    pub fn process(&mut self, frame: &Mat) -> Result<DetectionResult, DetectionError> {
        self.cycle += 1;

        let mask = self.preprocessor.mask(frame)?;
        let size = frame.size()?;
        let mut annotated = frame.try_clone()?;

        let candidates = self.detector.detect(frame).unwrap_or_else(|e| {
            warn!("Cycle {}: circle detection failed: {}", self.cycle, e);
            Vec::new()
        });

        let (mut shape_match, mut candidate) = match candidates.first() {
            Some(first) => (self.try_region(frame, first), Some(*first)),
            None => (self.try_frame(frame), None),
        };

        let mut escalated = false;
        if shape_match.is_some() {
            self.misses = 0;
        } else if self.misses >= self.miss_escalation && candidates.len() >= 2 {
            info!(
                "Cycle {}: {} misses, retrying {} remaining candidates",
                self.cycle,
                self.misses,
                candidates.len() - 1
            );
            for c in &candidates[1..] {
                if let Some(m) = self.try_region(frame, c) {
                    shape_match = Some(m);
                    candidate = Some(*c);
                    escalated = true;
                    break;
                }
            }
            self.misses = 0;
        } else {
            self.misses += 1;
        }

        let stable = self.stabilizer.record(shape_match.is_some());
        let guidance = match (&shape_match, stable) {
            (Some(m), true) => Some(Guidance::compute(m.center(), size, candidate.as_ref(), self.dead_band)),
            _ => None,
        };

        if let Some(c) = &candidate {
            if let Err(e) = overlay::annotate_candidate(&mut annotated, c, escalated) {
                warn!("Cycle {}: candidate overlay failed: {}", self.cycle, e);
            }
        }
        if let Some(m) = &shape_match {
            if let Err(e) = overlay::annotate_match(&mut annotated, m, self.matcher.label()) {
                warn!("Cycle {}: match overlay failed: {}", self.cycle, e);
            }
        }

        debug!(
            "Cycle {}: {} candidates, match={}, stable={}",
            self.cycle,
            candidates.len(),
            shape_match.is_some(),
            stable
        );

        Ok(DetectionResult {
            cycle: self.cycle,
            shape_match,
            candidate,
            candidates_found: candidates.len(),
            escalated,
            stable,
            guidance,
            annotated,
            mask,
        })
    }

    fn try_region(&self, frame: &Mat, candidate: &ShapeCandidate) -> Option<ShapeMatch> {
        self.matcher
            .match_region(frame, &candidate.bounding_box)
            .unwrap_or_else(|e| {
                warn!("Cycle {}: region match failed: {}", self.cycle, e);
                None
            })
    }

    fn try_frame(&self, frame: &Mat) -> Option<ShapeMatch> {
        self.matcher.match_frame(frame).unwrap_or_else(|e| {
            warn!("Cycle {}: frame match failed: {}", self.cycle, e);
            None
        })
    }
}

/// Wires a frame source and a detection stage into two worker threads
pub struct PipelineScheduler<D, M> {
    source: Arc<dyn FrameSource>,
    stage: DetectionStage<D, M>,
    config: SchedulerConfig,
    stats: Arc<PipelineStats>,
}

impl<D, M> PipelineScheduler<D, M>
where
    D: ShapeDetector + 'static,
    M: GlyphMatcher + 'static,
{
    pub fn new(source: Arc<dyn FrameSource>, stage: DetectionStage<D, M>, config: SchedulerConfig) -> Self {
        Self {
            source,
            stage,
            config,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Spawn the capture and detection threads
    pub fn start(self) -> Result<PipelineHandle, DetectionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (frames_tx, frames_rx) = handoff::<Mat>();
        let (results_tx, results_rx) = handoff::<DetectionResult>();

        let capture = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&self.stats);
            let source = self.source;
            let config = self.config.clone();
            thread::Builder::new()
                .name("helipad-capture".to_string())
                .spawn(move || capture_loop(source.as_ref(), &frames_tx, &stop, &stats, &config))?
        };

        let detection = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&self.stats);
            let mut stage = self.stage;
            let idle = Duration::from_millis(self.config.idle_poll_ms);
            let spawned = thread::Builder::new()
                .name("helipad-detection".to_string())
                .spawn(move || detection_loop(&mut stage, &frames_rx, &results_tx, &stop, &stats, idle));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    let _ = capture.join();
                    return Err(e.into());
                }
            }
        };

        info!(
            "Pipeline started (forwarding 1 of {} frames, escalation after {} misses)",
            self.config.frame_skip, self.config.miss_escalation
        );

        Ok(PipelineHandle {
            stop,
            results: results_rx,
            stats: self.stats,
            workers: vec![capture, detection],
        })
    }
}

fn capture_loop(
    source: &dyn FrameSource,
    frames: &HandoffSender<Mat>,
    stop: &AtomicBool,
    stats: &PipelineStats,
    config: &SchedulerConfig,
) {
    let skip = u64::from(config.frame_skip.max(1));
    let backoff = Duration::from_millis(config.capture_backoff_ms);
    let mut captured: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        match source.acquire() {
            Some(frame) => {
                stats.frame_captured();
                captured += 1;
                if captured % skip == 0 {
                    let evicted = frames.send(frame);
                    stats.frame_forwarded(evicted);
                }
            }
            None => {
                stats.capture_missed();
                thread::sleep(backoff);
            }
        }
    }
    debug!("Capture loop exited after {} frames", captured);
}

fn detection_loop<D: ShapeDetector, M: GlyphMatcher>(
    stage: &mut DetectionStage<D, M>,
    frames: &HandoffReceiver<Mat>,
    results: &HandoffSender<DetectionResult>,
    stop: &AtomicBool,
    stats: &PipelineStats,
    idle: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = frames.recv_timeout(idle) else {
            continue;
        };
        match stage.process(&frame) {
            Ok(result) => {
                stats.cycle_completed(result.shape_match.is_some(), result.escalated);
                let evicted = results.send(result);
                stats.result_published(evicted);
            }
            Err(e) => {
                stats.cycle_failed();
                error!("Detection cycle failed: {}", e);
            }
        }
    }
    debug!("Detection loop exited");
}

/// Running pipeline. Dropping it stops both threads.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    results: HandoffReceiver<DetectionResult>,
    stats: Arc<PipelineStats>,
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Newest result, if one arrived since the last call
    pub fn try_next_result(&self) -> Option<DetectionResult> {
        self.results.try_recv()
    }

    pub fn next_result(&self, timeout: Duration) -> Option<DetectionResult> {
        self.results.recv_timeout(timeout)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Signal both loops and wait for them to exit
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Pipeline worker panicked");
            }
        }
        info!("Pipeline stopped");
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
