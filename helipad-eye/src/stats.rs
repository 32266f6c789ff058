//! Counters shared by the capture and detection stages
//!
//! Totals are kept locally for [`PipelineStats::snapshot`] and mirrored to the
//! `metrics` facade, which is a no-op until the host installs a recorder.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_forwarded: AtomicU64,
    capture_misses: AtomicU64,
    frames_evicted: AtomicU64,
    detection_cycles: AtomicU64,
    detection_errors: AtomicU64,
    matches: AtomicU64,
    escalations: AtomicU64,
    results_evicted: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_forwarded: u64,
    pub capture_misses: u64,
    pub frames_evicted: u64,
    pub detection_cycles: u64,
    pub detection_errors: u64,
    pub matches: u64,
    pub escalations: u64,
    pub results_evicted: u64,
}

impl StatsSnapshot {
    /// Fraction of detection cycles that produced a match
    pub fn detection_rate(&self) -> f64 {
        if self.detection_cycles == 0 {
            0.0
        } else {
            self.matches as f64 / self.detection_cycles as f64
        }
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        counter!("helipad_frames_captured_total").increment(1);
    }

    pub(crate) fn frame_forwarded(&self, evicted: bool) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        counter!("helipad_frames_forwarded_total").increment(1);
        if evicted {
            self.frames_evicted.fetch_add(1, Ordering::Relaxed);
            counter!("helipad_frames_evicted_total").increment(1);
        }
    }

    pub(crate) fn capture_missed(&self) {
        self.capture_misses.fetch_add(1, Ordering::Relaxed);
        counter!("helipad_capture_misses_total").increment(1);
    }

    pub(crate) fn cycle_completed(&self, matched: bool, escalated: bool) {
        self.detection_cycles.fetch_add(1, Ordering::Relaxed);
        counter!("helipad_detection_cycles_total").increment(1);
        if matched {
            self.matches.fetch_add(1, Ordering::Relaxed);
            counter!("helipad_matches_total").increment(1);
        }
        if escalated {
            self.escalations.fetch_add(1, Ordering::Relaxed);
            counter!("helipad_escalations_total").increment(1);
        }
    }

    pub(crate) fn cycle_failed(&self) {
        self.detection_cycles.fetch_add(1, Ordering::Relaxed);
        self.detection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("helipad_detection_cycles_total").increment(1);
        counter!("helipad_detection_errors_total").increment(1);
    }

    pub(crate) fn result_published(&self, evicted: bool) {
        if evicted {
            self.results_evicted.fetch_add(1, Ordering::Relaxed);
            counter!("helipad_results_evicted_total").increment(1);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            capture_misses: self.capture_misses.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            detection_cycles: self.detection_cycles.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            results_evicted: self.results_evicted.load(Ordering::Relaxed),
        }
    }
}
