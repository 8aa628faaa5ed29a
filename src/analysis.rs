//! Truncation detection
//!
//! Speech or effects cut off mid-sound end loud. A file whose last stretch
//! still has an RMS level above the threshold is reported as truncated.

use serde::{Deserialize, Serialize};

use crate::engine::TailLevels;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationOptions {
    /// Length of the analyzed tail in milliseconds
    pub tail_ms: u64,
    /// Tail RMS level (dB) above which the audio counts as cut off
    pub threshold_db: f64,
}

impl Default for TruncationOptions {
    fn default() -> Self {
        Self {
            tail_ms: 100,
            threshold_db: -40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationReport {
    pub truncated: bool,
    pub tail_rms_db: f64,
    pub tail_peak_db: f64,
    pub duration_secs: f64,
    pub threshold_db: f64,
    pub tail_ms: u64,
}

impl TruncationReport {
    pub fn evaluate(levels: &TailLevels, options: &TruncationOptions) -> Self {
        Self {
            truncated: levels.rms_db > options.threshold_db,
            tail_rms_db: levels.rms_db,
            tail_peak_db: levels.peak_db,
            duration_secs: levels.duration_secs,
            threshold_db: options.threshold_db,
            tail_ms: options.tail_ms,
        }
    }
}
