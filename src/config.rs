//! Pipeline configuration
//!
//! Every default the pipeline relies on lives here instead of being baked
//! into the executor or the filter builder. Configs deserialize from JSON
//! with every section optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Nominal bitrate used for every encoded intermediate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bitrate {
    /// Detect from the first working file
    Auto,
    /// Fixed bitrate in kbit/s
    Kbps(u32),
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Auto
    }
}

/// Channel layout and sample rate of generated silence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceLayout {
    pub channels: u16,
    pub sample_rate: u32,
}

impl SilenceLayout {
    /// Engine-native channel layout name
    pub fn channel_layout(&self) -> String {
        match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{}c", n),
        }
    }
}

impl Default for SilenceLayout {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
        }
    }
}

/// Backoff schedule for deleting scratch files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 25,
            multiplier: 2,
        }
    }
}

/// Defaults for filter options the caller leaves out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    /// Integrated loudness target (LUFS)
    pub normalize_i: f64,
    /// True peak ceiling (dBTP)
    pub normalize_tp: f64,
    /// Loudness range target
    pub normalize_lra: f64,
    pub telephone_low_hz: f64,
    pub telephone_high_hz: f64,
    pub echo_delay_ms: f64,
    pub echo_decay: f64,
    pub reverb_delays_ms: Vec<f64>,
    pub reverb_decays: Vec<f64>,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            normalize_i: -16.0,
            normalize_tp: -1.5,
            normalize_lra: 11.0,
            telephone_low_hz: 300.0,
            telephone_high_hz: 3400.0,
            echo_delay_ms: 500.0,
            echo_decay: 0.5,
            reverb_delays_ms: vec![60.0, 120.0],
            reverb_decays: vec![0.4, 0.3],
        }
    }
}

/// Defaults for the silence trim detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimDefaults {
    pub start_duration_secs: f64,
    pub start_threshold_db: f64,
    pub stop_duration_secs: f64,
    pub stop_threshold_db: f64,
}

impl Default for TrimDefaults {
    fn default() -> Self {
        Self {
            start_duration_secs: 0.05,
            start_threshold_db: -50.0,
            stop_duration_secs: 0.05,
            stop_threshold_db: -50.0,
        }
    }
}

/// External engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Per-invocation deadline; `None` waits forever
    pub step_timeout_secs: Option<u64>,
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            step_timeout_secs: None,
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extension (and container) of every intermediate file
    pub native_extension: String,
    pub bitrate: Bitrate,
    /// Used when `Bitrate::Auto` cannot detect anything
    pub fallback_bitrate_kbps: u32,
    /// Layout for silence when there is nothing to match against
    pub silence_fallback: SilenceLayout,
    /// Parent of the per-pipeline scratch directory; OS temp dir when unset
    pub temp_root: Option<PathBuf>,
    pub delete_retry: RetryPolicy,
    pub filters: FilterDefaults,
    pub trim: TrimDefaults,
    pub engine: EngineConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            native_extension: "mp3".to_string(),
            bitrate: Bitrate::Auto,
            fallback_bitrate_kbps: 128,
            silence_fallback: SilenceLayout::default(),
            temp_root: None,
            delete_retry: RetryPolicy::default(),
            filters: FilterDefaults::default(),
            trim: TrimDefaults::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Directory under which scratch directories are created
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
