//! Silence trim chain
//!
//! Leading silence is removed, the signal is reversed so the trailing edge
//! becomes the leading one, that edge is trimmed with its own settings, and
//! the signal is reversed back. Silence in the interior is never touched.

use crate::config::TrimDefaults;
use crate::pipeline::TrimOptions;

/// Trim settings with every default filled in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTrim {
    pub start_duration_secs: f64,
    pub start_threshold_db: f64,
    pub stop_duration_secs: f64,
    pub stop_threshold_db: f64,
    pub padding_start_ms: u64,
    pub padding_end_ms: u64,
}

impl ResolvedTrim {
    pub fn resolve(options: &TrimOptions, defaults: &TrimDefaults) -> Self {
        Self {
            start_duration_secs: options
                .start_duration
                .unwrap_or(defaults.start_duration_secs),
            start_threshold_db: options
                .start_threshold
                .unwrap_or(defaults.start_threshold_db),
            stop_duration_secs: options.stop_duration.unwrap_or(defaults.stop_duration_secs),
            stop_threshold_db: options.stop_threshold.unwrap_or(defaults.stop_threshold_db),
            padding_start_ms: options.padding_start.unwrap_or(0),
            padding_end_ms: options.padding_end.unwrap_or(0),
        }
    }

    /// Filter graph: trim start, reverse, trim (old) end, reverse, then pad
    pub fn graph(&self) -> String {
        let mut stages = vec![
            silence_remove(self.start_duration_secs, self.start_threshold_db),
            "areverse".to_string(),
            silence_remove(self.stop_duration_secs, self.stop_threshold_db),
            "areverse".to_string(),
        ];
        if self.padding_start_ms > 0 {
            stages.push(format!("adelay=delays={}:all=1", self.padding_start_ms));
        }
        if self.padding_end_ms > 0 {
            stages.push(format!("apad=pad_dur={}", ms_to_secs(self.padding_end_ms)));
        }
        stages.join(",")
    }
}

fn silence_remove(duration_secs: f64, threshold_db: f64) -> String {
    format!(
        "silenceremove=start_periods=1:start_duration={}:start_threshold={}dB",
        duration_secs, threshold_db
    )
}

fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Trim graph for the given options
pub fn trim_graph(options: &TrimOptions, defaults: &TrimDefaults) -> String {
    ResolvedTrim::resolve(options, defaults).graph()
}
