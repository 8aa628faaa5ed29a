//! External transcoding engine
//!
//! The pipeline never touches samples itself. Every signal-processing step
//! is delegated to a `TranscodeGateway`, which runs one engine invocation
//! per call and reports success or an `EngineError`.

pub mod ffmpeg;
pub mod format;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SilenceLayout;
use crate::pipeline::DurationPolicy;

pub use ffmpeg::FfmpegGateway;
pub use format::{codec_for_extension, extension_of};

/// Result type for engine invocations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Extra output options for the final re-encode, e.g. `c:a` -> `libopus`
pub type OutputOptions = BTreeMap<String, String>;

/// Failure reported by the external engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("Could not probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream parameters of an audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bitrate_kbps: Option<u32>,
    pub duration_secs: Option<f64>,
}

impl ProbeInfo {
    pub fn layout(&self) -> SilenceLayout {
        SilenceLayout {
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}

/// Loudness of the last stretch of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailLevels {
    pub rms_db: f64,
    pub peak_db: f64,
    pub duration_secs: f64,
}

/// One engine invocation per method; each call blocks until the engine exits.
///
/// `output` paths are always fresh scratch paths (or the caller's final
/// output for `reencode`); implementations may overwrite them.
pub trait TranscodeGateway {
    /// Stream-copy concatenation of inputs sharing a format.
    ///
    /// `list_path` is a scratch path the implementation may use for a
    /// concat list; the caller removes it afterwards.
    fn concatenate(&self, inputs: &[&Path], list_path: &Path, output: &Path) -> EngineResult<()>;

    /// Two-input amplitude mix, length decided by `policy`.
    fn mix(
        &self,
        first: &Path,
        second: &Path,
        policy: DurationPolicy,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()>;

    fn generate_silence(
        &self,
        duration_secs: f64,
        layout: &SilenceLayout,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()>;

    fn apply_filter_graph(
        &self,
        input: &Path,
        graph: &str,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()>;

    /// Re-encode into `output`. With empty `options` the codec follows the
    /// output extension (see `format::codec_for_extension`).
    fn reencode(&self, input: &Path, output: &Path, options: &OutputOptions) -> EngineResult<()>;

    fn probe(&self, path: &Path) -> EngineResult<ProbeInfo>;

    /// Measure RMS and peak level over the final `tail` of the file.
    fn measure_tail(&self, path: &Path, tail: Duration) -> EngineResult<TailLevels>;
}
