//! Error handling for sfxmix
//!
//! Every failure of a pipeline run surfaces as one `SfxError`. Engine
//! failures keep the engine's own payload so the caller can diagnose them.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

/// Result type alias for sfxmix operations
pub type Result<T> = std::result::Result<T, SfxError>;

/// Main error type for sfxmix operations
#[derive(Error, Debug)]
pub enum SfxError {
    // Filter Errors
    #[error("Unknown filter: {name}")]
    UnknownFilter { name: String },

    #[error("Filter '{filter}' requires the \"{missing_key}\" option")]
    MissingRequiredOption { filter: String, missing_key: String },

    #[error("Invalid value for option \"{key}\" of filter '{filter}': {reason}")]
    InvalidOption {
        filter: String,
        key: String,
        reason: String,
    },

    // Pipeline State Errors
    #[error("No audio to mix with. Add or concatenate audio before mixing.")]
    NoBaseAudio,

    #[error("No audio to apply filter to. Add audio before applying filters.")]
    NoAudioToFilter,

    #[error("No audio to trim. Add audio before trimming.")]
    NoAudioToTrim,

    #[error("Nothing to save: the pipeline has no actions")]
    EmptyPipeline,

    #[error("Pipeline already finalized; call reset() before reusing it")]
    AlreadyFinalized,

    #[error("Pipeline cancelled")]
    Cancelled,

    // File Errors
    #[error("Source file not found: {path}")]
    SourceFileMissing { path: PathBuf },

    #[error("Temporary directory unavailable: {path}: {source}")]
    TempDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Engine Errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // Configuration Errors
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SfxError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SfxError::UnknownFilter { .. } => "UNKNOWN_FILTER",
            SfxError::MissingRequiredOption { .. } => "MISSING_REQUIRED_OPTION",
            SfxError::InvalidOption { .. } => "INVALID_OPTION",
            SfxError::NoBaseAudio => "NO_BASE_AUDIO",
            SfxError::NoAudioToFilter => "NO_AUDIO_TO_FILTER",
            SfxError::NoAudioToTrim => "NO_AUDIO_TO_TRIM",
            SfxError::EmptyPipeline => "EMPTY_PIPELINE",
            SfxError::AlreadyFinalized => "ALREADY_FINALIZED",
            SfxError::Cancelled => "CANCELLED",
            SfxError::SourceFileMissing { .. } => "SOURCE_FILE_MISSING",
            SfxError::TempDirUnavailable { .. } => "TEMP_DIR_UNAVAILABLE",
            SfxError::Engine(_) => "ENGINE_ERROR",
            SfxError::Config(_) => "CONFIG_ERROR",
            SfxError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if the caller can fix the cause and run a fresh pipeline
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SfxError::TempDirUnavailable { .. })
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SfxError::UnknownFilter { .. } => Some(
                "Known filters: normalize, telephone, echo, reverb, highpass, lowpass, volume, equalizer, tempo",
            ),
            SfxError::MissingRequiredOption { .. } => {
                Some("Pass the missing option in the filter's option map")
            }
            SfxError::NoBaseAudio | SfxError::NoAudioToFilter | SfxError::NoAudioToTrim => {
                Some("Start the chain with add() or silence()")
            }
            SfxError::AlreadyFinalized => Some("Call reset() or build a new pipeline"),
            SfxError::SourceFileMissing { .. } => Some("Check the source path and try again"),
            SfxError::TempDirUnavailable { .. } => {
                Some("Check permissions and free space of the temp root")
            }
            SfxError::Engine(_) => Some("Check that ffmpeg is installed and the input is valid audio"),
            _ => None,
        }
    }
}
