//! sfxmix - Fluent audio edit pipelines
//!
//! A chain of edits (concatenate, mix, insert silence, filter, trim) is
//! recorded with a fluent builder and then rendered into one output file by
//! an external transcoding engine (ffmpeg by default).
//!
//! # Architecture
//!
//! - `pipeline`: action queue, scratch-file registry and the executor
//! - `filters`: named filters to engine filter graphs (tempo, trim chains)
//! - `engine`: the `TranscodeGateway` seam and its ffmpeg implementation
//! - `config`: every tunable default, loadable from JSON

pub mod analysis;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod pipeline;

pub use analysis::{TruncationOptions, TruncationReport};
pub use config::{Bitrate, PipelineConfig};
pub use engine::{EngineError, FfmpegGateway, OutputOptions, TranscodeGateway};
pub use error::{Result, SfxError};
pub use filters::{FilterChainBuilder, FilterOptions, FilterSpec};
pub use pipeline::{
    Action, CancelHandle, DurationPolicy, MixOptions, Pipeline, PipelineState, TrimOptions,
};
