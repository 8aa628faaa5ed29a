//! Pipeline: action queue, scratch files and the executor

pub mod action;
pub mod executor;
pub mod temp;

pub use action::{Action, ActionQueue, DurationPolicy, MixOptions, TrimOptions};
pub use executor::{CancelHandle, Pipeline, PipelineState};
pub use temp::{purge_live_dirs, TempFileRegistry, TempKind};
