//! CLI Module
//!
//! Command-line interface for sfxmix.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::engine::OutputOptions;
use crate::pipeline::Action;

/// sfxmix - render audio edit chains through ffmpeg
#[derive(Parser, Debug)]
#[command(name = "sfxmix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a JSON recipe
    #[command(name = "run")]
    Run {
        /// Path to the recipe file
        recipe: PathBuf,
    },

    /// Concatenate files in order
    #[command(name = "concat")]
    Concat {
        /// Input audio files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the filter graph for a named filter
    #[command(name = "graph")]
    Graph {
        /// Filter name (normalize, tempo, equalizer, ...)
        name: String,

        /// Filter option as key=value (repeatable)
        #[arg(short = 'o', long = "opt", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },

    /// Show channels, sample rate, bitrate and duration of a file
    #[command(name = "probe")]
    Probe {
        /// Audio file
        path: PathBuf,
    },

    /// Check whether files end cut off
    #[command(name = "truncated")]
    Truncated {
        /// Audio files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Analyzed tail length in milliseconds
        #[arg(long, default_value_t = 100)]
        tail_ms: u64,

        /// Tail RMS level (dB) above which a file counts as truncated
        #[arg(long, default_value_t = -40.0, allow_hyphen_values = true)]
        threshold_db: f64,
    },
}

/// A stored pipeline: actions plus where and how to write the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub actions: Vec<Action>,
    pub output: PathBuf,
    #[serde(default)]
    pub output_options: OutputOptions,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}
