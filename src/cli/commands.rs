//! CLI Command Implementations

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;

use super::Recipe;
use crate::analysis::TruncationOptions;
use crate::config::PipelineConfig;
use crate::engine::{FfmpegGateway, TranscodeGateway};
use crate::filters::{FilterChainBuilder, FilterOptions};
use crate::pipeline::Pipeline;

/// Load the configuration file, or defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Render a JSON recipe.
pub fn run_recipe(config: PipelineConfig, recipe_path: &Path) -> Result<()> {
    info!("Running recipe: {}", recipe_path.display());

    let content = fs::read_to_string(recipe_path)
        .with_context(|| format!("Failed to read recipe {}", recipe_path.display()))?;
    let recipe: Recipe = serde_json::from_str(&content)
        .with_context(|| format!("Invalid recipe {}", recipe_path.display()))?;

    let mut pipeline = Pipeline::with_config(config)?;
    let written = pipeline
        .extend(recipe.actions)
        .finalize(&recipe.output, &recipe.output_options)?;

    println!("Exported: {}", written.display());
    Ok(())
}

/// Concatenate inputs in order.
pub fn concat(config: PipelineConfig, inputs: &[PathBuf], output: &Path) -> Result<()> {
    info!("Concatenating {} file(s) into {}", inputs.len(), output.display());

    let mut pipeline = Pipeline::with_config(config)?;
    for input in inputs {
        pipeline.add(input);
    }
    let written = pipeline.save(output)?;

    println!("Exported: {}", written.display());
    Ok(())
}

/// Print the filter graph for a named filter.
pub fn graph(config: &PipelineConfig, name: &str, options: &[(String, String)]) -> Result<()> {
    let options: FilterOptions = options
        .iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect();

    let graph = FilterChainBuilder::new(config.filters.clone()).build(name, &options)?;
    println!("{}", graph);
    Ok(())
}

/// Print stream parameters of a file.
pub fn probe(config: &PipelineConfig, path: &Path) -> Result<()> {
    let gateway = FfmpegGateway::new(config.engine.clone());
    let info = gateway
        .probe(path)
        .with_context(|| format!("Failed to probe {}", path.display()))?;

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Report whether each file ends cut off.
pub fn truncated(
    config: PipelineConfig,
    files: &[PathBuf],
    options: &TruncationOptions,
) -> Result<()> {
    println!("=== Truncation Detection ===");
    println!();

    let mut pipeline = Pipeline::with_config(config)?;
    for file in files {
        match pipeline.add(file).is_truncated(options) {
            Ok(report) => {
                println!("File: {}", file.display());
                println!("  Truncated:     {}", report.truncated);
                println!("  Tail RMS:      {:.2} dB", report.tail_rms_db);
                println!("  Tail Peak:     {:.2} dB", report.tail_peak_db);
                println!("  Duration:      {:.3}s", report.duration_secs);
                println!("  Threshold:     {} dB", report.threshold_db);
                println!("  Tail analyzed: {} ms", report.tail_ms);
                println!();
            }
            Err(err) => eprintln!("Error analyzing {}: {}", file.display(), err),
        }
    }

    pipeline.teardown();
    Ok(())
}
