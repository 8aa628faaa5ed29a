//! Tempo decomposition
//!
//! `atempo` only accepts factors in `[0.5, 2.0]`. Larger changes are split
//! into a chain of in-range stages whose product is the requested factor.

/// Smallest factor a single `atempo` stage accepts
pub const MIN_STAGE: f64 = 0.5;
/// Largest factor a single `atempo` stage accepts
pub const MAX_STAGE: f64 = 2.0;

/// Split a positive tempo factor into in-range stages, applied left to right.
///
/// The caller guarantees `factor` is finite and positive.
pub fn decompose_tempo(factor: f64) -> Vec<f64> {
    let mut remaining = factor;
    let mut stages = Vec::new();

    while remaining < MIN_STAGE {
        stages.push(MIN_STAGE);
        remaining /= MIN_STAGE;
    }
    while remaining > MAX_STAGE {
        stages.push(MAX_STAGE);
        remaining /= MAX_STAGE;
    }
    stages.push(remaining);
    stages
}

/// `atempo` chain for a tempo factor
pub fn tempo_graph(factor: f64) -> String {
    decompose_tempo(factor)
        .iter()
        .map(|stage| format!("atempo={}", stage))
        .collect::<Vec<_>>()
        .join(",")
}
