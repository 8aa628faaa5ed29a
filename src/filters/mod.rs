//! Named filters to engine filter graphs
//!
//! `FilterChainBuilder` turns a filter name plus a loose option map into a
//! typed `FilterSpec` (defaults filled, required options checked) and then
//! into an engine-native filter graph string.

pub mod tempo;
pub mod trim;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::FilterDefaults;
use crate::error::{Result, SfxError};

pub use tempo::{decompose_tempo, tempo_graph};
pub use trim::{trim_graph, ResolvedTrim};

/// Caller-supplied filter options
pub type FilterOptions = BTreeMap<String, Value>;

/// Names accepted by `FilterChainBuilder::resolve`
pub const KNOWN_FILTERS: &[&str] = &[
    "normalize",
    "telephone",
    "echo",
    "reverb",
    "highpass",
    "lowpass",
    "volume",
    "equalizer",
    "tempo",
];

/// A filter with every option resolved to a concrete value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Normalize { i: f64, tp: f64, lra: f64 },
    Telephone { low_hz: f64, high_hz: f64 },
    Echo { delay_ms: f64, decay: f64 },
    Reverb { delays_ms: Vec<f64>, decays: Vec<f64> },
    Highpass { frequency: f64 },
    Lowpass { frequency: f64 },
    /// Multiplier (`0.5`) or engine expression (`3dB`)
    Volume { volume: String },
    Equalizer { frequency: f64, width: f64, gain: f64 },
    Tempo { factor: f64 },
}

impl FilterSpec {
    pub fn name(&self) -> &'static str {
        match self {
            FilterSpec::Normalize { .. } => "normalize",
            FilterSpec::Telephone { .. } => "telephone",
            FilterSpec::Echo { .. } => "echo",
            FilterSpec::Reverb { .. } => "reverb",
            FilterSpec::Highpass { .. } => "highpass",
            FilterSpec::Lowpass { .. } => "lowpass",
            FilterSpec::Volume { .. } => "volume",
            FilterSpec::Equalizer { .. } => "equalizer",
            FilterSpec::Tempo { .. } => "tempo",
        }
    }

    /// Engine filter graph for this filter
    pub fn graph(&self) -> String {
        match self {
            FilterSpec::Normalize { i, tp, lra } => {
                format!("loudnorm=I={}:TP={}:LRA={}:print_format=none", i, tp, lra)
            }
            FilterSpec::Telephone { low_hz, high_hz } => {
                format!("highpass=f={},lowpass=f={}", low_hz, high_hz)
            }
            FilterSpec::Echo { delay_ms, decay } => format!("aecho=0.8:0.88:{}:{}", delay_ms, decay),
            FilterSpec::Reverb { delays_ms, decays } => format!(
                "aecho=0.8:0.9:{}:{}",
                join_values(delays_ms),
                join_values(decays)
            ),
            FilterSpec::Highpass { frequency } => format!("highpass=f={}", frequency),
            FilterSpec::Lowpass { frequency } => format!("lowpass=f={}", frequency),
            FilterSpec::Volume { volume } => format!("volume={}", volume),
            FilterSpec::Equalizer {
                frequency,
                width,
                gain,
            } => format!(
                "equalizer=f={}:width_type=h:width={}:g={}",
                frequency, width, gain
            ),
            FilterSpec::Tempo { factor } => tempo_graph(*factor),
        }
    }
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// Translates named filters into filter graphs
#[derive(Debug, Clone, Default)]
pub struct FilterChainBuilder {
    defaults: FilterDefaults,
}

impl FilterChainBuilder {
    pub fn new(defaults: FilterDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &FilterDefaults {
        &self.defaults
    }

    /// Resolve a named filter and its options.
    ///
    /// # Errors
    /// * `UnknownFilter` - `name` is not a known filter
    /// * `MissingRequiredOption` - a required option is absent (first one
    ///   in documented order is reported)
    /// * `InvalidOption` - an option has the wrong type or range
    pub fn resolve(&self, name: &str, options: &FilterOptions) -> Result<FilterSpec> {
        let opts = OptionReader {
            filter: name,
            options,
        };
        let d = &self.defaults;

        let spec = match name {
            "normalize" => FilterSpec::Normalize {
                i: opts.number("i")?.unwrap_or(d.normalize_i),
                tp: opts.number("tp")?.unwrap_or(d.normalize_tp),
                lra: opts.number("lra")?.unwrap_or(d.normalize_lra),
            },
            "telephone" => FilterSpec::Telephone {
                low_hz: opts.number("lowFreq")?.unwrap_or(d.telephone_low_hz),
                high_hz: opts.number("highFreq")?.unwrap_or(d.telephone_high_hz),
            },
            "echo" => FilterSpec::Echo {
                delay_ms: opts.number("delay")?.unwrap_or(d.echo_delay_ms),
                decay: opts.number("decay")?.unwrap_or(d.echo_decay),
            },
            "reverb" => {
                let delays_ms = opts.numbers("delays")?.unwrap_or_else(|| d.reverb_delays_ms.clone());
                let decays = opts.numbers("decays")?.unwrap_or_else(|| d.reverb_decays.clone());
                if delays_ms.is_empty() || delays_ms.len() != decays.len() {
                    return Err(opts.invalid("delays", "delays and decays must be non-empty and the same length"));
                }
                FilterSpec::Reverb { delays_ms, decays }
            }
            "highpass" => FilterSpec::Highpass {
                frequency: opts.required_number("frequency")?,
            },
            "lowpass" => FilterSpec::Lowpass {
                frequency: opts.required_number("frequency")?,
            },
            "volume" => FilterSpec::Volume {
                volume: opts.required_text("volume")?,
            },
            "equalizer" => FilterSpec::Equalizer {
                frequency: opts.required_number("frequency")?,
                width: opts.required_number("width")?,
                gain: opts.required_number("gain")?,
            },
            "tempo" => {
                let factor = opts.required_number("x")?;
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(opts.invalid("x", "tempo factor must be a positive number"));
                }
                FilterSpec::Tempo { factor }
            }
            _ => {
                return Err(SfxError::UnknownFilter {
                    name: name.to_string(),
                })
            }
        };
        Ok(spec)
    }

    /// Resolve and render in one step
    pub fn build(&self, name: &str, options: &FilterOptions) -> Result<String> {
        Ok(self.resolve(name, options)?.graph())
    }
}

/// Typed access to a loose option map; `null` counts as absent
struct OptionReader<'a> {
    filter: &'a str,
    options: &'a FilterOptions,
}

impl OptionReader<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key).filter(|value| !value.is_null())
    }

    fn invalid(&self, key: &str, reason: &str) -> SfxError {
        SfxError::InvalidOption {
            filter: self.filter.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    fn missing(&self, key: &str) -> SfxError {
        SfxError::MissingRequiredOption {
            filter: self.filter.to_string(),
            missing_key: key.to_string(),
        }
    }

    fn as_number(&self, key: &str, value: &Value) -> Result<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|n| n.is_finite())
            .ok_or_else(|| self.invalid(key, "expected a number"))
    }

    fn number(&self, key: &str) -> Result<Option<f64>> {
        self.get(key).map(|v| self.as_number(key, v)).transpose()
    }

    fn required_number(&self, key: &str) -> Result<f64> {
        self.number(key)?.ok_or_else(|| self.missing(key))
    }

    fn numbers(&self, key: &str) -> Result<Option<Vec<f64>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| self.as_number(key, item))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(single) => Ok(Some(vec![self.as_number(key, single)?])),
        }
    }

    fn required_text(&self, key: &str) -> Result<String> {
        match self.get(key) {
            None => Err(self.missing(key)),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(_) => Err(self.invalid(key, "expected a number or a string")),
        }
    }
}
