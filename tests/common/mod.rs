//! Shared test fixtures: an in-process WAV gateway built on hound.
//!
//! The gateway understands just enough of the filter graph language
//! (silenceremove, areverse, adelay, apad, atempo, volume) to check
//! durations end to end without ffmpeg.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use sfxmix::config::{RetryPolicy, SilenceLayout};
use sfxmix::engine::{EngineError, EngineResult, ProbeInfo, TailLevels};
use sfxmix::{DurationPolicy, OutputOptions, PipelineConfig, TranscodeGateway};

pub const SAMPLE_RATE: u32 = 8000;

/// Decoded mono or interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub spec: WavSpec,
    pub samples: Vec<i16>,
}

impl Clip {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.spec.channels as f64 / self.spec.sample_rate as f64
    }
}

pub fn mono_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

pub fn read_clip(path: &Path) -> EngineResult<Clip> {
    let mut reader = WavReader::open(path).map_err(|e| failed("read", e.to_string()))?;
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| failed("read", e.to_string()))?;
    Ok(Clip { spec, samples })
}

pub fn write_clip(path: &Path, clip: &Clip) -> EngineResult<()> {
    let mut writer = WavWriter::create(path, clip.spec).map_err(|e| failed("write", e.to_string()))?;
    for sample in &clip.samples {
        writer
            .write_sample(*sample)
            .map_err(|e| failed("write", e.to_string()))?;
    }
    writer.finalize().map_err(|e| failed("write", e.to_string()))
}

fn failed(program: &str, stderr: String) -> EngineError {
    EngineError::Failed {
        program: program.to_string(),
        status: Some(1),
        stderr,
    }
}

fn frames(secs: f64) -> usize {
    (secs * SAMPLE_RATE as f64).round() as usize
}

/// Square-ish tone at a fixed amplitude
pub fn tone(secs: f64, amplitude: i16) -> Vec<i16> {
    (0..frames(secs))
        .map(|i| if (i / 8) % 2 == 0 { amplitude } else { -amplitude })
        .collect()
}

pub fn silence(secs: f64) -> Vec<i16> {
    vec![0; frames(secs)]
}

/// Write a mono fixture made of consecutive parts
pub fn write_fixture(path: &Path, parts: &[Vec<i16>]) -> PathBuf {
    let clip = Clip {
        spec: mono_spec(),
        samples: parts.concat(),
    };
    write_clip(path, &clip).unwrap();
    path.to_path_buf()
}

pub fn duration_of(path: &Path) -> f64 {
    read_clip(path).unwrap().duration_secs()
}

/// Config for tests: WAV intermediates under `root`, quick delete retries
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        delete_retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            multiplier: 2,
        },
        native_extension: "wav".to_string(),
        temp_root: Some(root.to_path_buf()),
        silence_fallback: SilenceLayout {
            channels: 1,
            sample_rate: SAMPLE_RATE,
        },
        ..PipelineConfig::default()
    }
}

/// In-process gateway over WAV files
#[derive(Debug, Default)]
pub struct WavGateway {
    pub calls: RefCell<Vec<String>>,
    /// Step name that should fail after writing a partial output
    pub fail_on: RefCell<Option<&'static str>>,
    /// Leave each concat list behind as a directory the pipeline cannot delete
    pub pin_concat_lists: RefCell<bool>,
}

impl WavGateway {
    pub fn failing_on(step: &'static str) -> Self {
        let gateway = Self::default();
        *gateway.fail_on.borrow_mut() = Some(step);
        gateway
    }

    pub fn pinning_concat_lists() -> Self {
        let gateway = Self::default();
        *gateway.pin_concat_lists.borrow_mut() = true;
        gateway
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn enter(&self, step: &str, detail: String, output: &Path) -> EngineResult<()> {
        self.calls.borrow_mut().push(format!("{}:{}", step, detail));
        if *self.fail_on.borrow() == Some(step) {
            fs::write(output, b"partial")?;
            return Err(failed(step, format!("injected failure in {}", step)));
        }
        Ok(())
    }
}

impl TranscodeGateway for WavGateway {
    fn concatenate(&self, inputs: &[&Path], list_path: &Path, output: &Path) -> EngineResult<()> {
        if *self.pin_concat_lists.borrow() {
            fs::create_dir(list_path)?;
        } else {
            fs::write(list_path, format!("{} inputs", inputs.len()))?;
        }
        self.enter("concat", inputs.len().to_string(), output)?;

        let mut clips = inputs.iter().map(|path| read_clip(path));
        let mut joined = clips.next().ok_or_else(|| failed("concat", "no inputs".into()))??;
        for clip in clips {
            let clip = clip?;
            if clip.spec != joined.spec {
                return Err(failed("concat", "format mismatch".into()));
            }
            joined.samples.extend(clip.samples);
        }
        write_clip(output, &joined)
    }

    fn mix(
        &self,
        first: &Path,
        second: &Path,
        policy: DurationPolicy,
        _bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        self.enter("mix", policy.as_str().to_string(), output)?;

        let a = read_clip(first)?;
        let b = read_clip(second)?;
        let len = match policy {
            DurationPolicy::First => a.samples.len(),
            DurationPolicy::Shortest => a.samples.len().min(b.samples.len()),
            DurationPolicy::Longest => a.samples.len().max(b.samples.len()),
        };
        let samples = (0..len)
            .map(|i| {
                let x = i32::from(a.samples.get(i).copied().unwrap_or(0));
                let y = i32::from(b.samples.get(i).copied().unwrap_or(0));
                ((x + y) / 2) as i16
            })
            .collect();
        write_clip(output, &Clip { spec: a.spec, samples })
    }

    fn generate_silence(
        &self,
        duration_secs: f64,
        layout: &SilenceLayout,
        _bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        self.enter("silence", format!("{}", duration_secs), output)?;

        let spec = WavSpec {
            channels: layout.channels,
            sample_rate: layout.sample_rate,
            ..mono_spec()
        };
        let count = (duration_secs * layout.sample_rate as f64).round() as usize
            * layout.channels as usize;
        write_clip(
            output,
            &Clip {
                spec,
                samples: vec![0; count],
            },
        )
    }

    fn apply_filter_graph(
        &self,
        input: &Path,
        graph: &str,
        _bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        self.enter("filter", graph.to_string(), output)?;

        let mut clip = read_clip(input)?;
        for stage in graph.split(',') {
            let (name, params) = stage.split_once('=').unwrap_or((stage, ""));
            let param = |key: &str| {
                params
                    .split(':')
                    .filter_map(|kv| kv.split_once('='))
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            };
            match name {
                "areverse" => clip.samples.reverse(),
                "silenceremove" => {
                    let threshold_db: f64 = param("start_threshold")
                        .and_then(|v| v.trim_end_matches("dB").parse().ok())
                        .unwrap_or(-50.0);
                    let limit = 10f64.powf(threshold_db / 20.0) * i16::MAX as f64;
                    let first_loud = clip
                        .samples
                        .iter()
                        .position(|s| f64::from(*s).abs() > limit)
                        .unwrap_or(clip.samples.len());
                    clip.samples.drain(..first_loud);
                }
                "adelay" => {
                    let ms: f64 = param("delays").and_then(|v| v.parse().ok()).unwrap_or(0.0);
                    let mut padded = silence(ms / 1000.0);
                    padded.extend(clip.samples.drain(..));
                    clip.samples = padded;
                }
                "apad" => {
                    let secs: f64 = param("pad_dur").and_then(|v| v.parse().ok()).unwrap_or(0.0);
                    clip.samples.extend(silence(secs));
                }
                "atempo" => {
                    let factor: f64 = params.parse().map_err(|_| failed("filter", stage.into()))?;
                    let len = (clip.samples.len() as f64 / factor).round() as usize;
                    clip.samples = (0..len)
                        .map(|i| {
                            let src = ((i as f64 * factor) as usize).min(clip.samples.len() - 1);
                            clip.samples[src]
                        })
                        .collect();
                }
                "volume" => {
                    let gain: f64 = params.parse().unwrap_or(1.0);
                    for sample in clip.samples.iter_mut() {
                        *sample = (f64::from(*sample) * gain) as i16;
                    }
                }
                _ => {}
            }
        }
        write_clip(output, &clip)
    }

    fn reencode(&self, input: &Path, output: &Path, options: &OutputOptions) -> EngineResult<()> {
        let detail = options
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        self.enter("reencode", detail, output)?;
        fs::copy(input, output)?;
        Ok(())
    }

    fn probe(&self, path: &Path) -> EngineResult<ProbeInfo> {
        let clip = read_clip(path)?;
        Ok(ProbeInfo {
            channels: clip.spec.channels,
            sample_rate: clip.spec.sample_rate,
            bitrate_kbps: Some(
                clip.spec.sample_rate * u32::from(clip.spec.bits_per_sample) * u32::from(clip.spec.channels)
                    / 1000,
            ),
            duration_secs: Some(clip.duration_secs()),
        })
    }

    fn measure_tail(&self, path: &Path, tail: Duration) -> EngineResult<TailLevels> {
        let clip = read_clip(path)?;
        let count = frames(tail.as_secs_f64()).min(clip.samples.len()).max(1);
        let window = &clip.samples[clip.samples.len().saturating_sub(count)..];

        let to_db = |linear: f64| 20.0 * (linear / i16::MAX as f64).log10();
        let mean_square =
            window.iter().map(|s| f64::from(*s).powi(2)).sum::<f64>() / window.len().max(1) as f64;
        let peak = window.iter().map(|s| f64::from(*s).abs()).fold(0.0, f64::max);

        Ok(TailLevels {
            rms_db: to_db(mean_square.sqrt()),
            peak_db: to_db(peak),
            duration_secs: clip.duration_secs(),
        })
    }
}
