//! ffmpeg/ffprobe backed gateway
//!
//! Each gateway call spawns exactly one ffmpeg (or ffprobe) process and
//! waits for it. stderr is drained on a helper thread so a chatty engine
//! can never block on a full pipe while we wait.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use serde::Deserialize;

use super::format::{codec_for_extension, extension_of};
use super::{EngineError, EngineResult, OutputOptions, ProbeInfo, TailLevels, TranscodeGateway};
use crate::config::{EngineConfig, SilenceLayout};
use crate::pipeline::DurationPolicy;

/// Poll interval while waiting on a child with a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Codecs that take a `-b:a` bitrate
const LOSSY_CODECS: &[&str] = &["libmp3lame", "libvorbis", "libopus", "aac"];

/// Gateway driving the ffmpeg command line tools
#[derive(Debug, Clone, Default)]
pub struct FfmpegGateway {
    config: EngineConfig,
}

impl FfmpegGateway {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Base ffmpeg command: quiet banner, never prompt, overwrite outputs
    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(["-hide_banner", "-nostdin", "-y"]);
        cmd
    }

    /// Run a command to completion and return its stderr
    fn run(&self, mut cmd: Command) -> EngineResult<String> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        debug!("Running {:?}", cmd);

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut stderr = child.stderr.take().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "engine stderr was not captured",
            ))
        })?;
        let reader = thread::spawn(move || {
            let mut raw = Vec::new();
            let _ = stderr.read_to_end(&mut raw);
            String::from_utf8_lossy(&raw).into_owned()
        });

        let status: ExitStatus = match self.config.step_timeout() {
            None => child.wait()?,
            Some(limit) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = reader.join();
                        return Err(EngineError::Timeout {
                            program,
                            after: limit,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        let stderr = reader.join().unwrap_or_default();
        if !status.success() {
            return Err(EngineError::Failed {
                program,
                status: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stderr)
    }

    /// Run a command that must leave `output` behind
    fn run_producing(&self, cmd: Command, output: &Path) -> EngineResult<()> {
        let stderr = self.run(cmd)?;
        if !output.exists() {
            return Err(EngineError::Failed {
                program: self.config.ffmpeg_path.to_string_lossy().into_owned(),
                status: Some(0),
                stderr: format!("no output produced at {}: {}", output.display(), stderr.trim()),
            });
        }
        Ok(())
    }

    /// Append codec (and bitrate, for lossy codecs) matching the output extension
    fn encode_args(cmd: &mut Command, output: &Path, bitrate_kbps: u32) {
        if let Some(codec) = extension_of(output).as_deref().and_then(codec_for_extension) {
            cmd.args(["-c:a", codec]);
            if LOSSY_CODECS.contains(&codec) {
                cmd.arg("-b:a").arg(format!("{}k", bitrate_kbps));
            }
        }
        cmd.arg(output);
    }
}

impl TranscodeGateway for FfmpegGateway {
    fn concatenate(&self, inputs: &[&Path], list_path: &Path, output: &Path) -> EngineResult<()> {
        fs::write(list_path, concat_list(inputs))?;

        let mut cmd = self.ffmpeg();
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_path)
            .args(["-c", "copy"])
            .arg(output);
        self.run_producing(cmd, output)
    }

    fn mix(
        &self,
        first: &Path,
        second: &Path,
        policy: DurationPolicy,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(first)
            .arg("-i")
            .arg(second)
            .arg("-filter_complex")
            .arg(format!("amix=inputs=2:duration={}", policy.as_str()));
        Self::encode_args(&mut cmd, output, bitrate_kbps);
        self.run_producing(cmd, output)
    }

    fn generate_silence(
        &self,
        duration_secs: f64,
        layout: &SilenceLayout,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-f", "lavfi", "-t"])
            .arg(duration_secs.to_string())
            .arg("-i")
            .arg(format!(
                "anullsrc=channel_layout={}:sample_rate={}",
                layout.channel_layout(),
                layout.sample_rate
            ));
        Self::encode_args(&mut cmd, output, bitrate_kbps);
        self.run_producing(cmd, output)
    }

    fn apply_filter_graph(
        &self,
        input: &Path,
        graph: &str,
        bitrate_kbps: u32,
        output: &Path,
    ) -> EngineResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(input).arg("-af").arg(graph);
        Self::encode_args(&mut cmd, output, bitrate_kbps);
        self.run_producing(cmd, output)
    }

    fn reencode(&self, input: &Path, output: &Path, options: &OutputOptions) -> EngineResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(input);
        if options.is_empty() {
            if let Some(codec) = extension_of(output).as_deref().and_then(codec_for_extension) {
                cmd.args(["-c:a", codec]);
            }
        } else {
            for (key, value) in options {
                cmd.arg(format!("-{}", key)).arg(value);
            }
        }
        cmd.arg(output);
        self.run_producing(cmd, output)
    }

    fn probe(&self, path: &Path) -> EngineResult<ProbeInfo> {
        let program = self.config.ffprobe_path.to_string_lossy().into_owned();
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=channels,sample_rate,bit_rate:format=duration,bit_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                program,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_json(path, &String::from_utf8_lossy(&output.stdout))
    }

    fn measure_tail(&self, path: &Path, tail: Duration) -> EngineResult<TailLevels> {
        let duration_secs = self
            .probe(path)?
            .duration_secs
            .ok_or_else(|| EngineError::Probe {
                path: path.to_path_buf(),
                reason: "duration unknown".to_string(),
            })?;
        let start = (duration_secs - tail.as_secs_f64()).max(0.0);

        let mut cmd = self.ffmpeg();
        cmd.arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(path)
            .args(["-af", "astats", "-f", "null", "-"]);
        let stderr = self.run(cmd)?;

        let (rms_db, peak_db) = parse_astats(&stderr).ok_or_else(|| EngineError::Probe {
            path: path.to_path_buf(),
            reason: "astats produced no level readings".to_string(),
        })?;

        Ok(TailLevels {
            rms_db,
            peak_db,
            duration_secs,
        })
    }
}

/// Body of a concat demuxer list file
fn concat_list(inputs: &[&Path]) -> String {
    inputs
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    channels: Option<u16>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

fn parse_probe_json(path: &Path, json: &str) -> EngineResult<ProbeInfo> {
    let probe_err = |reason: String| EngineError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let parsed: ProbeOutput =
        serde_json::from_str(json).map_err(|e| probe_err(format!("bad ffprobe output: {}", e)))?;
    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| probe_err("no audio stream".to_string()))?;

    let channels = stream
        .channels
        .ok_or_else(|| probe_err("channel count missing".to_string()))?;
    let sample_rate = stream
        .sample_rate
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| probe_err("sample rate missing".to_string()))?;

    let format_bit_rate = parsed.format.as_ref().and_then(|f| f.bit_rate.as_deref());
    let bitrate_kbps = stream
        .bit_rate
        .as_deref()
        .or(format_bit_rate)
        .and_then(|s| s.parse::<u64>().ok())
        .map(|bps| ((bps + 500) / 1000) as u32)
        .filter(|kbps| *kbps > 0);
    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok());

    Ok(ProbeInfo {
        channels,
        sample_rate,
        bitrate_kbps,
        duration_secs,
    })
}

/// Overall RMS and peak level from astats output.
///
/// Prefers the "Overall" section; falls back to the last per-channel reading.
fn parse_astats(stderr: &str) -> Option<(f64, f64)> {
    let section = stderr
        .rfind("Overall")
        .map(|idx| &stderr[idx..])
        .unwrap_or(stderr);

    let reading = |text: &str, label: &str| -> Option<f64> {
        text.lines()
            .filter_map(|line| line.split_once(label).map(|(_, rest)| rest.trim()))
            .filter_map(|value| value.parse::<f64>().ok())
            .last()
    };

    let rms = reading(section, "RMS level dB:").or_else(|| reading(stderr, "RMS level dB:"))?;
    let peak = reading(section, "Peak level dB:").or_else(|| reading(stderr, "Peak level dB:"))?;
    Some((rms, peak))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let a = PathBuf::from("/tmp/a.mp3");
        let b = PathBuf::from("/tmp/it's.mp3");
        let list = concat_list(&[a.as_path(), b.as_path()]);
        assert_eq!(list, "file '/tmp/a.mp3'\nfile '/tmp/it'\\''s.mp3'\n");
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "programs": [],
            "streams": [{ "channels": 1, "sample_rate": "22050", "bit_rate": "64000" }],
            "format": { "duration": "1.250000", "bit_rate": "65000" }
        }"#;
        let info = parse_probe_json(Path::new("a.mp3"), json).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 22050);
        assert_eq!(info.bitrate_kbps, Some(64));
        assert_eq!(info.duration_secs, Some(1.25));
    }

    #[test]
    fn test_parse_probe_json_falls_back_to_format_bitrate() {
        let json = r#"{
            "streams": [{ "channels": 2, "sample_rate": "44100" }],
            "format": { "duration": "3.0", "bit_rate": "192000" }
        }"#;
        let info = parse_probe_json(Path::new("a.ogg"), json).unwrap();
        assert_eq!(info.bitrate_kbps, Some(192));
    }

    #[test]
    fn test_parse_probe_json_without_audio() {
        let err = parse_probe_json(Path::new("v.mp4"), r#"{ "streams": [] }"#).unwrap_err();
        assert!(matches!(err, EngineError::Probe { .. }));
    }

    #[test]
    fn test_parse_astats_prefers_overall() {
        let stderr = "\
[Parsed_astats_0 @ 0x1] Channel: 1
[Parsed_astats_0 @ 0x1] Peak level dB: -3.000000
[Parsed_astats_0 @ 0x1] RMS level dB: -12.500000
[Parsed_astats_0 @ 0x1] Overall
[Parsed_astats_0 @ 0x1] Peak level dB: -2.000000
[Parsed_astats_0 @ 0x1] RMS level dB: -10.000000
";
        assert_eq!(parse_astats(stderr), Some((-10.0, -2.0)));
    }

    #[test]
    fn test_parse_astats_silence_is_negative_infinity() {
        let stderr = "[Parsed_astats_0 @ 0x1] Overall\n\
                      [Parsed_astats_0 @ 0x1] Peak level dB: -inf\n\
                      [Parsed_astats_0 @ 0x1] RMS level dB: -inf\n";
        let (rms, peak) = parse_astats(stderr).unwrap();
        assert!(rms.is_infinite() && rms < 0.0);
        assert!(peak.is_infinite() && peak < 0.0);
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let gateway = FfmpegGateway::new(EngineConfig {
            ffprobe_path: PathBuf::from("/definitely/not/ffprobe"),
            ..EngineConfig::default()
        });
        let err = gateway.probe(Path::new("a.mp3")).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_is_killed_at_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("hang.sh");
        fs::write(&engine, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();

        let gateway = FfmpegGateway::new(EngineConfig {
            ffmpeg_path: engine,
            step_timeout_secs: Some(1),
            ..EngineConfig::default()
        });
        let started = Instant::now();
        let err = gateway
            .apply_filter_graph(
                Path::new("in.mp3"),
                "volume=0.5",
                128,
                &dir.path().join("out.mp3"),
            )
            .unwrap_err();

        match err {
            EngineError::Timeout { after, .. } => assert_eq!(after, Duration::from_secs(1)),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!dir.path().join("out.mp3").exists());
    }
}
