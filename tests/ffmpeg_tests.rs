//! FFmpeg Integration Tests
//!
//! Exercise the real engine. Every test returns early when ffmpeg or
//! ffprobe is not on `PATH`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use approx::assert_abs_diff_eq;
use serde_json::json;
use tempfile::TempDir;

use sfxmix::{
    DurationPolicy, FfmpegGateway, FilterOptions, MixOptions, OutputOptions, Pipeline,
    PipelineConfig, SfxError, TranscodeGateway, TrimOptions, TruncationOptions,
};

const TOLERANCE: f64 = 0.15;

fn engine_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|program| {
        Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

macro_rules! require_engine {
    () => {
        if !engine_available() {
            eprintln!("ffmpeg not available, skipping");
            return;
        }
    };
}

/// Generate an mp3 from a lavfi source, optionally with a filter
fn generate(path: &Path, source: &str, filter: Option<&str>) -> PathBuf {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostdin", "-y", "-f", "lavfi", "-i", source]);
    if let Some(filter) = filter {
        cmd.args(["-af", filter]);
    }
    cmd.args(["-ac", "2", "-ar", "44100", "-c:a", "libmp3lame", "-b:a", "128k"])
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    assert!(cmd.status().unwrap().success(), "fixture generation failed");
    path.to_path_buf()
}

fn sine(dir: &Path, name: &str, secs: f64) -> PathBuf {
    generate(
        &dir.join(name),
        &format!("sine=frequency=440:duration={}", secs),
        None,
    )
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        temp_root: Some(root.to_path_buf()),
        ..PipelineConfig::default()
    }
}

fn duration(path: &Path) -> f64 {
    FfmpegGateway::default()
        .probe(path)
        .unwrap()
        .duration_secs
        .unwrap()
}

fn setup() -> (TempDir, Pipeline) {
    let root = tempfile::tempdir().unwrap();
    let sfx = Pipeline::with_config(config(root.path())).unwrap();
    (root, sfx)
}

#[test]
fn test_concat_silence_and_mix() {
    require_engine!();
    let (root, mut sfx) = setup();
    let a = sine(root.path(), "a.mp3", 1.0);
    let b = sine(root.path(), "b.mp3", 1.0);
    let bed = sine(root.path(), "bed.mp3", 5.0);
    let out = root.path().join("out.mp3");

    sfx.add(&a)
        .silence(500)
        .add(&b)
        .mix(&bed, MixOptions::with_duration(DurationPolicy::First))
        .save(&out)
        .unwrap();

    assert_abs_diff_eq!(duration(&out), 2.5, epsilon = TOLERANCE);
    assert!(a.exists() && b.exists() && bed.exists());
    assert!(sfx.scratch_files().is_empty());
}

#[test]
fn test_tempo_outside_single_stage_range() {
    require_engine!();
    let (root, mut sfx) = setup();
    let a = sine(root.path(), "a.mp3", 4.0);
    let out = root.path().join("fast.mp3");

    let mut options = FilterOptions::new();
    options.insert("x".to_string(), json!(4));
    sfx.add(&a).filter("tempo", options).save(&out).unwrap();

    assert_abs_diff_eq!(duration(&out), 1.0, epsilon = TOLERANCE);
}

#[test]
fn test_trim_removes_edges_and_pads() {
    require_engine!();
    let (root, mut sfx) = setup();
    let padded = generate(
        &root.path().join("padded.mp3"),
        "sine=frequency=440:duration=1",
        Some("adelay=delays=1000:all=1,apad=pad_dur=1"),
    );
    let out = root.path().join("trimmed.mp3");

    sfx.add(&padded)
        .trim(TrimOptions::padded(200, 200))
        .save(&out)
        .unwrap();

    assert_abs_diff_eq!(duration(&out), 1.4, epsilon = TOLERANCE);
}

#[test]
fn test_reencode_to_other_container() {
    require_engine!();
    let (root, mut sfx) = setup();
    let a = sine(root.path(), "a.mp3", 1.0);
    let b = sine(root.path(), "b.mp3", 1.0);
    let out = root.path().join("out.wav");

    let mut options = OutputOptions::new();
    options.insert("ac".to_string(), "1".to_string());
    sfx.add(&a).add(&b).finalize(&out, &options).unwrap();

    let info = FfmpegGateway::default().probe(&out).unwrap();
    assert_eq!(info.channels, 1);
    assert_abs_diff_eq!(info.duration_secs.unwrap(), 2.0, epsilon = TOLERANCE);
}

#[test]
fn test_engine_error_cleans_up() {
    require_engine!();
    let (root, mut sfx) = setup();
    let a = sine(root.path(), "a.mp3", 1.0);
    let out = root.path().join("broken.mp3");

    let mut options = FilterOptions::new();
    options.insert("volume".to_string(), json!("not-a-volume(("));
    let err = sfx.add(&a).add(&a).filter("volume", options).save(&out).unwrap_err();

    assert!(matches!(err, SfxError::Engine(_)));
    assert!(!out.exists());
    assert!(sfx.scratch_files().is_empty());
}

#[test]
fn test_truncation_detection() {
    require_engine!();
    let (root, mut sfx) = setup();
    let cut = sine(root.path(), "cut.mp3", 1.0);
    let faded = generate(
        &root.path().join("faded.mp3"),
        "sine=frequency=440:duration=1",
        Some("apad=pad_dur=0.5"),
    );

    let options = TruncationOptions::default();
    assert!(sfx.add(&cut).is_truncated(&options).unwrap().truncated);
    assert!(!sfx.add(&faded).is_truncated(&options).unwrap().truncated);
}
