//! Pipeline executor
//!
//! Walks the action queue in order and keeps exactly one "working file":
//! the output of the last applied action. Each action costs one engine
//! invocation, writes a fresh scratch file, and releases the previous
//! working file if the pipeline owns it.
//!
//! States: `Empty -> Running -> {Succeeded, Failed}`. A finished pipeline
//! must be `reset()` before it can render again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use super::action::{Action, ActionQueue, DurationPolicy, MixOptions, TrimOptions};
use super::temp::{TempFileRegistry, TempKind};
use crate::analysis::{TruncationOptions, TruncationReport};
use crate::config::{Bitrate, PipelineConfig, SilenceLayout};
use crate::engine::{extension_of, EngineResult, FfmpegGateway, OutputOptions, TranscodeGateway};
use crate::error::{Result, SfxError};
use crate::filters::{trim_graph, FilterChainBuilder, FilterOptions};

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Running,
    Succeeded,
    Failed,
}

/// Requests cancellation of a running pipeline between steps
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fluent audio edit pipeline.
///
/// ```no_run
/// use sfxmix::{DurationPolicy, MixOptions, Pipeline};
///
/// let mut sfx = Pipeline::new()?;
/// sfx.add("part1.mp3")
///     .silence(500)
///     .add("part2.mp3")
///     .mix("glitches.mp3", MixOptions::with_duration(DurationPolicy::First))
///     .save("out.mp3")?;
/// # Ok::<(), sfxmix::SfxError>(())
/// ```
pub struct Pipeline<G: TranscodeGateway = FfmpegGateway> {
    gateway: G,
    config: PipelineConfig,
    filters: FilterChainBuilder,
    queue: ActionQueue,
    registry: TempFileRegistry,
    /// Output of the last applied action
    current: Option<PathBuf>,
    state: PipelineState,
    /// Bitrate for this run once known
    bitrate_kbps: Option<u32>,
    cancel: CancelHandle,
}

impl Pipeline<FfmpegGateway> {
    /// Pipeline with default configuration driving ffmpeg from `PATH`
    pub fn new() -> Result<Self> {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Result<Self> {
        let gateway = FfmpegGateway::new(config.engine.clone());
        Self::with_gateway(gateway, config)
    }
}

impl<G: TranscodeGateway> Pipeline<G> {
    /// Pipeline over any engine gateway.
    ///
    /// # Errors
    /// * `TempDirUnavailable` - the scratch directory cannot be created
    pub fn with_gateway(gateway: G, config: PipelineConfig) -> Result<Self> {
        let registry = TempFileRegistry::create(
            &config.temp_root(),
            &config.native_extension,
            config.delete_retry.clone(),
        )?;
        Ok(Self {
            gateway,
            filters: FilterChainBuilder::new(config.filters.clone()),
            config,
            queue: ActionQueue::new(),
            registry,
            current: None,
            state: PipelineState::Empty,
            bitrate_kbps: None,
            cancel: CancelHandle::default(),
        })
    }

    // === Builder surface ===

    /// Append `source`, concatenating it after the current audio
    pub fn add(&mut self, source: impl Into<PathBuf>) -> &mut Self {
        self.queue.push(Action::Add {
            source: source.into(),
        });
        self
    }

    /// Mix `source` over the current audio; acts as `add` on an empty queue
    pub fn mix(&mut self, source: impl Into<PathBuf>, options: MixOptions) -> &mut Self {
        self.queue.push_mix(source.into(), options);
        self
    }

    /// Append `duration_ms` milliseconds of silence
    pub fn silence(&mut self, duration_ms: u64) -> &mut Self {
        self.queue.push(Action::Silence { duration_ms });
        self
    }

    /// Apply a named filter; options are checked when the pipeline runs
    pub fn filter(&mut self, name: &str, options: FilterOptions) -> &mut Self {
        self.queue.push(Action::Filter {
            name: name.to_string(),
            options,
        });
        self
    }

    /// Trim leading and trailing silence, optionally padding afterwards
    pub fn trim(&mut self, options: TrimOptions) -> &mut Self {
        self.queue.push(Action::Trim { options });
        self
    }

    /// Append a prebuilt action (e.g. from a JSON recipe)
    pub fn push(&mut self, action: Action) -> &mut Self {
        match action {
            Action::Mix { source, options } => self.queue.push_mix(source, options),
            other => self.queue.push(other),
        }
        self
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action>) -> &mut Self {
        for action in actions {
            self.push(action);
        }
        self
    }

    // === Execution ===

    /// Render the queue into `output` without extra output options
    pub fn save(&mut self, output: impl AsRef<Path>) -> Result<PathBuf> {
        self.finalize(output, &OutputOptions::new())
    }

    /// Render every queued action and write the result to `output`.
    ///
    /// The queue is consumed whether or not the run succeeds. On failure the
    /// pipeline-owned working file is removed before the error is returned.
    ///
    /// # Errors
    /// * `AlreadyFinalized` - the pipeline already ran; call `reset()` first
    /// * `EmptyPipeline` - nothing was queued
    /// * any step error (`SourceFileMissing`, `NoBaseAudio`, filter errors,
    ///   `Engine`, `Cancelled`, ...)
    pub fn finalize(&mut self, output: impl AsRef<Path>, options: &OutputOptions) -> Result<PathBuf> {
        let output = output.as_ref();
        self.begin()?;

        let actions = self.queue.drain();
        info!(
            "Rendering {} action(s) into {}",
            actions.len(),
            output.display()
        );

        let result = self
            .materialize(actions)
            .and_then(|()| self.deliver(output, options));
        let result = self.finish(result);

        if let Ok(path) = &result {
            info!("Wrote {}", path.display());
        }
        result
    }

    /// Render the queue into scratch space and check whether it ends cut off.
    ///
    /// The pipeline is reset afterwards, so one instance can check many files.
    pub fn is_truncated(&mut self, options: &TruncationOptions) -> Result<TruncationReport> {
        self.begin()?;
        let actions = self.queue.drain();

        let result = self.materialize(actions).and_then(|()| {
            let current = self.current.as_deref().ok_or(SfxError::EmptyPipeline)?;
            let levels = self
                .gateway
                .measure_tail(current, Duration::from_millis(options.tail_ms))?;
            Ok(TruncationReport::evaluate(&levels, options))
        });
        if let Some(current) = self.current.take() {
            self.registry.discard(&current);
        }

        let result = self.finish(result);
        self.reset();
        result
    }

    /// Forget queued actions and the working file, returning to `Empty`
    pub fn reset(&mut self) {
        self.queue.clear();
        if let Some(current) = self.current.take() {
            self.registry.discard(&current);
        }
        self.bitrate_kbps = None;
        self.cancel.clear();
        self.state = PipelineState::Empty;
    }

    /// Remove the scratch directory now instead of on drop
    pub fn teardown(mut self) {
        self.reset();
        self.registry.teardown();
    }

    // === Introspection ===

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn queued(&self) -> impl Iterator<Item = &Action> {
        self.queue.iter()
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn temp_dir(&self) -> &Path {
        self.registry.dir()
    }

    /// Files currently present in the scratch directory
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        self.registry.scratch_files()
    }

    /// Scratch files that could not be deleted
    pub fn leaked_files(&self) -> &[PathBuf] {
        self.registry.leaked()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // === Internals ===

    fn begin(&mut self) -> Result<()> {
        if self.state != PipelineState::Empty {
            return Err(SfxError::AlreadyFinalized);
        }
        self.state = PipelineState::Running;
        self.bitrate_kbps = match self.config.bitrate {
            Bitrate::Kbps(kbps) => Some(kbps),
            Bitrate::Auto => None,
        };
        Ok(())
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = PipelineState::Succeeded;
                self.current = None;
                Ok(value)
            }
            Err(err) => {
                warn!("Pipeline failed: {}", err);
                if let Some(current) = self.current.take() {
                    self.registry.discard(&current);
                }
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    fn materialize(&mut self, actions: Vec<Action>) -> Result<()> {
        if actions.is_empty() {
            return Err(SfxError::EmptyPipeline);
        }

        let total = actions.len();
        for (index, action) in actions.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SfxError::Cancelled);
            }
            debug!("Step {}/{}: {}", index + 1, total, action.kind());

            match action {
                Action::Add { source } => self.apply_add(&source)?,
                Action::Mix { source, options } => self.apply_mix(&source, options.duration)?,
                Action::Silence { duration_ms } => self.apply_silence(duration_ms)?,
                Action::Filter { name, options } => self.apply_filter(&name, &options)?,
                Action::Trim { options } => self.apply_trim(&options)?,
            }
        }
        Ok(())
    }

    fn apply_add(&mut self, source: &Path) -> Result<()> {
        let source = resolve_source(source)?;
        match self.current.clone() {
            None => self.current = Some(source),
            Some(current) => {
                let joined = self.concat(&[current.as_path(), source.as_path()])?;
                self.advance(joined);
            }
        }
        Ok(())
    }

    fn apply_mix(&mut self, source: &Path, policy: DurationPolicy) -> Result<()> {
        let current = self.current.clone().ok_or(SfxError::NoBaseAudio)?;
        let source = resolve_source(source)?;
        let bitrate = self.bitrate();

        let mixed = self.produce(TempKind::Mix, |gateway, output| {
            gateway.mix(&current, &source, policy, bitrate, output)
        })?;
        self.advance(mixed);
        Ok(())
    }

    fn apply_silence(&mut self, duration_ms: u64) -> Result<()> {
        let layout = self.silence_layout();
        let bitrate = self.bitrate();
        let duration_secs = duration_ms as f64 / 1000.0;

        let silence = self.produce(TempKind::Silence, |gateway, output| {
            gateway.generate_silence(duration_secs, &layout, bitrate, output)
        })?;

        match self.current.clone() {
            None => self.current = Some(silence),
            Some(current) => {
                let joined = self.concat(&[current.as_path(), silence.as_path()]);
                self.registry.discard(&silence);
                self.advance(joined?);
            }
        }
        Ok(())
    }

    fn apply_filter(&mut self, name: &str, options: &FilterOptions) -> Result<()> {
        let current = self.current.clone().ok_or(SfxError::NoAudioToFilter)?;
        let graph = self.filters.build(name, options)?;
        debug!("Filter '{}' -> {}", name, graph);
        self.filter_into(TempKind::Filter, &current, &graph)
    }

    fn apply_trim(&mut self, options: &TrimOptions) -> Result<()> {
        let current = self.current.clone().ok_or(SfxError::NoAudioToTrim)?;
        let graph = trim_graph(options, &self.config.trim);
        debug!("Trim -> {}", graph);
        self.filter_into(TempKind::Trim, &current, &graph)
    }

    fn filter_into(&mut self, kind: TempKind, current: &Path, graph: &str) -> Result<()> {
        let bitrate = self.bitrate();
        let filtered = self.produce(kind, |gateway, output| {
            gateway.apply_filter_graph(current, graph, bitrate, output)
        })?;
        self.advance(filtered);
        Ok(())
    }

    /// Stream-copy concatenation into a new scratch file
    fn concat(&mut self, inputs: &[&Path]) -> Result<PathBuf> {
        let list = self.registry.allocate(TempKind::ConcatList);
        let joined = self.produce(TempKind::Concat, |gateway, output| {
            gateway.concatenate(inputs, &list, output)
        });
        self.registry.discard(&list);
        joined
    }

    /// Run one engine step into a fresh scratch path; a failed step leaves
    /// nothing behind.
    fn produce<F>(&mut self, kind: TempKind, step: F) -> Result<PathBuf>
    where
        F: FnOnce(&G, &Path) -> EngineResult<()>,
    {
        let output = self.registry.allocate(kind);
        match step(&self.gateway, &output) {
            Ok(()) => Ok(output),
            Err(err) => {
                self.registry.discard(&output);
                Err(err.into())
            }
        }
    }

    /// Make `next` the working file, releasing the previous one if owned
    fn advance(&mut self, next: PathBuf) {
        if let Some(previous) = self.current.replace(next) {
            self.registry.discard(&previous);
        }
    }

    /// Bitrate for encoded steps, detecting it from the working file once
    fn bitrate(&mut self) -> u32 {
        if let Some(kbps) = self.bitrate_kbps {
            return kbps;
        }
        let Some(current) = self.current.as_deref() else {
            return self.config.fallback_bitrate_kbps;
        };

        let kbps = match self.gateway.probe(current) {
            Ok(info) => info.bitrate_kbps,
            Err(err) => {
                debug!("Bitrate probe of {} failed: {}", current.display(), err);
                None
            }
        }
        .unwrap_or(self.config.fallback_bitrate_kbps);

        debug!("Using {} kbps for this run", kbps);
        self.bitrate_kbps = Some(kbps);
        kbps
    }

    /// Channel layout for generated silence, matched to the working file
    fn silence_layout(&self) -> SilenceLayout {
        let fallback = self.config.silence_fallback.clone();
        match self.current.as_deref() {
            None => fallback,
            Some(current) => match self.gateway.probe(current) {
                Ok(info) if info.channels > 0 && info.sample_rate > 0 => info.layout(),
                Ok(_) => fallback,
                Err(err) => {
                    debug!("Layout probe of {} failed: {}", current.display(), err);
                    fallback
                }
            },
        }
    }

    /// Move or re-encode the working file into the caller's output path.
    ///
    /// Every write lands on a sibling staging file first and is renamed into
    /// place, so a failure never leaves a partial `output` behind.
    fn deliver(&mut self, output: &Path, options: &OutputOptions) -> Result<PathBuf> {
        let current = self.current.clone().ok_or(SfxError::EmptyPipeline)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let target = resolve_output(output)?;

        let native = extension_of(output).as_deref() == Some(self.config.native_extension.as_str());
        let reencode = !options.is_empty() || !native;

        if !reencode && same_file(&current, &target) {
            debug!("{} is already the output", target.display());
        } else if reencode {
            debug!("Re-encoding into {}", target.display());
            let staged = staging_path(&target);
            if let Err(err) = self.gateway.reencode(&current, &staged, options) {
                remove_staged(&staged);
                return Err(err.into());
            }
            install(&staged, &target)?;
            self.registry.discard(&current);
        } else if self.registry.is_owned(&current) {
            if let Err(err) = fs::rename(&current, &target) {
                debug!("Rename into {} failed ({}), copying", target.display(), err);
                copy_into(&current, &target)?;
                self.registry.discard(&current);
            }
        } else {
            // Caller's file: never move it away
            copy_into(&current, &target)?;
        }

        self.current = None;
        Ok(output.to_path_buf())
    }
}

/// `output` with its directory resolved, so aliases of a source compare equal
fn resolve_output(output: &Path) -> Result<PathBuf> {
    let file_name = output.file_name().ok_or_else(|| {
        SfxError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("output path {} has no file name", output.display()),
        ))
    })?;
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.canonicalize()?.join(file_name))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Hidden sibling of `target` that keeps its extension (the engine picks the
/// container from it)
fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}{}", stem, Uuid::new_v4().simple(), extension))
}

fn remove_staged(staged: &Path) {
    if let Err(err) = fs::remove_file(staged) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove staging file {}: {}", staged.display(), err);
        }
    }
}

/// Rename a staged file over `target`, dropping it if that fails
fn install(staged: &Path, target: &Path) -> Result<()> {
    fs::rename(staged, target).map_err(|err| {
        remove_staged(staged);
        SfxError::Io(err)
    })
}

fn copy_into(source: &Path, target: &Path) -> Result<()> {
    let staged = staging_path(target);
    if let Err(err) = fs::copy(source, &staged) {
        remove_staged(&staged);
        return Err(err.into());
    }
    install(&staged, target)
}

/// Absolute path of an existing source file
fn resolve_source(source: &Path) -> Result<PathBuf> {
    source
        .canonicalize()
        .ok()
        .filter(|path| path.is_file())
        .ok_or_else(|| SfxError::SourceFileMissing {
            path: source.to_path_buf(),
        })
}
