use crate::assets::{AssetLoader, AssetPicker, MediaProbe, SelectedAssets};
use crate::audio::AudioClip;
use crate::budget::{Allocation, BudgetAllocator, BudgetPolicy};
use crate::captions::{last_caption_end, SubtitleAligner, TitleCaption};
use crate::config::AppConfig;
use crate::error::{Disposition, PipelineError, PipelineResult};
use crate::narration::{plan_requests, NarrationBuilder, NarrationSegment, SegmentRole};
use crate::renderer::compositor::Compositor;
use crate::renderer::encoder::Renderer;
use crate::renderer::subtitles::SubtitleDocument;
use crate::renderer::timeline::{
    AudioKind, ChromaKey, CompositionPlan, TimelineDuration, VisualKind,
};
use crate::services::{SpeechSynthesizer, VoiceParams, WordTimer};
use crate::thread::ThreadContent;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

static RUN_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Assembly stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    BuildNarration,
    ComputeDuration,
    ExtendForCaptions,
    BuildLayers,
    Composite,
    Render,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::BuildNarration => "build-narration",
            Stage::ComputeDuration => "compute-duration",
            Stage::ExtendForCaptions => "extend-for-captions",
            Stage::BuildLayers => "build-layers",
            Stage::Composite => "composite",
            Stage::Render => "render",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// What happened to the temporary files of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Directory of intermediate files for one run, removed when dropped.
///
/// Every temp file is registered through [`RenderWorkspace::file`] and deleted
/// exactly once. Deletion retries with a backoff when the platform reports the
/// file as still locked, then gives up with a warning.
pub struct RenderWorkspace {
    dir: PathBuf,
    files: Mutex<Vec<PathBuf>>,
    retries: u32,
    backoff: Duration,
    cleaned: AtomicBool,
}

impl RenderWorkspace {
    pub fn create(root: &Path, name: &str, retries: u32, backoff_ms: u64) -> io::Result<Self> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(Vec::new()),
            retries,
            backoff: Duration::from_millis(backoff_ms),
            cleaned: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a new temp file, scheduled for removal.
    pub fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.clone());
        path
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Remove every registered file and the directory. Runs at most once.
    pub fn cleanup(&self) -> CleanupReport {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return CleanupReport::default();
        }

        let files: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        let mut report = CleanupReport::default();
        for path in &files {
            if remove_with_retry(path, self.retries, self.backoff, |p| std::fs::remove_file(p)) {
                report.removed += 1;
            } else {
                report.failed += 1;
            }
        }
        if !remove_with_retry(&self.dir, self.retries, self.backoff, |p| std::fs::remove_dir(p)) {
            debug!(dir = %self.dir.display(), "Workspace directory left behind");
        }
        report
    }
}

impl Drop for RenderWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Remove `path`, retrying while the platform reports it as locked.
fn remove_with_retry<F>(path: &Path, retries: u32, backoff: Duration, remove: F) -> bool
where
    F: Fn(&Path) -> io::Result<()>,
{
    let mut attempt = 0;
    loop {
        match remove(path) {
            Ok(()) => return true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied && attempt < retries => {
                attempt += 1;
                debug!(path = %path.display(), attempt, "File locked, retrying removal");
                std::thread::sleep(backoff);
            }
            Err(e) => {
                warn!(path = %path.display(), "Could not remove temp file: {}", e);
                return false;
            }
        }
    }
}

/// External collaborators used by the assembler.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub synthesizer: &'a dyn SpeechSynthesizer,
    pub timer: &'a dyn WordTimer,
    pub probe: &'a dyn MediaProbe,
    pub renderer: &'a dyn Renderer,
}

/// Summary of a produced video.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub duration: f64,
    pub narration_duration: f64,
    pub segments: usize,
    pub dropped_segments: usize,
    pub captions: usize,
    pub extended: bool,
}

/// Drives one thread from text to a rendered video.
pub struct TimelineAssembler<'a> {
    config: &'a AppConfig,
    services: Collaborators<'a>,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(config: &'a AppConfig, services: Collaborators<'a>) -> Self {
        Self { config, services }
    }

    fn enter(&self, stage: Stage) {
        info!(stage = %stage, "Stage started");
    }

    /// Run every stage. Temp files are removed on every exit path.
    pub fn assemble(
        &self,
        thread: &ThreadContent,
        output: &Path,
        picker: &mut AssetPicker,
    ) -> PipelineResult<AssemblyReport> {
        self.enter(Stage::Init);
        let run_id = format!(
            "run_{}_{}",
            std::process::id(),
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let workspace = RenderWorkspace::create(
            &self.config.output.temp_dir,
            &run_id,
            self.config.output.cleanup_retries,
            self.config.output.cleanup_backoff_ms,
        )?;

        let result = self.run_stages(thread, output, picker, &workspace);

        self.enter(Stage::Cleanup);
        let cleanup = workspace.cleanup();
        info!(
            removed = cleanup.removed,
            failed = cleanup.failed,
            "Temporary files released"
        );
        result
    }

    fn run_stages(
        &self,
        thread: &ThreadContent,
        output: &Path,
        picker: &mut AssetPicker,
        workspace: &RenderWorkspace,
    ) -> PipelineResult<AssemblyReport> {
        let config = self.config;
        let mut loader = AssetLoader::new(&config.assets.base_path, self.services.probe);
        let assets = loader.select(&config.assets, picker)?;
        let transition = self.load_transition(assets.transition.as_deref());

        self.enter(Stage::BuildNarration);
        let (allocation, dropped_segments) = self.build_narration(thread, workspace, &transition)?;

        self.enter(Stage::ComputeDuration);
        let narration = self.narration_track(&allocation, &transition);
        let narration_path = workspace.file("narration.wav");
        narration
            .write_wav(&narration_path)
            .map_err(|e| PipelineError::Audio(format!("{:#}", e)))?;
        let mut duration = TimelineDuration::new(narration.duration());
        info!(
            narration = duration.narration(),
            budgeted = allocation.total,
            "Narration track built"
        );

        self.enter(Stage::ExtendForCaptions);
        let aligner = SubtitleAligner::new(&config.captions);
        let captions = aligner.align_all(&allocation.slots);
        if let Some(end) = last_caption_end(&captions) {
            duration.extend_for_captions(end, config.budget.caption_pad);
        }
        if duration.is_extended() {
            info!(
                from = duration.narration(),
                to = duration.seconds(),
                "Extending video to fit the last caption"
            );
        }

        self.enter(Stage::BuildLayers);
        let (width, height) = (config.video.width, config.video.height);
        let mut subtitles = SubtitleDocument::new(width, height, &config.captions);
        subtitles.add_title(
            &TitleCaption::from_display_title(&thread.display_title()),
            duration.seconds(),
        );
        subtitles.add_captions(&captions);
        let subtitles_path = workspace.file("captions.ass");
        subtitles
            .write(&subtitles_path)
            .map_err(|e| PipelineError::RenderFailure(format!("{:#}", e)))?;

        let plan = self.build_plan(
            duration,
            &assets,
            &subtitles_path,
            &narration_path,
            narration.duration(),
        );

        self.enter(Stage::Composite);
        let mix_path = workspace.file("mix.wav");
        Compositor::mix_audio(&plan, &config.audio, &mix_path)
            .map_err(|e| PipelineError::Audio(format!("{:#}", e)))?;

        self.enter(Stage::Render);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.services
            .renderer
            .render(&plan, &mix_path, output)
            .map_err(|e| PipelineError::RenderFailure(format!("{:#}", e)))?;

        Ok(AssemblyReport {
            output: output.to_path_buf(),
            duration: plan.duration(),
            narration_duration: plan.timeline().narration(),
            segments: allocation.slots.len() + usize::from(allocation.title.is_some()),
            dropped_segments,
            captions: captions.len(),
            extended: plan.timeline().is_extended(),
        })
    }

    /// Sped up and attenuated transition sound; silent when unavailable.
    fn load_transition(&self, path: Option<&Path>) -> AudioClip {
        let audio = &self.config.audio;
        let silent = || AudioClip::silence(0.0, audio.sample_rate, audio.channels);
        let Some(path) = path else {
            return silent();
        };
        match AudioClip::from_file(path) {
            Ok(clip) => clip
                .speed(audio.transition_speed)
                .gain(audio.transition_volume)
                .resample(audio.sample_rate, audio.channels),
            Err(e) => {
                warn!("Transition sound unreadable, segments will join directly: {:#}", e);
                silent()
            }
        }
    }

    fn build_narration(
        &self,
        thread: &ThreadContent,
        workspace: &RenderWorkspace,
        transition: &AudioClip,
    ) -> PipelineResult<(Allocation<NarrationSegment>, usize)> {
        let config = self.config;
        let lines: Vec<String> = thread
            .narration_comments()
            .iter()
            .map(|c| c.display_line())
            .collect();
        let requests = plan_requests(Some(&thread.title), &lines, &config.audio);

        let builder = NarrationBuilder::new(
            self.services.synthesizer,
            self.services.timer,
            &config.audio,
            VoiceParams::from_config(&config.services),
            workspace,
        );

        let mut title = None;
        let mut comments = Vec::new();
        let mut dropped = 0;
        for (request, result) in requests
            .iter()
            .zip(builder.build_all(&requests, config.output.worker_count()))
        {
            match result {
                Ok(segment) if segment.role == SegmentRole::Title => title = Some(segment),
                Ok(segment) => comments.push(segment),
                Err(e) if e.disposition() == Disposition::DropSegment => {
                    warn!(role = ?request.role, "Dropping segment: {}", e);
                    dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let policy = BudgetPolicy::new(&config.budget, transition.duration());
        let allocator = BudgetAllocator::new(policy);
        let mut allocation = allocator.admit(title, comments)?;
        // Colors follow the comment's place in the thread, not its place among survivors.
        for slot in &mut allocation.slots {
            if let SegmentRole::Comment(index) = slot.segment.role {
                slot.color_index = index;
            }
        }
        info!(
            segments = allocation.slots.len(),
            dropped = allocation.dropped,
            total = allocation.total,
            "Narration budgeted"
        );
        let dropped = dropped + allocation.dropped;
        Ok((allocation, dropped))
    }

    /// `[title, transition]` then `[comment, transition]` per accepted comment.
    fn narration_track(
        &self,
        allocation: &Allocation<NarrationSegment>,
        transition: &AudioClip,
    ) -> AudioClip {
        let mut parts: Vec<&AudioClip> = Vec::new();
        if let Some(title) = &allocation.title {
            parts.push(&title.segment.clip);
            parts.push(transition);
        }
        for slot in &allocation.slots {
            parts.push(&slot.segment.clip);
            parts.push(transition);
        }
        AudioClip::concat(&parts, self.config.audio.sample_rate, self.config.audio.channels)
    }

    fn build_plan(
        &self,
        duration: TimelineDuration,
        assets: &SelectedAssets,
        subtitles: &Path,
        narration: &Path,
        narration_length: f64,
    ) -> CompositionPlan {
        let config = self.config;
        let (width, height) = (config.video.width, config.video.height);
        let mut builder = CompositionPlan::builder(duration, width, height, config.video.fps)
            .visual(
                VisualKind::Primary,
                &assets.primary.path,
                assets.primary.duration,
            );

        if let Some(secondary) = &assets.secondary {
            builder = builder.visual(
                VisualKind::Secondary {
                    width: width * 4 / 5,
                    max_height: height * 3 / 10,
                },
                &secondary.path,
                secondary.duration,
            );
        }
        if let Some(overlay) = &assets.overlay {
            builder = builder.visual(
                VisualKind::Overlay {
                    width: config.assets.overlay_width,
                    key: ChromaKey {
                        color: config.assets.chroma_key.clone(),
                        similarity: config.assets.chroma_similarity,
                        blend: config.assets.chroma_blend,
                    },
                },
                &overlay.path,
                overlay.duration,
            );
        }
        builder = builder
            .visual(VisualKind::Captions, subtitles, duration.seconds())
            .audio(AudioKind::Narration, narration, narration_length, 1.0);
        if let Some(music) = &assets.music {
            builder = builder.audio(
                AudioKind::Music,
                &music.path,
                music.duration,
                config.audio.music_volume,
            );
        }
        builder.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_removes_files_on_drop() {
        let root = TempDir::new().unwrap();
        let kept;
        {
            let ws = RenderWorkspace::create(root.path(), "run", 2, 0).unwrap();
            let a = ws.file("a.wav");
            std::fs::write(&a, b"x").unwrap();
            let _never_written = ws.file("b.wav");
            assert_eq!(ws.pending(), 2);
            kept = ws.dir().to_path_buf();
        }
        assert!(!kept.exists());
    }

    #[test]
    fn test_cleanup_runs_once() {
        let root = TempDir::new().unwrap();
        let ws = RenderWorkspace::create(root.path(), "run", 2, 0).unwrap();
        std::fs::write(ws.file("a.wav"), b"x").unwrap();

        let first = ws.cleanup();
        assert_eq!(first, CleanupReport { removed: 1, failed: 0 });
        assert_eq!(ws.cleanup(), CleanupReport::default());
    }

    #[test]
    fn test_remove_retries_locked_files() {
        use std::cell::Cell;
        let calls = Cell::new(0);
        let flaky = |_: &Path| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            } else {
                Ok(())
            }
        };
        assert!(remove_with_retry(Path::new("x"), 5, Duration::ZERO, flaky));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_remove_gives_up() {
        use std::cell::Cell;
        let calls = Cell::new(0);
        let locked = |_: &Path| {
            calls.set(calls.get() + 1);
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        };
        assert!(!remove_with_retry(Path::new("x"), 2, Duration::ZERO, locked));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ExtendForCaptions.to_string(), "extend-for-captions");
        assert_eq!(Stage::Cleanup.to_string(), "cleanup");
    }
}
