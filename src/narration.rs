use crate::audio::AudioClip;
use crate::budget::Timed;
use crate::config::AudioConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::RenderWorkspace;
use crate::services::{SpeechSynthesizer, VoiceParams, WordTimer};
use crate::text;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One recognized word, in seconds relative to the start of its segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub token: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    Title,
    /// Position of the comment in the thread, used for palette selection.
    Comment(usize),
}

/// What to narrate and how fast.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    pub role: SegmentRole,
    /// The line as shown in captions, speaker label included.
    pub text: String,
    pub speed: f64,
}

/// A synthesized, sped up and trimmed piece of narration.
#[derive(Debug, Clone)]
pub struct NarrationSegment {
    pub role: SegmentRole,
    pub text: String,
    /// Text that was actually spoken (speaker label removed).
    pub spoken: String,
    pub audio_path: PathBuf,
    pub clip: AudioClip,
    pub duration: f64,
    pub words: Vec<WordTiming>,
    /// Set when word timing failed and captions fall back to one block.
    pub timing_degraded: bool,
}

impl Timed for NarrationSegment {
    fn duration(&self) -> f64 {
        self.duration
    }
}

/// Builds narration segments through the synthesis and word-timing collaborators.
pub struct NarrationBuilder<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
    timer: &'a dyn WordTimer,
    audio: &'a AudioConfig,
    voice: VoiceParams,
    workspace: &'a RenderWorkspace,
}

impl<'a> NarrationBuilder<'a> {
    pub fn new(
        synthesizer: &'a dyn SpeechSynthesizer,
        timer: &'a dyn WordTimer,
        audio: &'a AudioConfig,
        voice: VoiceParams,
        workspace: &'a RenderWorkspace,
    ) -> Self {
        Self {
            synthesizer,
            timer,
            audio,
            voice,
            workspace,
        }
    }

    /// Build one segment. Timing failures degrade; everything else drops the segment.
    pub fn build(&self, request: &SegmentRequest) -> PipelineResult<NarrationSegment> {
        let spoken = match request.role {
            SegmentRole::Title => text::sanitize(&request.text),
            SegmentRole::Comment(_) => text::sanitize(text::split_speaker(&request.text).1),
        };
        if spoken.is_empty() {
            return Err(PipelineError::EmptySegment);
        }

        let stem = segment_stem(request);
        let bytes = self
            .synthesizer
            .synthesize(&spoken, &self.voice)
            .map_err(|e| PipelineError::SynthesisFailed(format!("{:#}", e)))?;

        let raw_path = self.workspace.file(&format!("{}_raw.wav", stem));
        std::fs::write(&raw_path, &bytes)?;

        let clip = AudioClip::from_file(&raw_path)
            .map_err(|e| PipelineError::SynthesisFailed(format!("{:#}", e)))?
            .speed(request.speed)
            .trim_silence(self.audio.silence_threshold_db, self.audio.min_silence_ms);

        let duration = clip.duration();
        if duration <= 0.0 {
            return Err(PipelineError::EmptySegment);
        }

        // Timing must come from the trimmed audio; trimming moves the first word.
        let audio_path = self.workspace.file(&format!("{}_trimmed.wav", stem));
        clip.write_wav(&audio_path)
            .map_err(|e| PipelineError::Audio(format!("{:#}", e)))?;

        let (words, timing_degraded) = match self.timer.word_timings(&audio_path) {
            Ok(words) if !words.is_empty() => (normalize_timings(words), false),
            Ok(_) => {
                let err = PipelineError::TimingUnavailable("recognizer returned no words".into());
                warn!(segment = %stem, "{}, using one caption for the segment", err);
                (Vec::new(), true)
            }
            Err(e) => {
                let err = PipelineError::TimingUnavailable(format!("{:#}", e));
                warn!(segment = %stem, "{}, using one caption for the segment", err);
                (Vec::new(), true)
            }
        };

        debug!(segment = %stem, duration, words = words.len(), "Narration segment ready");

        Ok(NarrationSegment {
            role: request.role,
            text: request.text.clone(),
            spoken,
            audio_path,
            clip,
            duration,
            words,
            timing_degraded,
        })
    }

    /// Build every request on a worker pool; results come back in request order.
    pub fn build_all(
        &self,
        requests: &[SegmentRequest],
        workers: usize,
    ) -> Vec<PipelineResult<NarrationSegment>> {
        info!(segments = requests.len(), workers, "Building narration");

        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| requests.par_iter().map(|r| self.build(r)).collect()),
            Err(e) => {
                warn!("Worker pool unavailable ({}), building sequentially", e);
                requests.iter().map(|r| self.build(r)).collect()
            }
        }
    }
}

/// Requests for the title and each narratable comment, in narration order.
///
/// Comments that reference links or files are filtered out here and never reach
/// the budget.
pub fn plan_requests(
    title: Option<&str>,
    comments: &[String],
    audio: &AudioConfig,
) -> Vec<SegmentRequest> {
    let mut requests = Vec::with_capacity(comments.len() + 1);
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        requests.push(SegmentRequest {
            role: SegmentRole::Title,
            text: title.to_string(),
            speed: audio.title_speed,
        });
    }
    for (index, line) in comments.iter().enumerate() {
        if text::is_disallowed(line) {
            info!(comment = index, "Skipping comment with link or file reference");
            continue;
        }
        requests.push(SegmentRequest {
            role: SegmentRole::Comment(index),
            text: line.clone(),
            speed: audio.comment_speed,
        });
    }
    requests
}

fn segment_stem(request: &SegmentRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", request.role).as_bytes());
    hasher.update(request.text.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    match request.role {
        SegmentRole::Title => format!("title_{}", hex),
        SegmentRole::Comment(i) => format!("comment_{}_{}", i, hex),
    }
}

/// Clamp `end >= start` and order by start.
fn normalize_timings(mut words: Vec<WordTiming>) -> Vec<WordTiming> {
    for word in &mut words {
        word.start = word.start.max(0.0);
        if word.end < word.start {
            word.end = word.start;
        }
    }
    words.sort_by(|a, b| a.start.total_cmp(&b.start));
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Speaks one second of tone per word, framed by half a second of silence.
    struct ToneSynth {
        seen: Mutex<Vec<String>>,
    }

    impl SpeechSynthesizer for ToneSynth {
        fn synthesize(&self, text: &str, _voice: &VoiceParams) -> Result<Vec<u8>> {
            self.seen.lock().unwrap().push(text.to_string());
            if text.contains("explode") {
                return Err(anyhow!("quota exceeded"));
            }
            let rate = 8000u32;
            let words = text.split_whitespace().count();
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut cursor = Cursor::new(Vec::new());
            {
                let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
                let silence = rate as usize / 2;
                let voiced = rate as usize * words;
                for i in 0..(silence * 2 + voiced) {
                    let value = if i >= silence && i < silence + voiced {
                        ((i as f32 * 0.3).sin() * 12000.0) as i16
                    } else {
                        0
                    };
                    writer.write_sample(value).unwrap();
                }
                writer.finalize().unwrap();
            }
            Ok(cursor.into_inner())
        }
    }

    struct ScriptedTimer {
        fail: bool,
    }

    impl WordTimer for ScriptedTimer {
        fn word_timings(&self, audio: &Path) -> Result<Vec<WordTiming>> {
            assert!(audio.to_string_lossy().ends_with("_trimmed.wav"));
            if self.fail {
                return Err(anyhow!("asr offline"));
            }
            Ok(vec![
                WordTiming { token: "b".into(), start: 0.6, end: 0.5 },
                WordTiming { token: "a".into(), start: 0.0, end: 0.4 },
            ])
        }
    }

    fn synth() -> ToneSynth {
        ToneSynth { seen: Mutex::new(Vec::new()) }
    }

    fn workspace(dir: &TempDir) -> RenderWorkspace {
        RenderWorkspace::create(dir.path(), "narration", 1, 0).unwrap()
    }

    fn comment(index: usize, text: &str) -> SegmentRequest {
        SegmentRequest {
            role: SegmentRole::Comment(index),
            text: text.into(),
            speed: 1.0,
        }
    }

    #[test]
    fn test_build_strips_speaker_and_trims() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let synth = synth();
        let timer = ScriptedTimer { fail: false };
        let audio = AudioConfig::default();
        let builder = NarrationBuilder::new(&synth, &timer, &audio, VoiceParams::default(), &ws);

        let segment = builder.build(&comment(0, "alice: two words")).unwrap();
        assert_eq!(synth.seen.lock().unwrap()[0], "two words");
        assert_eq!(segment.text, "alice: two words");
        assert!((segment.duration - 2.0).abs() < 0.05, "got {}", segment.duration);
        assert!(!segment.timing_degraded);
        assert_eq!(segment.words[0].token, "a");
        assert!(segment.words.iter().all(|w| w.end >= w.start));
        assert!(segment.audio_path.exists());
    }

    #[test]
    fn test_build_degrades_without_timing() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let synth = synth();
        let timer = ScriptedTimer { fail: true };
        let audio = AudioConfig::default();
        let builder = NarrationBuilder::new(&synth, &timer, &audio, VoiceParams::default(), &ws);

        let segment = builder.build(&comment(1, "bob: hello")).unwrap();
        assert!(segment.timing_degraded);
        assert!(segment.words.is_empty());
        assert!(segment.duration > 0.0);
    }

    #[test]
    fn test_build_failures_drop_segment() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let synth = synth();
        let timer = ScriptedTimer { fail: false };
        let audio = AudioConfig::default();
        let builder = NarrationBuilder::new(&synth, &timer, &audio, VoiceParams::default(), &ws);

        assert!(matches!(
            builder.build(&comment(0, "carol: explode now")),
            Err(PipelineError::SynthesisFailed(_))
        ));
        assert!(matches!(
            builder.build(&comment(1, "dave:   ")),
            Err(PipelineError::EmptySegment)
        ));
    }

    #[test]
    fn test_build_all_preserves_order() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let synth = synth();
        let timer = ScriptedTimer { fail: false };
        let audio = AudioConfig::default();
        let builder = NarrationBuilder::new(&synth, &timer, &audio, VoiceParams::default(), &ws);

        let requests: Vec<SegmentRequest> = (0..6)
            .map(|i| comment(i, &format!("user{}: {}", i, "word ".repeat(i + 1))))
            .collect();
        let results = builder.build_all(&requests, 3);

        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            let segment = result.as_ref().unwrap();
            assert_eq!(segment.role, SegmentRole::Comment(i));
            assert!((segment.duration - (i + 1) as f64).abs() < 0.05);
        }
    }

    #[test]
    fn test_plan_requests_filters_links() {
        let audio = AudioConfig::default();
        let comments = vec![
            "a: fine".to_string(),
            "b: see https://example.com".to_string(),
            "c: also fine".to_string(),
        ];
        let requests = plan_requests(Some("Title"), &comments, &audio);

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].role, SegmentRole::Title);
        assert_eq!(requests[1].role, SegmentRole::Comment(0));
        assert_eq!(requests[2].role, SegmentRole::Comment(2));
        assert!((requests[1].speed - audio.comment_speed).abs() < 1e-9);
    }
}
