use std::path::{Path, PathBuf};

/// How many whole copies of a layer are needed to cover a target duration.
///
/// The rendered result is always cut to exactly `target` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopPlan {
    target: f64,
    copies: u32,
}

impl LoopPlan {
    pub fn cover(intrinsic: f64, target: f64) -> Self {
        let copies = if intrinsic > 0.0 && intrinsic < target {
            (target / intrinsic).floor() as u32 + 1
        } else {
            1
        };
        Self {
            target: target.max(0.0),
            copies,
        }
    }

    pub fn copies(&self) -> u32 {
        self.copies
    }

    /// Extra repetitions on top of the first copy (ffmpeg's `-stream_loop`).
    pub fn extra_loops(&self) -> u32 {
        self.copies - 1
    }

    pub fn needs_loop(&self) -> bool {
        self.copies > 1
    }

    /// Length of the layer after looping and truncation.
    pub fn duration(&self) -> f64 {
        self.target
    }
}

/// Final video length: the narration length, extended once if captions run past it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineDuration {
    narration: f64,
    extended: Option<f64>,
}

impl TimelineDuration {
    pub fn new(narration: f64) -> Self {
        Self {
            narration: narration.max(0.0),
            extended: None,
        }
    }

    /// Extend to `last_caption_end + pad` when captions overrun the narration.
    ///
    /// Only the first overrun extends; later calls leave the value alone.
    pub fn extend_for_captions(&mut self, last_caption_end: f64, pad: f64) -> f64 {
        if self.extended.is_none() && last_caption_end > self.narration {
            self.extended = Some(last_caption_end + pad);
        }
        self.seconds()
    }

    pub fn narration(&self) -> f64 {
        self.narration
    }

    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    pub fn seconds(&self) -> f64 {
        self.extended.unwrap_or(self.narration)
    }
}

/// Color key applied to the branded overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaKey {
    pub color: String,
    pub similarity: f32,
    pub blend: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualKind {
    /// Scaled to cover the frame and center-cropped.
    Primary,
    /// Picture-in-picture strip pinned to the bottom edge.
    Secondary { width: u32, max_height: u32 },
    /// Keyed overlay, bottom centered.
    Overlay { width: u32, key: ChromaKey },
    /// Title and word captions, burned in from a subtitle file.
    Captions,
}

impl VisualKind {
    fn stack_order(&self) -> u8 {
        match self {
            VisualKind::Primary => 0,
            VisualKind::Secondary { .. } => 1,
            VisualKind::Overlay { .. } => 2,
            VisualKind::Captions => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VisualKind::Primary => "primary",
            VisualKind::Secondary { .. } => "secondary",
            VisualKind::Overlay { .. } => "overlay",
            VisualKind::Captions => "captions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualLayer {
    pub kind: VisualKind,
    pub source: PathBuf,
    pub loop_plan: LoopPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Narration,
    Music,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioLayer {
    pub kind: AudioKind,
    pub source: PathBuf,
    pub gain: f32,
    pub loop_plan: LoopPlan,
}

/// Everything the renderer needs for one video. Immutable once finalized.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    duration: TimelineDuration,
    width: u32,
    height: u32,
    fps: u32,
    visual: Vec<VisualLayer>,
    audio: Vec<AudioLayer>,
}

impl CompositionPlan {
    pub fn builder(duration: TimelineDuration, width: u32, height: u32, fps: u32) -> PlanBuilder {
        PlanBuilder {
            duration,
            width,
            height,
            fps,
            visual: Vec::new(),
            audio: Vec::new(),
        }
    }

    /// Final duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration.seconds()
    }

    pub fn timeline(&self) -> &TimelineDuration {
        &self.duration
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Visual layers, bottom to top
    pub fn visual_layers(&self) -> &[VisualLayer] {
        &self.visual
    }

    pub fn audio_layers(&self) -> &[AudioLayer] {
        &self.audio
    }

    pub fn layer(&self, name: &str) -> Option<&VisualLayer> {
        self.visual.iter().find(|l| l.kind.name() == name)
    }
}

/// Collects layers with their intrinsic durations; loop plans are fixed at finalize.
pub struct PlanBuilder {
    duration: TimelineDuration,
    width: u32,
    height: u32,
    fps: u32,
    visual: Vec<(VisualKind, PathBuf, f64)>,
    audio: Vec<(AudioKind, PathBuf, f64, f32)>,
}

impl PlanBuilder {
    pub fn visual(mut self, kind: VisualKind, source: &Path, intrinsic: f64) -> Self {
        self.visual.push((kind, source.to_path_buf(), intrinsic));
        self
    }

    pub fn audio(mut self, kind: AudioKind, source: &Path, intrinsic: f64, gain: f32) -> Self {
        self.audio.push((kind, source.to_path_buf(), intrinsic, gain));
        self
    }

    pub fn finalize(self) -> CompositionPlan {
        let target = self.duration.seconds();

        let mut visual: Vec<VisualLayer> = self
            .visual
            .into_iter()
            .map(|(kind, source, intrinsic)| VisualLayer {
                kind,
                source,
                loop_plan: LoopPlan::cover(intrinsic, target),
            })
            .collect();
        // Stable: layers of the same kind keep insertion order.
        visual.sort_by_key(|l| l.kind.stack_order());

        let audio = self
            .audio
            .into_iter()
            .map(|(kind, source, intrinsic, gain)| {
                // Narration is padded to the target, never repeated.
                let intrinsic = match kind {
                    AudioKind::Narration => intrinsic.max(target),
                    AudioKind::Music => intrinsic,
                };
                AudioLayer {
                    kind,
                    source,
                    gain,
                    loop_plan: LoopPlan::cover(intrinsic, target),
                }
            })
            .collect();

        CompositionPlan {
            duration: self.duration,
            width: self.width,
            height: self.height,
            fps: self.fps,
            visual,
            audio,
        }
    }
}
