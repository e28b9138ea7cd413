use crate::audio::{AudioClip, AudioMixer};
use crate::config::AudioConfig;
use crate::renderer::timeline::{CompositionPlan, VisualKind};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One ffmpeg input with its repeat count.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub path: PathBuf,
    /// Passed as `-stream_loop`; zero plays the file once.
    pub extra_loops: u32,
}

/// Inputs and `-filter_complex` graph for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    pub inputs: Vec<InputSpec>,
    pub filter: String,
    /// Label of the final video stream.
    pub video_out: String,
}

/// Stacks the plan's layers into a single video stream and a single audio bed
pub struct Compositor;

impl Compositor {
    /// Build the filter graph, bottom layer first.
    pub fn filter_graph(plan: &CompositionPlan) -> Result<FilterGraph> {
        let (width, height) = plan.dimensions();
        let duration = format!("{:.3}", plan.duration());
        let mut inputs = Vec::new();
        let mut chains: Vec<String> = Vec::new();
        let mut current: Option<String> = None;

        for (position, layer) in plan.visual_layers().iter().enumerate() {
            let label = format!("v{}", position);
            match &layer.kind {
                VisualKind::Primary => {
                    let index = inputs.len();
                    inputs.push(InputSpec {
                        path: layer.source.clone(),
                        extra_loops: layer.loop_plan.extra_loops(),
                    });
                    chains.push(format!(
                        "[{index}:v]trim=duration={duration},setpts=PTS-STARTPTS,\
                         scale={width}:{height}:force_original_aspect_ratio=increase,\
                         crop={width}:{height},setsar=1[{label}]"
                    ));
                }
                VisualKind::Secondary { width: w, max_height } => {
                    let base = current
                        .as_deref()
                        .context("Secondary layer has nothing to sit on")?;
                    let index = inputs.len();
                    inputs.push(InputSpec {
                        path: layer.source.clone(),
                        extra_loops: layer.loop_plan.extra_loops(),
                    });
                    chains.push(format!(
                        "[{index}:v]trim=duration={duration},setpts=PTS-STARTPTS,\
                         scale={w}:-2,crop=iw:min(ih\\,{max_height}),setsar=1[s{position}];\
                         [{base}][s{position}]overlay=x=(W-w)/2:y=H-h[{label}]"
                    ));
                }
                VisualKind::Overlay { width: w, key } => {
                    let base = current
                        .as_deref()
                        .context("Overlay layer has nothing to sit on")?;
                    let index = inputs.len();
                    inputs.push(InputSpec {
                        path: layer.source.clone(),
                        extra_loops: layer.loop_plan.extra_loops(),
                    });
                    chains.push(format!(
                        "[{index}:v]trim=duration={duration},setpts=PTS-STARTPTS,\
                         colorkey={}:{}:{},scale={w}:-2[o{position}];\
                         [{base}][o{position}]overlay=x=(W-w)/2:y=H-h[{label}]",
                        key.color.replace('#', "0x"),
                        key.similarity,
                        key.blend
                    ));
                }
                VisualKind::Captions => {
                    let base = current
                        .as_deref()
                        .context("Captions have nothing to sit on")?;
                    chains.push(format!(
                        "[{base}]subtitles=filename={}[{label}]",
                        escape_filter_path(&layer.source)
                    ));
                }
            }
            current = Some(label);
        }

        let video_out = current.context("Composition has no primary background layer")?;
        debug!(inputs = inputs.len(), "Filter graph built");

        Ok(FilterGraph {
            inputs,
            filter: chains.join(";"),
            video_out,
        })
    }

    /// Mix the plan's audio layers into one WAV of exactly the plan duration.
    ///
    /// Narration is padded with silence; looping layers repeat then get cut.
    pub fn mix_audio(plan: &CompositionPlan, audio: &AudioConfig, output: &Path) -> Result<()> {
        let duration = plan.duration();
        let mut mixer = AudioMixer::new(audio.sample_rate, audio.channels);

        for layer in plan.audio_layers() {
            let clip = AudioClip::from_file(&layer.source).with_context(|| {
                format!("Failed to load audio layer: {}", layer.source.display())
            })?;
            let fitted = if layer.loop_plan.needs_loop() {
                clip.looped_to(duration)
            } else {
                clip.truncated(duration)
            };
            mixer.add_track(fitted, 0.0, layer.gain);
        }

        mixer.mix(duration).write_wav(output)
    }
}

/// Escape a path for use as a filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for ch in path.to_string_lossy().chars() {
        match ch {
            '\\' => escaped.push('/'),
            ':' | '\'' | ',' | ';' | '[' | ']' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::timeline::{AudioKind, ChromaKey, TimelineDuration};
    use tempfile::TempDir;

    fn full_plan() -> CompositionPlan {
        CompositionPlan::builder(TimelineDuration::new(40.0), 1080, 1920, 24)
            .visual(VisualKind::Primary, Path::new("bg.mp4"), 15.0)
            .visual(
                VisualKind::Secondary {
                    width: 864,
                    max_height: 576,
                },
                Path::new("add1.mp4"),
                50.0,
            )
            .visual(
                VisualKind::Overlay {
                    width: 1300,
                    key: ChromaKey {
                        color: "#00FF00".into(),
                        similarity: 0.3,
                        blend: 0.1,
                    },
                },
                Path::new("follow.mp4"),
                8.0,
            )
            .visual(VisualKind::Captions, Path::new("/tmp/run:1/captions.ass"), 40.0)
            .finalize()
    }

    #[test]
    fn test_filter_graph_stacks_layers() {
        let graph = Compositor::filter_graph(&full_plan()).unwrap();

        assert_eq!(graph.inputs.len(), 3);
        assert_eq!(graph.inputs[0].extra_loops, 2);
        assert_eq!(graph.inputs[1].extra_loops, 0);
        assert_eq!(graph.inputs[2].extra_loops, 5);
        assert_eq!(graph.video_out, "v3");

        assert!(graph.filter.starts_with("[0:v]trim=duration=40.000"));
        assert!(graph.filter.contains("crop=1080:1920"));
        assert!(graph.filter.contains("[v0][s1]overlay=x=(W-w)/2:y=H-h[v1]"));
        assert!(graph.filter.contains("colorkey=0x00FF00:0.3:0.1"));
        assert!(graph.filter.contains("[v2]subtitles=filename=/tmp/run\\:1/captions.ass[v3]"));
    }

    #[test]
    fn test_filter_graph_without_optional_layers() {
        let plan = CompositionPlan::builder(TimelineDuration::new(31.0), 1080, 1920, 24)
            .visual(VisualKind::Primary, Path::new("bg.mp4"), 60.0)
            .finalize();
        let graph = Compositor::filter_graph(&plan).unwrap();
        assert_eq!(graph.inputs.len(), 1);
        assert_eq!(graph.video_out, "v0");
    }

    #[test]
    fn test_filter_graph_requires_primary() {
        let plan = CompositionPlan::builder(TimelineDuration::new(31.0), 1080, 1920, 24)
            .visual(VisualKind::Captions, Path::new("subs.ass"), 31.0)
            .finalize();
        assert!(Compositor::filter_graph(&plan).is_err());
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("C:\\tmp\\it's.ass")),
            "C\\:/tmp/it\\'s.ass"
        );
    }

    #[test]
    fn test_mix_audio_exact_length() {
        let dir = TempDir::new().unwrap();
        let narration = dir.path().join("narration.wav");
        let music = dir.path().join("music.wav");
        AudioClip::new(vec![0.3; 8000 * 3], 8000, 1).write_wav(&narration).unwrap();
        AudioClip::new(vec![0.5; 8000], 8000, 1).write_wav(&music).unwrap();

        let plan = CompositionPlan::builder(TimelineDuration::new(3.5), 1080, 1920, 24)
            .audio(AudioKind::Narration, &narration, 3.0, 1.0)
            .audio(AudioKind::Music, &music, 1.0, 0.1)
            .finalize();
        let audio = AudioConfig {
            sample_rate: 8000,
            channels: 1,
            ..AudioConfig::default()
        };
        let output = dir.path().join("mix.wav");
        Compositor::mix_audio(&plan, &audio, &output).unwrap();

        let mixed = AudioClip::from_file(&output).unwrap();
        assert_eq!(mixed.frames(), 28000);
        // Past the narration only the music bed remains.
        let tail = mixed.samples()[27000];
        assert!((tail - 0.05f32.tanh()).abs() < 1e-3, "tail sample {}", tail);
    }
}
