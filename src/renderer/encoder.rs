use crate::config::VideoConfig;
use crate::renderer::compositor::{Compositor, FilterGraph};
use crate::renderer::timeline::CompositionPlan;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Turns a finalized plan into a video file.
pub trait Renderer: Send + Sync {
    fn render(&self, plan: &CompositionPlan, mixed_audio: &Path, output: &Path) -> Result<()>;
}

/// Argument list for one ffmpeg invocation.
pub fn render_args(
    plan: &CompositionPlan,
    graph: &FilterGraph,
    mixed_audio: &Path,
    output: &Path,
    video: &VideoConfig,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
    ];

    for input in &graph.inputs {
        if input.extra_loops > 0 {
            args.push("-stream_loop".into());
            args.push(input.extra_loops.to_string());
        }
        args.push("-i".into());
        args.push(input.path.to_string_lossy().into_owned());
    }

    let audio_index = graph.inputs.len();
    args.push("-i".into());
    args.push(mixed_audio.to_string_lossy().into_owned());

    args.extend([
        "-filter_complex".to_string(),
        graph.filter.clone(),
        "-map".to_string(),
        format!("[{}]", graph.video_out),
        "-map".to_string(),
        format!("{}:a", audio_index),
        "-t".to_string(),
        format!("{:.3}", plan.duration()),
        "-r".to_string(),
        plan.fps().to_string(),
        "-c:v".to_string(),
        video.video_codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(), // Pixel format for compatibility
        "-c:a".to_string(),
        video.audio_codec.clone(),
    ]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Handles video encoding using external FFmpeg process
pub struct FfmpegRenderer {
    video: VideoConfig,
}

impl FfmpegRenderer {
    pub fn new(video: VideoConfig) -> Self {
        Self { video }
    }

    /// Check if FFmpeg is available
    pub fn is_available() -> bool {
        Command::new("ffmpeg").arg("-version").output().is_ok()
    }
}

impl Renderer for FfmpegRenderer {
    fn render(&self, plan: &CompositionPlan, mixed_audio: &Path, output: &Path) -> Result<()> {
        if !Self::is_available() {
            anyhow::bail!("FFmpeg not found. Please install ffmpeg to enable video encoding.");
        }

        info!(output = %output.display(), duration = plan.duration(), "Encoding video");

        let graph = Compositor::filter_graph(plan)?;
        let result = Command::new("ffmpeg")
            .args(render_args(plan, &graph, mixed_audio, output, &self.video))
            .output()
            .context("Failed to execute ffmpeg")?;

        if !result.status.success() {
            anyhow::bail!(
                "FFmpeg encoding failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        Ok(())
    }
}
