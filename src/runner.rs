use crate::assets::AssetPicker;
use crate::config::AppConfig;
use crate::error::{PipelineError, RunOutcome};
use crate::ledger::UsedThreadLedger;
use crate::parser::ThreadParser;
use crate::pipeline::TimelineAssembler;
use crate::services::rewrite::rewrite_or_passthrough;
use crate::services::{ContentRewriter, ThreadSource};
use crate::text;
use crate::thread::{RewrittenThread, ThreadContent};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const DEFAULT_STEM: &str = "thread_video";
const MAX_STEM_CHARS: usize = 60;

/// Counts across a batch of attempts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopSummary {
    pub attempts: usize,
    pub produced: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

impl LoopSummary {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Produced(path) => self.produced.push(path.clone()),
            RunOutcome::Skipped(_) => self.skipped += 1,
            RunOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Produces videos one thread at a time and keeps the used-thread ledger current.
pub struct GenerationLoop<'a> {
    config: &'a AppConfig,
    assembler: TimelineAssembler<'a>,
    rewriter: Option<&'a dyn ContentRewriter>,
    ledger: UsedThreadLedger,
    picker: AssetPicker,
}

impl<'a> GenerationLoop<'a> {
    pub fn new(
        config: &'a AppConfig,
        assembler: TimelineAssembler<'a>,
        rewriter: Option<&'a dyn ContentRewriter>,
        ledger: UsedThreadLedger,
    ) -> Self {
        Self {
            config,
            assembler,
            rewriter,
            ledger,
            picker: AssetPicker::new(config.assets.seed),
        }
    }

    pub fn ledger(&self) -> &UsedThreadLedger {
        &self.ledger
    }

    /// Attempt threads from `source` until `target` videos exist or attempts run out.
    pub fn run(&mut self, source: &mut dyn ThreadSource, target: usize) -> LoopSummary {
        let mut summary = LoopSummary::default();
        let max_attempts = self.config.output.max_attempts;
        while summary.produced.len() < target && summary.attempts < max_attempts {
            summary.attempts += 1;
            info!(
                attempt = summary.attempts,
                produced = summary.produced.len(),
                target,
                "Starting attempt"
            );

            if let Err(e) = self.ledger.reload() {
                warn!("Could not reload ledger: {:#}", e);
            }
            let outcome = match source.next_thread(&mut self.ledger) {
                Ok(thread) => self.produce(thread, None),
                Err(e) => RunOutcome::from_error(&e),
            };
            log_outcome(&outcome);
            summary.record(&outcome);
        }
        summary
    }

    /// Turn one thread into a video. `output` overrides the generated file name.
    pub fn produce(&mut self, thread: ThreadContent, output: Option<PathBuf>) -> RunOutcome {
        let source_title = thread.title.trim().to_string();

        let thread = match ThreadParser::apply_policy(thread, &self.config.content) {
            Ok(thread) => thread,
            Err(e) => return self.abandon(&source_title, e),
        };

        let rewritten = match self.rewriter {
            Some(rewriter) => rewrite_or_passthrough(rewriter, thread),
            None => RewrittenThread::passthrough(thread),
        };
        // Comments are filtered once, before the rewrite. A longer rewritten comment stays.
        let content = &rewritten.content;

        let output = output.unwrap_or_else(|| {
            unique_output_path(&self.config.output.dir, rewritten.filename.as_deref())
        });

        match self.assembler.assemble(content, &output, &mut self.picker) {
            Ok(report) => {
                info!(
                    output = %report.output.display(),
                    duration = report.duration,
                    segments = report.segments,
                    captions = report.captions,
                    "Video produced"
                );
                if let Err(e) = write_tags_sidecar(&output, &content.title, &rewritten.tags) {
                    warn!("Could not write tags file: {}", e);
                }
                self.mark_used(&source_title);
                RunOutcome::Produced(output)
            }
            Err(e) => self.abandon(&source_title, e),
        }
    }

    fn abandon(&mut self, title: &str, err: PipelineError) -> RunOutcome {
        if err.marks_thread_used() {
            self.mark_used(title);
        }
        RunOutcome::from_error(&err)
    }

    fn mark_used(&mut self, title: &str) {
        if let Err(e) = self.ledger.record(title) {
            warn!(title, "Could not record thread in ledger: {}", e);
        }
    }
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Produced(_) => info!("{}", outcome),
        RunOutcome::Skipped(_) => warn!("{}", outcome),
        RunOutcome::Failed(_) => error!("{}", outcome),
    }
}

/// `<dir>/<stem>.mp4`, with `_1`, `_2`, ... appended until the name is free.
pub fn unique_output_path(dir: &Path, suggested: Option<&str>) -> PathBuf {
    let stem = suggested
        .and_then(|s| text::sanitize_filename(s, MAX_STEM_CHARS))
        .unwrap_or_else(|| DEFAULT_STEM.to_string());

    let mut candidate = dir.join(format!("{}.mp4", stem));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.mp4", stem, n));
        n += 1;
    }
    candidate
}

/// Write `<stem>_tags.txt` next to the video.
pub fn write_tags_sidecar(video: &Path, title: &str, tags: &[String]) -> io::Result<PathBuf> {
    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_STEM);
    let path = video.with_file_name(format!("{}_tags.txt", stem));

    let tags: Vec<String> = tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#'))
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect();
    std::fs::write(&path, format!("Title: {}\nTags: {}\n", title, tags.join(", ")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_collisions() {
        let dir = TempDir::new().unwrap();
        let first = unique_output_path(dir.path(), Some("Best_Day Ever!"));
        assert_eq!(first.file_name().unwrap(), "Best_DayEver.mp4");

        std::fs::write(&first, b"").unwrap();
        let second = unique_output_path(dir.path(), Some("Best_Day Ever!"));
        assert_eq!(second.file_name().unwrap(), "Best_DayEver_1.mp4");
    }

    #[test]
    fn test_output_path_default_stem() {
        let dir = TempDir::new().unwrap();
        let path = unique_output_path(dir.path(), Some("!!!"));
        assert_eq!(path.file_name().unwrap(), "thread_video.mp4");
        let path = unique_output_path(dir.path(), None);
        assert_eq!(path.file_name().unwrap(), "thread_video.mp4");
    }

    #[test]
    fn test_tags_sidecar() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        let tags = vec!["#funny".to_string(), " reddit ".to_string(), "".to_string()];

        let path = write_tags_sidecar(&video, "Hello there", &tags).unwrap();
        assert_eq!(path.file_name().unwrap(), "clip_tags.txt");
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "Title: Hello there\nTags: #funny, #reddit\n"
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = LoopSummary::default();
        summary.record(&RunOutcome::Produced(PathBuf::from("a.mp4")));
        summary.record(&RunOutcome::Skipped("x".into()));
        summary.record(&RunOutcome::Failed("y".into()));
        summary.record(&RunOutcome::Skipped("z".into()));
        assert_eq!(summary.produced.len(), 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 1);
    }
}
