use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no unused thread available")]
    SourceUnavailable,
    #[error("content too long: {0}")]
    ContentTooLong(String),
    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("segment is empty after silence trim")]
    EmptySegment,
    #[error("word timing unavailable: {0}")]
    TimingUnavailable(String),
    #[error("rewrite response unparseable: {0}")]
    RewriteUnparseable(String),
    #[error("no narration could be produced")]
    NoNarration,
    #[error("narration too short: {actual:.2}s is below the {minimum:.2}s minimum")]
    BelowMinimumDuration { actual: f64, minimum: f64 },
    #[error("asset missing: {}", .0.display())]
    AssetMissing(PathBuf),
    #[error("render failed: {0}")]
    RenderFailure(String),
    #[error("audio error: {0}")]
    Audio(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// How the run reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Lose one segment, keep going.
    DropSegment,
    /// Keep the segment in a reduced form.
    Degrade,
    /// Abandon the run without producing output.
    SkipRun,
    /// Abandon the run and report a failure.
    FailRun,
}

impl PipelineError {
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::SynthesisFailed(_) | PipelineError::EmptySegment => {
                Disposition::DropSegment
            }
            PipelineError::TimingUnavailable(_) | PipelineError::RewriteUnparseable(_) => {
                Disposition::Degrade
            }
            PipelineError::SourceUnavailable
            | PipelineError::ContentTooLong(_)
            | PipelineError::NoNarration
            | PipelineError::BelowMinimumDuration { .. }
            | PipelineError::AssetMissing(_) => Disposition::SkipRun,
            PipelineError::RenderFailure(_) | PipelineError::Audio(_) | PipelineError::Io(_) => {
                Disposition::FailRun
            }
        }
    }

    /// Whether the thread should go into the ledger so it is not picked again.
    ///
    /// Only outcomes caused by the thread's own text qualify; missing assets or
    /// encoder trouble leave the thread eligible for a later attempt.
    pub fn marks_thread_used(&self) -> bool {
        matches!(
            self,
            PipelineError::ContentTooLong(_)
                | PipelineError::NoNarration
                | PipelineError::BelowMinimumDuration { .. }
        )
    }
}

/// Final state of one generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Produced(PathBuf),
    Skipped(String),
    Failed(String),
}

impl RunOutcome {
    pub fn from_error(err: &PipelineError) -> Self {
        match err.disposition() {
            Disposition::FailRun => RunOutcome::Failed(err.to_string()),
            _ => RunOutcome::Skipped(err.to_string()),
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, RunOutcome::Produced(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Produced(path) => write!(f, "video produced: {}", path.display()),
            RunOutcome::Skipped(reason) => write!(f, "run skipped: {}", reason),
            RunOutcome::Failed(reason) => write!(f, "run failed: {}", reason),
        }
    }
}
