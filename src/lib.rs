pub mod assets;
pub mod audio;
pub mod budget;
pub mod captions;
pub mod config;
pub mod error;
pub mod ledger;
pub mod narration;
pub mod parser;
pub mod pipeline;
pub mod renderer;
pub mod runner;
pub mod services;
pub mod text;
pub mod thread;

pub use assets::{AssetLoader, AssetPicker, FfprobeProbe, MediaProbe};
pub use audio::{AudioClip, AudioDecoder, AudioMixer};
pub use budget::{Allocation, BudgetAllocator, BudgetPolicy, TimelineSlot};
pub use captions::{CaptionUnit, SubtitleAligner};
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult, RunOutcome};
pub use ledger::UsedThreadLedger;
pub use narration::{NarrationBuilder, NarrationSegment, WordTiming};
pub use parser::ThreadParser;
pub use pipeline::{AssemblyReport, Collaborators, RenderWorkspace, TimelineAssembler};
pub use renderer::{CompositionPlan, Compositor, FfmpegRenderer, Renderer, TimelineDuration};
pub use runner::GenerationLoop;
pub use thread::ThreadContent;
