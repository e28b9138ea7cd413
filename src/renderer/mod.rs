pub mod compositor;
pub mod encoder;
pub mod subtitles;
pub mod timeline;

pub use compositor::Compositor;
pub use encoder::{FfmpegRenderer, Renderer};
pub use subtitles::SubtitleDocument;
pub use timeline::{CompositionPlan, LoopPlan, TimelineDuration};
