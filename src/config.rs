use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Every tunable of the pipeline. Built once and handed to the assembler.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub budget: BudgetConfig,
    pub captions: CaptionConfig,
    pub assets: AssetsConfig,
    pub content: ContentConfig,
    pub services: ServicesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 24,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub title_speed: f64,
    pub comment_speed: f64,
    pub transition_speed: f64,
    pub transition_volume: f32,
    pub music_volume: f32,
    /// dBFS below which a window counts as silence.
    pub silence_threshold_db: f64,
    pub min_silence_ms: u32,
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            title_speed: 1.10,
            comment_speed: 1.10,
            transition_speed: 1.0,
            transition_volume: 0.6,
            music_volume: 0.1,
            silence_threshold_db: -40.0,
            min_silence_ms: 250,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub min_duration: f64,
    pub max_duration: f64,
    /// Added after the last caption when captions overrun the narration.
    pub caption_pad: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            min_duration: 30.0,
            max_duration: 120.0,
            caption_pad: 0.1,
        }
    }
}

/// What to do when the recognizer's word count differs from the source tokens.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Pair timings with source tokens by index and drop the unmatched tail.
    #[default]
    SourceTokens,
    /// Ignore the source tokens and show the recognizer's own words.
    RecognizedWords,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CaptionConfig {
    pub base_delay: f64,
    pub long_text_delay: f64,
    pub long_text_words: usize,
    pub palette: Vec<String>,
    pub speaker_color: String,
    pub title_color: String,
    pub title_accent_color: String,
    pub highlight_color: String,
    pub highlight_background: String,
    /// Index of the body token to highlight, if any.
    pub highlight_word: Option<usize>,
    pub mismatch_policy: MismatchPolicy,
    pub font: String,
    pub font_size: u32,
    pub long_word_font_size: u32,
    pub long_word_chars: usize,
    pub title_font_size: u32,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            base_delay: 0.01,
            long_text_delay: 0.10,
            long_text_words: 25,
            palette: [
                "#FF4500", "#00BFFF", "#FFD700", "#32CD32", "#FF69B4", "#FFFFFF", "#00FFFF",
                "#FFA500",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            speaker_color: "#00BFFF".to_string(),
            title_color: "#FFFFFF".to_string(),
            title_accent_color: "#FF4500".to_string(),
            highlight_color: "#FF4567".to_string(),
            highlight_background: "#000000".to_string(),
            highlight_word: None,
            mismatch_policy: MismatchPolicy::default(),
            font: "Noto Sans".to_string(),
            font_size: 120,
            long_word_font_size: 80,
            long_word_chars: 10,
            title_font_size: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    pub base_path: PathBuf,
    pub backgrounds: Vec<PathBuf>,
    pub secondary: Vec<PathBuf>,
    pub overlay: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub transition: Option<PathBuf>,
    pub chroma_key: String,
    pub chroma_similarity: f32,
    pub chroma_blend: f32,
    pub overlay_width: u32,
    /// Fixed seed for asset selection; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            backgrounds: vec![
                PathBuf::from("backgrounds/parkour.mp4"),
                PathBuf::from("backgrounds/parkour1.mp4"),
            ],
            secondary: vec![
                PathBuf::from("secondary/add1.mp4"),
                PathBuf::from("secondary/add2.mp4"),
                PathBuf::from("secondary/add3.mp4"),
                PathBuf::from("secondary/add4.mp4"),
            ],
            overlay: Some(PathBuf::from("overlay/follow.mp4")),
            music: Some(PathBuf::from("music/background.mp3")),
            transition: Some(PathBuf::from("sfx/transition.mp3")),
            chroma_key: "#00FF00".to_string(),
            chroma_similarity: 0.3,
            chroma_blend: 0.1,
            overlay_width: 1300,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ContentConfig {
    pub max_title_chars: usize,
    pub max_comment_chars: usize,
    pub comment_count: usize,
    pub comment_pool: usize,
    pub post_limit: usize,
    pub communities: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_title_chars: 200,
            max_comment_chars: 250,
            comment_count: 7,
            comment_pool: 25,
            post_limit: 20,
            communities: [
                "showerthoughts",
                "AskReddit",
                "AskMen",
                "AskWomen",
                "RelationshipAdvice",
                "confession",
                "relationships",
                "teenagers",
                "NoStupidQuestions",
                "TrueOffMyChest",
                "UnpopularOpinion",
                "TooAfraidToAsk",
                "WouldYouRather",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServicesConfig {
    pub tts_endpoint: String,
    pub tts_api_key_env: String,
    pub voice_language: String,
    pub voice_name: String,
    pub speaking_rate: f64,
    pub openai_base_url: String,
    pub openai_api_key_env: String,
    pub rewrite_model: String,
    pub transcribe_model: String,
    pub reddit_base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            tts_endpoint: "https://texttospeech.googleapis.com/v1/text:synthesize".to_string(),
            tts_api_key_env: "GOOGLE_TTS_API_KEY".to_string(),
            voice_language: "en-US".to_string(),
            voice_name: "en-US-Wavenet-D".to_string(),
            speaking_rate: 1.08,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_api_key_env: "OPENAI_API_KEY".to_string(),
            rewrite_model: "gpt-4.1".to_string(),
            transcribe_model: "whisper-1".to_string(),
            reddit_base_url: "https://www.reddit.com".to_string(),
            user_agent: "threadreel/0.1".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub temp_dir: PathBuf,
    pub ledger: PathBuf,
    pub target_videos: usize,
    pub max_attempts: usize,
    pub cleanup_retries: u32,
    pub cleanup_backoff_ms: u64,
    /// Narration worker threads; 0 means one per CPU.
    pub workers: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            temp_dir: PathBuf::from("tmp"),
            ledger: PathBuf::from("used_threads.txt"),
            target_videos: 30,
            max_attempts: 100,
            cleanup_retries: 5,
            cleanup_backoff_ms: 500,
            workers: 0,
        }
    }
}

impl OutputConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

impl AppConfig {
    /// Defaults, then `threadreel.toml` if present, then `THREADREEL_*` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Same as [`AppConfig::load`] but reads an explicit file instead of `threadreel.toml`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("threadreel").required(false)),
        };

        // Allow env var overrides (e.g. THREADREEL_BUDGET__MAX_DURATION=90)
        builder = builder.add_source(
            config::Environment::with_prefix("THREADREEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
