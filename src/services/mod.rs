//! External collaborators: speech synthesis, word timing, rewriting and the thread source.

pub mod asr;
pub mod reddit;
pub mod rewrite;
pub mod tts;

use crate::config::ServicesConfig;
use crate::error::PipelineResult;
use crate::ledger::UsedThreadLedger;
use crate::narration::WordTiming;
use crate::thread::{RewrittenThread, ThreadContent};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use std::path::Path;
use std::time::Duration;

pub use asr::WhisperTimer;
pub use reddit::RedditSource;
pub use rewrite::OpenAiRewriter;
pub use tts::GoogleTts;

/// Voice settings passed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub language: String,
    pub name: String,
    pub speaking_rate: f64,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self::from_config(&ServicesConfig::default())
    }
}

impl VoiceParams {
    pub fn from_config(config: &ServicesConfig) -> Self {
        Self {
            language: config.voice_language.clone(),
            name: config.voice_name.clone(),
            speaking_rate: config.speaking_rate,
        }
    }
}

/// Text to raw audio bytes.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>>;
}

/// Audio file to per-word timings.
pub trait WordTimer: Send + Sync {
    fn word_timings(&self, audio: &Path) -> Result<Vec<WordTiming>>;
}

/// Rewrites a thread for a short-form audience.
pub trait ContentRewriter {
    fn rewrite(&self, thread: &ThreadContent) -> Result<RewrittenThread>;
}

/// Supplies threads whose titles are not in the ledger yet.
pub trait ThreadSource {
    fn next_thread(&mut self, ledger: &mut UsedThreadLedger) -> PipelineResult<ThreadContent>;
}

pub(crate) fn http_client(config: &ServicesConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn api_key(env_name: &str, purpose: &str) -> Result<String> {
    std::env::var(env_name).map_err(|_| anyhow!("{} is not set (needed for {})", env_name, purpose))
}
