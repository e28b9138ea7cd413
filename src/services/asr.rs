use super::{api_key, http_client, WordTimer};
use crate::config::ServicesConfig;
use crate::narration::WordTiming;
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{multipart, Client};
use std::path::Path;

/// OpenAI-compatible transcription with word-level timestamps.
pub struct WhisperTimer {
    client: Client,
    base_url: String,
    model: String,
    api_key_env: String,
}

impl WhisperTimer {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.openai_base_url.clone(),
            model: config.transcribe_model.clone(),
            api_key_env: config.openai_api_key_env.clone(),
        })
    }
}

impl WordTimer for WhisperTimer {
    fn word_timings(&self, audio: &Path) -> Result<Vec<WordTiming>> {
        let key = api_key(&self.api_key_env, "word timing")?;
        let bytes = std::fs::read(audio)
            .with_context(|| format!("failed to read narration audio: {}", audio.display()))?;
        let file_name = audio
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("audio.wav");

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")
            .context("failed to build multipart part")?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        let url = format!("{}/v1/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .context("transcription request failed")?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(anyhow!("transcription failed: {}: {}", status, text));
        }

        let raw = res.text().context("failed to read transcription body")?;
        parse_verbose_json_words(&raw)
    }
}

/// Pull the `words` array out of a `verbose_json` transcription.
pub fn parse_verbose_json_words(raw: &str) -> Result<Vec<WordTiming>> {
    let v: serde_json::Value = serde_json::from_str(raw).context("invalid verbose_json")?;
    let words = v
        .get("words")
        .and_then(|w| w.as_array())
        .ok_or_else(|| anyhow!("verbose_json missing 'words' array"))?;

    let mut out = Vec::with_capacity(words.len());
    for word in words {
        let start = word.get("start").and_then(|x| x.as_f64()).unwrap_or(0.0);
        let end = word.get("end").and_then(|x| x.as_f64()).unwrap_or(start);
        let token = word
            .get("word")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        out.push(WordTiming { token, start, end });
    }
    Ok(out)
}
