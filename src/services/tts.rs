use super::{api_key, http_client, SpeechSynthesizer, VoiceParams};
use crate::config::ServicesConfig;
use anyhow::{anyhow, Context, Result};
use base64::Engine;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

/// Google Cloud Text-to-Speech over REST, returning LINEAR16 WAV bytes.
pub struct GoogleTts {
    client: Client,
    endpoint: String,
    api_key_env: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleTts {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            endpoint: config.tts_endpoint.clone(),
            api_key_env: config.tts_api_key_env.clone(),
        })
    }

    fn request_body(text: &str, voice: &VoiceParams) -> serde_json::Value {
        json!({
            "input": { "text": text },
            "voice": {
                "languageCode": voice.language,
                "name": voice.name,
            },
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "speakingRate": voice.speaking_rate,
            },
        })
    }
}

/// Decode the base64 `audioContent` field of a synthesize reply.
pub fn decode_audio_content(raw: &str) -> Result<Vec<u8>> {
    let response: SynthesizeResponse =
        serde_json::from_str(raw).context("invalid text:synthesize response")?;
    base64::engine::general_purpose::STANDARD
        .decode(response.audio_content.trim())
        .context("audioContent is not valid base64")
}

impl SpeechSynthesizer for GoogleTts {
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Vec<u8>> {
        let key = api_key(&self.api_key_env, "Google text-to-speech")?;

        let res = self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&Self::request_body(text, voice))
            .send()
            .context("Google TTS request failed")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(anyhow!("Google TTS failed: {}: {}", status, body));
        }

        let raw = res.text().context("failed to read Google TTS body")?;
        let bytes = decode_audio_content(&raw)?;
        if bytes.is_empty() {
            return Err(anyhow!("Google TTS returned no audio"));
        }
        Ok(bytes)
    }
}
