use super::{api_key, http_client, ContentRewriter};
use crate::config::ServicesConfig;
use crate::error::PipelineError;
use crate::thread::{RewriteResponse, RewrittenThread, ThreadContent};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use serde_json::json;
use std::sync::OnceLock;

const SYSTEM_PROMPT: &str = "You're a creative, funny Reddit script writer for video content, \
who knows how to keep short-form viewers hooked.";

/// Chat-completion rewriter for an OpenAI-compatible endpoint.
pub struct OpenAiRewriter {
    client: Client,
    base_url: String,
    model: String,
    api_key_env: String,
}

impl OpenAiRewriter {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.openai_base_url.clone(),
            model: config.rewrite_model.clone(),
            api_key_env: config.openai_api_key_env.clone(),
        })
    }
}

/// The user prompt for one thread.
pub fn build_prompt(thread: &ThreadContent) -> String {
    let mut prompt = String::from(
        "Rewrite the following Reddit post (title, OP message, and comments) for a short vertical video.\n\
         1. The TITLE should be rewritten as a strong hook that grabs attention, while keeping the OP's tone and staying relevant to the original title and message.\n\
         2. Remove all emotes from the entire output, as text-to-speech cannot read them.\n\
         3. Do NOT mention the video platform unless the original title or message does.\n\
         4. Maintain the original context and meaning, but feel free to use humor, slang, or informal language typical for Reddit (but don't overdo it).\n\
         5. End with an additional comment containing a question or encouragement for viewers to comment their opinion on the topic.\n\
         6. Make sure the rewritten content flows naturally and feels like something a real Redditor would say. Do not include usernames of reddit users.\n\
         7. Suggest a short, catchy, filesystem-safe filename for the video (no special characters, max 60 chars, use underscores or dashes, no spaces).\n\
         8. Suggest a list of 5 ideal tags (as a list of strings, no # needed).\n\
         Return your response ONLY as a JSON with the following fields: 'title', 'op_message', 'comments' (list), 'tiktok_filename', 'tiktok_tags' (list):\n\n",
    );
    prompt.push_str(&format!("Title: {}\n", thread.title));
    prompt.push_str(&format!("OP: {}\n", thread.body.as_deref().unwrap_or("")));
    prompt.push_str("Comments:\n");
    for (i, comment) in thread.comments.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, comment.display_line()));
    }
    prompt
}

fn json_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern is valid"))
}

/// Extract and parse the JSON object embedded in a model reply.
pub fn parse_rewrite_response(content: &str) -> Result<RewriteResponse, PipelineError> {
    let object = json_object_pattern()
        .find(content)
        .ok_or_else(|| PipelineError::RewriteUnparseable("no JSON object in reply".into()))?;
    serde_json::from_str(object.as_str())
        .map_err(|e| PipelineError::RewriteUnparseable(e.to_string()))
}

impl ContentRewriter for OpenAiRewriter {
    fn rewrite(&self, thread: &ThreadContent) -> Result<RewrittenThread> {
        let key = api_key(&self.api_key_env, "content rewriting")?;
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(thread) },
            ],
            "temperature": 0.7,
            "max_tokens": 2048,
            "top_p": 1,
        });

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .context("rewrite request failed")?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(anyhow!("rewrite failed: {}: {}", status, text));
        }

        let raw: serde_json::Value = res.json().context("failed to parse rewrite response JSON")?;
        let content = raw["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("rewrite response has no message content"))?;

        let response = parse_rewrite_response(content)?;
        Ok(RewrittenThread::from_response(thread, response))
    }
}

/// Rewrite, or keep the original content when the rewrite fails for any reason.
pub fn rewrite_or_passthrough(
    rewriter: &dyn ContentRewriter,
    thread: ThreadContent,
) -> RewrittenThread {
    match rewriter.rewrite(&thread) {
        Ok(rewritten) if !rewritten.content.title.is_empty() => rewritten,
        Ok(_) => {
            tracing::warn!("Rewrite returned an empty title, keeping the original text");
            RewrittenThread::passthrough(thread)
        }
        Err(e) => {
            tracing::warn!("Rewrite unavailable ({:#}), keeping the original text", e);
            RewrittenThread::passthrough(thread)
        }
    }
}
