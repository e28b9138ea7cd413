use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A discussion thread as it enters the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadContent {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Community the thread was taken from, used in the display title.
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// One comment: optional speaker label plus the text that gets narrated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comment {
    pub speaker: Option<String>,
    pub body: String,
}

impl Comment {
    pub fn new(speaker: Option<&str>, body: &str) -> Self {
        Self {
            speaker: speaker
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            body: body.trim().to_string(),
        }
    }

    /// Parse `"speaker: body"`; text without a colon has no speaker.
    pub fn parse(line: &str) -> Self {
        let (speaker, body) = text::split_speaker(line);
        Self::new(speaker, body)
    }

    /// The line shown in captions, speaker label included.
    pub fn display_line(&self) -> String {
        match &self.speaker {
            Some(speaker) => format!("{}: {}", speaker, self.body),
            None => self.body.clone(),
        }
    }
}

/// Thread files may list comments as `"speaker: body"` strings or as objects.
impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Line(String),
            Record {
                #[serde(default)]
                speaker: Option<String>,
                body: String,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Line(line) => Comment::parse(&line),
            Raw::Record { speaker, body } => Comment::new(speaker.as_deref(), &body),
        })
    }
}

impl ThreadContent {
    /// Title as shown on screen: `[r/community] title`.
    pub fn display_title(&self) -> String {
        match &self.community {
            Some(community) if !community.is_empty() => {
                format!("[r/{}] {}", community, self.title.trim())
            }
            _ => self.title.trim().to_string(),
        }
    }

    /// Comments in narration order; a non-empty body leads as the `OP` comment.
    pub fn narration_comments(&self) -> Vec<Comment> {
        let mut lines = Vec::with_capacity(self.comments.len() + 1);
        if let Some(body) = self.body.as_deref().map(str::trim) {
            if !body.is_empty() {
                lines.push(Comment::new(Some("OP"), body));
            }
        }
        lines.extend(self.comments.iter().cloned());
        lines
    }
}

/// Comment shapes returned by the rewrite collaborator.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RewriteComment {
    LabeledMessage { username: String, message: String },
    PlainText(String),
    SingleKeyMap(BTreeMap<String, serde_json::Value>),
}

impl RewriteComment {
    /// Canonical `{speaker?, body}` form.
    pub fn normalize(&self) -> Comment {
        match self {
            RewriteComment::LabeledMessage { username, message } => {
                Comment::new(Some(username.as_str()), message)
            }
            RewriteComment::PlainText(line) => Comment::parse(line),
            RewriteComment::SingleKeyMap(map) => {
                let joined = map
                    .values()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                Comment::parse(&joined)
            }
        }
    }
}

/// Structured reply of the rewrite collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteResponse {
    pub title: String,
    #[serde(default)]
    pub op_message: Option<String>,
    #[serde(default)]
    pub comments: Vec<RewriteComment>,
    #[serde(default, alias = "tiktok_filename")]
    pub filename: Option<String>,
    #[serde(default, alias = "tiktok_tags")]
    pub tags: Vec<String>,
}

/// Thread content after the rewrite step, plus publishing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenThread {
    pub content: ThreadContent,
    pub filename: Option<String>,
    pub tags: Vec<String>,
}

impl RewrittenThread {
    /// The untransformed content, used when the rewrite cannot be trusted.
    pub fn passthrough(content: ThreadContent) -> Self {
        Self {
            content,
            filename: None,
            tags: Vec::new(),
        }
    }

    /// Apply a rewrite reply on top of the original; the community is kept.
    pub fn from_response(original: &ThreadContent, response: RewriteResponse) -> Self {
        Self {
            content: ThreadContent {
                title: response.title.trim().to_string(),
                body: response.op_message.filter(|m| !m.trim().is_empty()),
                community: original.community.clone(),
                comments: response
                    .comments
                    .iter()
                    .map(RewriteComment::normalize)
                    .filter(|c| !c.body.is_empty())
                    .collect(),
            },
            filename: response.filename,
            tags: response.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_deserialization_mixed_comments() {
        let json = r#"
        {
            "title": "What is a small joy?",
            "body": "Asking for a friend",
            "community": "AskReddit",
            "comments": [
                "alice: Fresh socks",
                {"speaker": "bob", "body": "Cold pillow side"},
                {"body": "Rain on the window"},
                "No label here"
            ]
        }
        "#;

        let thread: ThreadContent = serde_json::from_str(json).unwrap();
        assert_eq!(thread.comments.len(), 4);
        assert_eq!(thread.comments[0].speaker.as_deref(), Some("alice"));
        assert_eq!(thread.comments[0].body, "Fresh socks");
        assert_eq!(thread.comments[1].speaker.as_deref(), Some("bob"));
        assert_eq!(thread.comments[2].speaker, None);
        assert_eq!(thread.comments[3].body, "No label here");
    }

    #[test]
    fn test_display_title() {
        let thread = ThreadContent {
            title: " Test Title ".into(),
            body: None,
            community: Some("AskReddit".into()),
            comments: vec![],
        };
        assert_eq!(thread.display_title(), "[r/AskReddit] Test Title");

        let bare = ThreadContent {
            community: None,
            ..thread
        };
        assert_eq!(bare.display_title(), "Test Title");
    }

    #[test]
    fn test_narration_comments_prepends_op() {
        let thread = ThreadContent {
            title: "t".into(),
            body: Some("  the story  ".into()),
            community: None,
            comments: vec![Comment::parse("x: y")],
        };
        let lines = thread.narration_comments();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].display_line(), "OP: the story");
        assert_eq!(lines[1].display_line(), "x: y");

        let no_body = ThreadContent {
            body: Some("   ".into()),
            ..thread
        };
        assert_eq!(no_body.narration_comments().len(), 1);
    }

    #[test]
    fn test_rewrite_comment_shapes() {
        let json = r#"[
            "plain comment",
            "carol: labeled inline",
            {"username": "dave", "message": "labeled object"},
            {"3": "erin: keyed entry"},
            {"a": "joined", "b": "values"}
        ]"#;
        let comments: Vec<RewriteComment> = serde_json::from_str(json).unwrap();
        let normalized: Vec<Comment> = comments.iter().map(RewriteComment::normalize).collect();

        assert_eq!(normalized[0], Comment::new(None, "plain comment"));
        assert_eq!(normalized[1], Comment::new(Some("carol"), "labeled inline"));
        assert_eq!(normalized[2], Comment::new(Some("dave"), "labeled object"));
        assert_eq!(normalized[3], Comment::new(Some("erin"), "keyed entry"));
        assert_eq!(normalized[4], Comment::new(None, "joined values"));
    }

    #[test]
    fn test_rewrite_response_aliases() {
        let json = r#"{
            "title": "Hook title",
            "op_message": "",
            "comments": ["one", "two"],
            "tiktok_filename": "hook_title",
            "tiktok_tags": ["a", "b"]
        }"#;
        let response: RewriteResponse = serde_json::from_str(json).unwrap();
        let original = ThreadContent {
            title: "orig".into(),
            body: Some("orig body".into()),
            community: Some("teenagers".into()),
            comments: vec![],
        };
        let rewritten = RewrittenThread::from_response(&original, response);
        assert_eq!(rewritten.content.title, "Hook title");
        assert_eq!(rewritten.content.body, None);
        assert_eq!(rewritten.content.community.as_deref(), Some("teenagers"));
        assert_eq!(rewritten.content.comments.len(), 2);
        assert_eq!(rewritten.filename.as_deref(), Some("hook_title"));
        assert_eq!(rewritten.tags, vec!["a", "b"]);
    }
}
