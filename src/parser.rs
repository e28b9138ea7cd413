use crate::config::ContentConfig;
use crate::error::PipelineError;
use crate::thread::ThreadContent;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Loads thread files and applies the content length policy
pub struct ThreadParser;

impl ThreadParser {
    /// Parse a JSON thread file
    pub fn parse_json(path: &Path) -> Result<ThreadContent> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read thread file: {}", path.display()))?;

        let thread: ThreadContent = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON thread: {}", path.display()))?;

        Self::validate_thread(&thread)?;

        Ok(thread)
    }

    /// Validate the thread structure
    fn validate_thread(thread: &ThreadContent) -> Result<()> {
        if thread.title.trim().is_empty() {
            anyhow::bail!("Thread title cannot be empty");
        }

        let narrated = thread
            .narration_comments()
            .iter()
            .filter(|c| !c.body.is_empty())
            .count();
        if narrated == 0 {
            anyhow::bail!("Thread must contain a body or at least one comment");
        }

        Ok(())
    }

    /// Reject over-long titles and drop over-long comments.
    pub fn apply_policy(
        mut thread: ThreadContent,
        policy: &ContentConfig,
    ) -> Result<ThreadContent, PipelineError> {
        let title_len = thread.title.chars().count();
        if title_len > policy.max_title_chars {
            return Err(PipelineError::ContentTooLong(format!(
                "title has {} characters (limit {})",
                title_len, policy.max_title_chars
            )));
        }

        let before = thread.comments.len();
        thread
            .comments
            .retain(|c| !c.body.is_empty() && c.body.chars().count() < policy.max_comment_chars);
        let dropped = before - thread.comments.len();
        if dropped > 0 {
            warn!(dropped, "Dropped comments over the length limit");
        }

        Ok(thread)
    }

    /// Get a summary of the thread structure
    pub fn summarize(thread: &ThreadContent) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Title: {}\n", thread.display_title()));
        if let Some(body) = &thread.body {
            summary.push_str(&format!("Body: {} chars\n", body.chars().count()));
        }
        summary.push_str(&format!("Comments: {}\n", thread.comments.len()));

        for (idx, comment) in thread.comments.iter().enumerate() {
            let preview: String = comment.body.chars().take(60).collect();
            summary.push_str(&format!(
                "  Comment {}: [{}] {}\n",
                idx + 1,
                comment.speaker.as_deref().unwrap_or("-"),
                preview
            ));
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Comment;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn thread_with(title: &str, comments: Vec<Comment>) -> ThreadContent {
        ThreadContent {
            title: title.into(),
            body: None,
            community: None,
            comments,
        }
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"
        {
            "title": "Test Title",
            "community": "AskReddit",
            "comments": ["a: first", "b: second"]
        }
        "#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let thread = ThreadParser::parse_json(file.path()).unwrap();
        assert_eq!(thread.comments.len(), 2);
    }

    #[test]
    fn test_parse_invalid_json() {
        let json = r#"{ "title": "", "comments": [] }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let result = ThreadParser::parse_json(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = ThreadParser::parse_json(Path::new("/nonexistent/thread.json"));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read thread file"));
    }

    #[test]
    fn test_validate_requires_narration() {
        let thread = thread_with("Title only", vec![]);
        let result = ThreadParser::validate_thread(&thread);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one comment"));
    }

    #[test]
    fn test_policy_rejects_long_title() {
        let policy = ContentConfig::default();
        let thread = thread_with(&"x".repeat(201), vec![Comment::parse("a: b")]);
        let result = ThreadParser::apply_policy(thread, &policy);
        assert!(matches!(result, Err(PipelineError::ContentTooLong(_))));
    }

    #[test]
    fn test_policy_drops_long_comments() {
        let policy = ContentConfig::default();
        let thread = thread_with(
            "ok",
            vec![
                Comment::parse("a: short"),
                Comment::new(Some("b"), &"y".repeat(250)),
                Comment::new(Some("c"), ""),
            ],
        );
        let thread = ThreadParser::apply_policy(thread, &policy).unwrap();
        assert_eq!(thread.comments.len(), 1);
        assert_eq!(thread.comments[0].body, "short");
    }

    #[test]
    fn test_summarize() {
        let thread = thread_with("My Thread", vec![Comment::parse("alice: hello there")]);
        let summary = ThreadParser::summarize(&thread);
        assert!(summary.contains("My Thread"));
        assert!(summary.contains("[alice] hello there"));
    }
}
