use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Clean text for narration and captions.
///
/// Typographic quotes, dashes and ellipses become ASCII, non-whitespace control
/// and format characters are dropped, and whitespace runs collapse to one space.
pub fn sanitize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{201C}' | '\u{201D}' => cleaned.push('"'),
            '\u{2018}' | '\u{2019}' => cleaned.push('\''),
            '\u{2013}' | '\u{2014}' => cleaned.push('-'),
            '\u{2026}' => cleaned.push_str("..."),
            c if c.is_whitespace() => cleaned.push(' '),
            c if c.is_control() || is_format_char(c) => {}
            c => cleaned.push(c),
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

fn disallowed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(https?://|www\.|\.jpg|\.jpeg|\.png|\.gif|\.bmp|\.mp4|\.avi|\.mov|\.webm|\.pdf|\.doc|\.xls|\.ppt|\.zip|\.rar|\.7z|\.tar|\.gz|imgur\.com|i\.redd\.it|pic\.twitter\.com)",
        )
        .expect("static pattern is valid")
    })
}

/// Text that cannot be narrated sensibly: links and file references.
pub fn is_disallowed(text: &str) -> bool {
    disallowed_pattern().is_match(text)
}

/// Titles that are most likely image or link posts.
pub fn looks_like_media_post(title: &str) -> bool {
    const KEYWORDS: [&str; 9] = [
        ".jpg",
        ".jpeg",
        ".png",
        ".gif",
        "imgur.com",
        "i.redd.it",
        "http",
        "https",
        "pic.twitter.com",
    ];
    let lower = title.to_lowercase();
    KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Split `"speaker: body"` at the first colon.
pub fn split_speaker(text: &str) -> (Option<&str>, &str) {
    match text.split_once(':') {
        Some((speaker, body)) => (Some(speaker.trim()), body.trim()),
        None => (None, text.trim()),
    }
}

/// The caption token stream of one narrated line: speaker words, a colon, then body words.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTokens {
    tokens: Vec<String>,
    speaker_len: usize,
}

impl CaptionTokens {
    pub fn from_text(text: &str) -> Self {
        match split_speaker(text) {
            (Some(speaker), body) => {
                let mut tokens: Vec<String> =
                    speaker.split_whitespace().map(str::to_string).collect();
                tokens.push(":".to_string());
                let speaker_len = tokens.len();
                tokens.extend(body.split_whitespace().map(str::to_string));
                Self {
                    tokens,
                    speaker_len,
                }
            }
            (None, body) => Self {
                tokens: body.split_whitespace().map(str::to_string).collect(),
                speaker_len: 0,
            },
        }
    }

    /// Speaker words plus the colon.
    pub fn speaker(&self) -> &[String] {
        &self.tokens[..self.speaker_len]
    }

    /// Spoken words.
    pub fn body(&self) -> &[String] {
        &self.tokens[self.speaker_len..]
    }
}

/// Display width of a token in user-perceived characters.
pub fn grapheme_len(token: &str) -> usize {
    token.graphemes(true).count()
}

/// Reduce a suggested name to `[A-Za-z0-9_-]`, at most `max_len` characters.
pub fn sanitize_filename(name: &str, max_len: usize) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(max_len)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Split `"[r/community] rest"` into its bracketed prefix and the remainder.
pub fn split_title_prefix(title: &str) -> (Option<&str>, &str) {
    if title.starts_with("[r/") {
        if let Some(end) = title.find(']') {
            return (Some(&title[..=end]), title[end + 1..].trim());
        }
    }
    (None, title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_ascii_only_normalizes_whitespace() {
        let input = "Hello,   world!  This is   (plain) ASCII #1 ~ok~";
        assert_eq!(
            sanitize(input),
            "Hello, world! This is (plain) ASCII #1 ~ok~"
        );

        let already_clean = "Nothing to change here.";
        assert_eq!(sanitize(already_clean), already_clean);
    }

    #[test]
    fn test_sanitize_typography() {
        assert_eq!(
            sanitize("\u{201C}Quote\u{201D} \u{2014} it\u{2019}s fine\u{2026}"),
            "\"Quote\" - it's fine..."
        );
    }

    #[test]
    fn test_sanitize_controls() {
        assert_eq!(sanitize("line one\nline\ttwo\u{0007}"), "line one line two");
        assert_eq!(sanitize("zero\u{200B}width"), "zerowidth");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn test_disallowed_content() {
        assert!(is_disallowed("look at https://example.com"));
        assert!(is_disallowed("see photo.JPG"));
        assert!(is_disallowed("imgur.com/abc"));
        assert!(!is_disallowed("just a normal comment about dogs"));
    }

    #[test]
    fn test_media_post_detection() {
        assert!(looks_like_media_post("My cat [i.redd.it]"));
        assert!(!looks_like_media_post("What is your unpopular opinion?"));
    }

    #[test]
    fn test_split_speaker() {
        assert_eq!(split_speaker("alice: hi there"), (Some("alice"), "hi there"));
        assert_eq!(split_speaker("no label"), (None, "no label"));
        assert_eq!(split_speaker("a: b: c"), (Some("a"), "b: c"));
    }

    #[test]
    fn test_caption_tokens_with_speaker() {
        let tokens = CaptionTokens::from_text("big bob: I like turtles");
        assert_eq!(tokens.speaker(), &["big", "bob", ":"]);
        assert_eq!(tokens.body(), &["I", "like", "turtles"]);
    }

    #[test]
    fn test_caption_tokens_without_speaker() {
        let tokens = CaptionTokens::from_text("  plain   words ");
        assert!(tokens.speaker().is_empty());
        assert_eq!(tokens.body(), &["plain", "words"]);
    }

    #[test]
    fn test_grapheme_len() {
        assert_eq!(grapheme_len("cafe\u{301}"), 4);
        assert_eq!(grapheme_len("word"), 4);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("my cool video!.mp4", 60),
            Some("mycoolvideomp4".to_string())
        );
        assert_eq!(sanitize_filename("a_b-c", 3), Some("a_b".to_string()));
        assert_eq!(sanitize_filename("!!!", 60), None);
    }

    #[test]
    fn test_split_title_prefix() {
        assert_eq!(
            split_title_prefix("[r/AskReddit] What now?"),
            (Some("[r/AskReddit]"), "What now?")
        );
        assert_eq!(split_title_prefix("No prefix"), (None, "No prefix"));
    }
}
