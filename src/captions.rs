use crate::budget::TimelineSlot;
use crate::config::{CaptionConfig, MismatchPolicy};
use crate::narration::NarrationSegment;
use crate::text::{self, CaptionTokens};
use tracing::{debug, warn};

/// Shortest time a caption stays on screen.
const MIN_CAPTION_SECONDS: f64 = 0.01;
const WHITE: &str = "#FFFFFF";
const GOLD: &str = "#FFD700";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionRole {
    /// Speaker label shown above the spoken words.
    Speaker,
    /// One spoken word.
    Word,
    /// The whole line, used when word timing is unavailable.
    Whole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub role: CaptionRole,
    pub color: String,
    pub font_size: u32,
    pub highlighted: bool,
}

/// One styled token placed on the global timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionUnit {
    pub text: String,
    pub start: f64,
    pub duration: f64,
    pub style: CaptionStyle,
}

impl CaptionUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// The pinned title: an accent-colored community prefix and the title text.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleCaption {
    pub prefix: Option<String>,
    pub text: String,
}

impl TitleCaption {
    pub fn from_display_title(title: &str) -> Self {
        let (prefix, rest) = text::split_title_prefix(title);
        Self {
            prefix: prefix.map(str::to_string),
            text: text::sanitize(rest),
        }
    }
}

/// Counts of what the index pairing could not match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    pub emitted: usize,
    pub skipped_empty: usize,
    /// Recognized words with no source token at the same position.
    pub dropped_timings: usize,
    /// Source tokens with no recognized word at the same position.
    pub dropped_tokens: usize,
}

impl AlignmentReport {
    pub fn is_mismatched(&self) -> bool {
        self.dropped_timings > 0 || self.dropped_tokens > 0
    }
}

/// Turns word timings into caption units on the global timeline.
pub struct SubtitleAligner<'a> {
    config: &'a CaptionConfig,
}

impl<'a> SubtitleAligner<'a> {
    pub fn new(config: &'a CaptionConfig) -> Self {
        Self { config }
    }

    /// Fixed lag added to every word; longer lines get more.
    pub fn delay_for(&self, word_count: usize) -> f64 {
        if word_count > self.config.long_text_words {
            self.config.long_text_delay
        } else {
            self.config.base_delay
        }
    }

    /// Palette entry for a segment, skipping any entry equal to the speaker color.
    fn body_color(&self, color_index: usize) -> String {
        let palette = &self.config.palette;
        let speaker = &self.config.speaker_color;
        (0..palette.len())
            .map(|step| &palette[(color_index + step) % palette.len()])
            .find(|color| !color.eq_ignore_ascii_case(speaker))
            .cloned()
            .unwrap_or_else(|| {
                let fallback = if speaker.eq_ignore_ascii_case(WHITE) { GOLD } else { WHITE };
                fallback.to_string()
            })
    }

    fn font_size_for(&self, token: &str) -> u32 {
        if text::grapheme_len(token) > self.config.long_word_chars {
            self.config.long_word_font_size
        } else {
            self.config.font_size
        }
    }

    fn word_style(&self, token: &str, color: &str, body_index: usize) -> CaptionStyle {
        CaptionStyle {
            role: CaptionRole::Word,
            color: color.to_string(),
            font_size: self.font_size_for(token),
            highlighted: self.config.highlight_word == Some(body_index),
        }
    }

    /// Captions for one placed segment.
    pub fn align(
        &self,
        slot: &TimelineSlot<NarrationSegment>,
    ) -> (Vec<CaptionUnit>, AlignmentReport) {
        let segment = &slot.segment;
        let tokens = CaptionTokens::from_text(&segment.text);
        let color = self.body_color(slot.color_index);
        let mut units = Vec::new();
        let mut report = AlignmentReport::default();

        if !tokens.speaker().is_empty() {
            let label = text::sanitize(&tokens.speaker().join(" ").replace(" :", ":"));
            if !label.is_empty() {
                units.push(CaptionUnit {
                    text: label,
                    start: slot.offset,
                    duration: segment.duration.max(MIN_CAPTION_SECONDS),
                    style: CaptionStyle {
                        role: CaptionRole::Speaker,
                        color: self.config.speaker_color.clone(),
                        font_size: self.config.title_font_size,
                        highlighted: false,
                    },
                });
            }
        }

        if segment.words.is_empty() {
            let whole = text::sanitize(&segment.spoken);
            let whole = if whole.is_empty() { "...".to_string() } else { whole };
            units.push(CaptionUnit {
                text: whole,
                start: slot.offset,
                duration: segment.duration.max(MIN_CAPTION_SECONDS),
                style: CaptionStyle {
                    role: CaptionRole::Whole,
                    color,
                    font_size: self.config.long_word_font_size,
                    highlighted: false,
                },
            });
            report.emitted = units.len();
            return (units, report);
        }

        let delay = self.delay_for(segment.text.split_whitespace().count());
        let body = tokens.body();
        report.dropped_timings = segment.words.len().saturating_sub(body.len());
        report.dropped_tokens = body.len().saturating_sub(segment.words.len());

        for (index, word) in segment.words.iter().enumerate() {
            let source = match self.config.mismatch_policy {
                MismatchPolicy::SourceTokens => match body.get(index) {
                    Some(token) => token.as_str(),
                    None => break,
                },
                MismatchPolicy::RecognizedWords => word.token.as_str(),
            };
            let token = text::sanitize(source);
            if token.is_empty() {
                report.skipped_empty += 1;
                continue;
            }

            let start = slot.offset + word.start.max(0.0) + delay;
            let end = slot.offset + word.end + delay;
            units.push(CaptionUnit {
                style: self.word_style(&token, &color, index),
                text: token,
                start,
                duration: (end - start).max(MIN_CAPTION_SECONDS),
            });
        }

        if self.config.mismatch_policy == MismatchPolicy::RecognizedWords {
            report.dropped_timings = 0;
            report.dropped_tokens = 0;
        }
        report.emitted = units.len();
        (units, report)
    }

    /// Captions for every slot, in timeline order.
    pub fn align_all(&self, slots: &[TimelineSlot<NarrationSegment>]) -> Vec<CaptionUnit> {
        let mut all = Vec::new();
        for slot in slots {
            let (units, report) = self.align(slot);
            if report.is_mismatched() {
                warn!(
                    segment = slot.color_index,
                    dropped_timings = report.dropped_timings,
                    dropped_tokens = report.dropped_tokens,
                    "Recognized words and source tokens differ in count"
                );
            }
            debug!(segment = slot.color_index, emitted = report.emitted, "Captions aligned");
            all.extend(units);
        }
        all
    }
}

/// Latest end time among the captions.
pub fn last_caption_end(units: &[CaptionUnit]) -> Option<f64> {
    units.iter().map(CaptionUnit::end).reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioClip;
    use crate::narration::{SegmentRole, WordTiming};
    use std::path::PathBuf;

    fn segment(text: &str, duration: f64, words: &[(&str, f64, f64)]) -> NarrationSegment {
        NarrationSegment {
            role: SegmentRole::Comment(0),
            text: text.to_string(),
            spoken: text::split_speaker(text).1.to_string(),
            audio_path: PathBuf::from("seg.wav"),
            clip: AudioClip::silence(duration, 8000, 1),
            duration,
            words: words
                .iter()
                .map(|(t, s, e)| WordTiming {
                    token: t.to_string(),
                    start: *s,
                    end: *e,
                })
                .collect(),
            timing_degraded: words.is_empty(),
        }
    }

    fn slot(
        segment: NarrationSegment,
        offset: f64,
        color_index: usize,
    ) -> TimelineSlot<NarrationSegment> {
        TimelineSlot {
            segment,
            offset,
            color_index,
        }
    }

    #[test]
    fn test_words_are_offset_and_monotonic() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);
        let seg = segment(
            "alice: I like turtles",
            2.0,
            &[("I", 0.0, 0.2), ("like", 0.3, 0.6), ("turtles", 0.7, 1.4)],
        );
        let (units, report) = aligner.align(&slot(seg, 10.0, 1));

        assert_eq!(units[0].style.role, CaptionRole::Speaker);
        assert_eq!(units[0].text, "alice:");
        assert_eq!(units[0].style.color, "#00BFFF");

        let words: Vec<&CaptionUnit> = units
            .iter()
            .filter(|u| u.style.role == CaptionRole::Word)
            .collect();
        assert_eq!(words.len(), 3);
        assert_eq!(words[1].text, "like");
        assert!((words[0].start - 10.01).abs() < 1e-9);
        assert!(words.windows(2).all(|w| w[0].start <= w[1].start));
        assert!(words.iter().all(|u| u.start >= 10.0));
        assert_eq!(words[0].style.color, "#FFD700");
        assert!(!report.is_mismatched());
    }

    fn numbered_words(count: usize) -> (String, Vec<(String, f64, f64)>) {
        let tokens: Vec<String> = (0..count).map(|i| format!("w{}", i)).collect();
        let timings = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as f64 * 0.2, i as f64 * 0.2 + 0.1))
            .collect();
        (format!("alice: {}", tokens.join(" ")), timings)
    }

    #[test]
    fn test_delay_counts_words_of_the_line() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);

        // "alice:" plus 24 body words is 25 words, which keeps the short delay.
        for (body_words, expected) in [(24, 0.01), (25, 0.10)] {
            let (text, timings) = numbered_words(body_words);
            let words: Vec<(&str, f64, f64)> =
                timings.iter().map(|(t, s, e)| (t.as_str(), *s, *e)).collect();
            let (units, _) = aligner.align(&slot(segment(&text, 10.0, &words), 5.0, 0));

            let first = units.iter().find(|u| u.style.role == CaptionRole::Word).unwrap();
            assert_eq!(first.text, "w0");
            assert!((first.start - (5.0 + expected)).abs() < 1e-9, "{} body words", body_words);
        }
    }

    #[test]
    fn test_speaker_color_differs_from_body() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);

        for color_index in 0..config.palette.len() * 2 {
            let seg = segment("alice: hello", 1.0, &[("hello", 0.0, 0.5)]);
            let (units, _) = aligner.align(&slot(seg, 0.0, color_index));
            assert_eq!(units[0].style.role, CaptionRole::Speaker);
            assert!(
                !units[1].style.color.eq_ignore_ascii_case(&units[0].style.color),
                "color index {}",
                color_index
            );
        }
    }

    #[test]
    fn test_palette_of_only_speaker_color_falls_back() {
        let config = CaptionConfig {
            palette: vec!["#00bfff".to_string()],
            ..CaptionConfig::default()
        };
        let aligner = SubtitleAligner::new(&config);
        let hello = || segment("hello", 1.0, &[("hello", 0.0, 0.5)]);
        let (units, _) = aligner.align(&slot(hello(), 0.0, 3));
        assert_eq!(units[0].style.color, "#FFFFFF");

        let empty = CaptionConfig {
            palette: Vec::new(),
            ..CaptionConfig::default()
        };
        let aligner = SubtitleAligner::new(&empty);
        let (units, _) = aligner.align(&slot(hello(), 0.0, 0));
        assert_eq!(units[0].style.color, "#FFFFFF");
    }

    #[test]
    fn test_long_text_uses_larger_delay() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);
        assert_eq!(aligner.delay_for(25), 0.01);
        assert_eq!(aligner.delay_for(26), 0.10);
    }

    #[test]
    fn test_mismatch_drops_tail_and_reports() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);

        let timings = [("one", 0.0, 0.2), ("two", 0.3, 0.5), ("three", 0.6, 0.8)];
        let extra_words = segment("one two", 1.0, &timings);
        let (units, report) = aligner.align(&slot(extra_words, 0.0, 0));
        assert_eq!(units.len(), 2);
        assert_eq!(report.dropped_timings, 1);

        let extra_tokens = segment("one two three", 1.0, &[("one", 0.0, 0.2)]);
        let (units, report) = aligner.align(&slot(extra_tokens, 0.0, 0));
        assert_eq!(units.len(), 1);
        assert_eq!(report.dropped_tokens, 2);
    }

    #[test]
    fn test_recognized_words_policy() {
        let config = CaptionConfig {
            mismatch_policy: MismatchPolicy::RecognizedWords,
            ..CaptionConfig::default()
        };
        let aligner = SubtitleAligner::new(&config);
        let timings = [("won", 0.0, 0.2), ("too", 0.3, 0.5), ("three", 0.6, 0.8)];
        let seg = segment("one two", 1.0, &timings);
        let (units, report) = aligner.align(&slot(seg, 0.0, 0));
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["won", "too", "three"]);
        assert!(!report.is_mismatched());
    }

    #[test]
    fn test_empty_tokens_are_skipped() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);
        let timings = [("hi", 0.0, 0.1), ("", 0.2, 0.3), ("there", 0.4, 0.6)];
        let seg = segment("hi \u{200B} there", 1.0, &timings);
        let (units, report) = aligner.align(&slot(seg, 0.0, 0));
        assert_eq!(units.len(), 2);
        assert_eq!(report.skipped_empty, 1);
    }

    #[test]
    fn test_missing_timing_falls_back_to_whole_caption() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);
        let (units, _) = aligner.align(&slot(segment("bob: the whole line", 3.5, &[]), 20.0, 2));

        let whole = units.iter().find(|u| u.style.role == CaptionRole::Whole).unwrap();
        assert_eq!(whole.text, "the whole line");
        assert_eq!(whole.start, 20.0);
        assert_eq!(whole.duration, 3.5);
        assert_eq!(whole.style.color, "#FFD700");
    }

    #[test]
    fn test_highlight_and_long_word_font() {
        let config = CaptionConfig {
            highlight_word: Some(1),
            ..CaptionConfig::default()
        };
        let aligner = SubtitleAligner::new(&config);
        let timings = [("a", 0.0, 0.1), ("extraordinarily", 0.2, 0.9)];
        let seg = segment("a extraordinarily", 1.0, &timings);
        let (units, _) = aligner.align(&slot(seg, 0.0, 0));
        assert!(!units[0].style.highlighted);
        assert!(units[1].style.highlighted);
        assert_eq!(units[0].style.font_size, 120);
        assert_eq!(units[1].style.font_size, 80);
    }

    #[test]
    fn test_zero_length_word_gets_minimum_duration() {
        let config = CaptionConfig::default();
        let aligner = SubtitleAligner::new(&config);
        let seg = segment("blip", 1.0, &[("blip", 0.5, 0.5)]);
        let (units, _) = aligner.align(&slot(seg, 0.0, 0));
        assert_eq!(units[0].duration, MIN_CAPTION_SECONDS);
        assert_eq!(last_caption_end(&units), Some(units[0].end()));
    }

    #[test]
    fn test_title_caption_prefix() {
        let title = TitleCaption::from_display_title("[r/AskReddit] What\u{2019}s up?");
        assert_eq!(title.prefix.as_deref(), Some("[r/AskReddit]"));
        assert_eq!(title.text, "What's up?");
    }
}
