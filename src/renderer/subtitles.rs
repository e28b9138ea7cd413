use crate::captions::{CaptionRole, CaptionUnit, TitleCaption};
use crate::config::CaptionConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Box behind captions, 70% opaque black.
const CAPTION_BOX: &str = "&H4D000000";
const OUTLINE: &str = "&H00000000";

/// Seconds to ASS time (`H:MM:SS.cc`).
pub fn ass_timestamp(seconds: f64) -> String {
    let total = (seconds.max(0.0) * 100.0).round() as i64;
    let h = total / 360000;
    let m = (total % 360000) / 6000;
    let s = (total % 6000) / 100;
    let c = total % 100;
    format!("{:01}:{:02}:{:02}.{:02}", h, m, s, c)
}

/// `#RRGGBB` to ASS style color `&HAABBGGRR`; white when unparseable.
pub fn hex_to_ass_color(hex: &str, alpha: u8) -> String {
    match parse_hex(hex) {
        Some((r, g, b)) => format!("&H{:02X}{:02X}{:02X}{:02X}", alpha, b, g, r),
        None => format!("&H{:02X}FFFFFF", alpha),
    }
}

/// `#RRGGBB` to an inline override color `&HBBGGRR&`.
fn inline_color(hex: &str) -> String {
    let (r, g, b) = parse_hex(hex).unwrap_or((255, 255, 255));
    format!("&H{:02X}{:02X}{:02X}&", b, g, r)
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Braces and backslashes would be read as override tags.
fn escape_text(text: &str) -> String {
    text.replace('\\', "/").replace('{', "(").replace('}', ")")
}

/// Builds the `.ass` file burned into the video: pinned title plus word captions.
pub struct SubtitleDocument<'a> {
    width: u32,
    height: u32,
    config: &'a CaptionConfig,
    events: Vec<String>,
}

impl<'a> SubtitleDocument<'a> {
    pub fn new(width: u32, height: u32, config: &'a CaptionConfig) -> Self {
        Self {
            width,
            height,
            config,
            events: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Title pinned to the top for the whole video.
    pub fn add_title(&mut self, title: &TitleCaption, duration: f64) {
        let mut text = String::new();
        if let Some(prefix) = &title.prefix {
            text.push_str(&format!(
                "{{\\c{}}}{} ",
                inline_color(&self.config.title_accent_color),
                escape_text(prefix)
            ));
        }
        text.push_str(&format!(
            "{{\\c{}}}{}",
            inline_color(&self.config.title_color),
            escape_text(&title.text)
        ));
        self.events.push(format!(
            "Dialogue: 0,{},{},Title,,0,0,0,,{}",
            ass_timestamp(0.0),
            ass_timestamp(duration),
            text
        ));
    }

    pub fn add_captions(&mut self, units: &[CaptionUnit]) {
        for unit in units {
            let (style, layer, position) = match unit.style.role {
                CaptionRole::Speaker => (
                    "Speaker",
                    1,
                    format!("\\pos({},{})", self.width / 2, self.height * 2 / 5),
                ),
                CaptionRole::Word | CaptionRole::Whole => ("Caption", 2, String::new()),
            };

            let mut overrides = format!(
                "{}\\c{}\\fs{}",
                position,
                inline_color(&unit.style.color),
                unit.style.font_size
            );
            if unit.style.highlighted {
                overrides = format!(
                    "{}\\c{}\\3c{}\\3a&H00&",
                    overrides,
                    inline_color(&self.config.highlight_color),
                    inline_color(&self.config.highlight_background)
                );
            }

            self.events.push(format!(
                "Dialogue: {},{},{},{},,0,0,0,,{{{}}}{}",
                layer,
                ass_timestamp(unit.start),
                ass_timestamp(unit.end()),
                style,
                overrides,
                escape_text(&unit.text)
            ));
        }
    }

    pub fn render(&self) -> String {
        let font = &self.config.font;
        let white = hex_to_ass_color("#FFFFFF", 0);
        let mut doc = format!(
            r#"[Script Info]
ScriptType: v4.00+
PlayResX: {w}
PlayResY: {h}
WrapStyle: 0
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,BackColour,Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,Alignment,MarginL,MarginR,MarginV,Encoding
Style: Title,{font},{title_size},{white},{white},{outline},{outline},1,0,0,0,100,100,0,0,1,4,0,8,60,60,120,1
Style: Speaker,{font},{title_size},{white},{white},{outline},{outline},1,0,0,0,100,100,0,0,1,4,0,5,60,60,0,1
Style: Caption,{font},{size},{white},{white},{caption_box},{outline},1,0,0,0,100,100,0,0,3,16,0,5,54,54,0,1

[Events]
Format: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
"#,
            w = self.width,
            h = self.height,
            font = font,
            title_size = self.config.title_font_size,
            size = self.config.font_size,
            white = white,
            outline = OUTLINE,
            caption_box = CAPTION_BOX,
        );
        for event in &self.events {
            doc.push_str(event);
            doc.push('\n');
        }
        doc
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("Failed to write subtitles: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::CaptionStyle;
    use tempfile::TempDir;

    fn word(text: &str, start: f64, duration: f64, highlighted: bool) -> CaptionUnit {
        CaptionUnit {
            text: text.into(),
            start,
            duration,
            style: CaptionStyle {
                role: CaptionRole::Word,
                color: "#FF4500".into(),
                font_size: 120,
                highlighted,
            },
        }
    }

    #[test]
    fn test_ass_timestamp() {
        assert_eq!(ass_timestamp(0.0), "0:00:00.00");
        assert_eq!(ass_timestamp(61.257), "0:01:01.26");
        assert_eq!(ass_timestamp(3725.5), "1:02:05.50");
        assert_eq!(ass_timestamp(-1.0), "0:00:00.00");
    }

    #[test]
    fn test_hex_to_ass_color() {
        assert_eq!(hex_to_ass_color("#FF4500", 0), "&H000045FF");
        assert_eq!(hex_to_ass_color("00BFFF", 0x4D), "&H4DFFBF00");
        assert_eq!(hex_to_ass_color("oops", 0), "&H00FFFFFF");
        assert_eq!(inline_color("#FF4567"), "&H6745FF&");
    }

    #[test]
    fn test_document_layout() {
        let config = CaptionConfig::default();
        let mut doc = SubtitleDocument::new(1080, 1920, &config);
        doc.add_title(&TitleCaption::from_display_title("[r/AskReddit] Hi {there}"), 42.0);
        doc.add_captions(&[word("hello", 1.0, 0.5, false), word("world", 1.6, 0.4, true)]);

        let rendered = doc.render();
        assert_eq!(doc.event_count(), 3);
        assert!(rendered.contains("PlayResX: 1080"));
        assert!(rendered.contains("Style: Caption,Noto Sans,120"));
        let title_line = "Dialogue: 0,0:00:00.00,0:00:42.00,Title,,0,0,0,,{\\c&H0045FF&}[r/AskReddit] ";
        assert!(rendered.contains(title_line));
        assert!(rendered.contains("Hi (there)"));
        assert!(rendered.contains("Dialogue: 2,0:00:01.00,0:00:01.50,Caption"));
        assert!(rendered.contains("\\3c&H000000&"));
    }

    #[test]
    fn test_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("captions.ass");
        let config = CaptionConfig::default();
        let doc = SubtitleDocument::new(1080, 1920, &config);
        doc.write(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("[Script Info]"));
    }
}
