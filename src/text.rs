// WHY: Paragraph text as UTF-16 code units with styled runs
// Offsets throughout the crate are code-unit offsets so stored annotations line up with the editor's view

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::ParagraphId;

/// Style applied to chapter numbers embedded in the text
pub const CHAPTER_NUMBER_STYLE: &str = "Chapter Number";
/// Style applied to verse numbers embedded in the text
pub const VERSE_NUMBER_STYLE: &str = "Verse Number";
/// Placeholder for an embedded object (footnote anchor, picture)
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';
/// Hard line break; always a one-character segment of its own
pub const HARD_LINE_BREAK: char = '\u{2028}';

/// Writing system identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WsId(pub u32);

impl fmt::Display for WsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws{}", self.0)
    }
}

/// A run of text sharing one writing system and style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub begin: usize,
    pub end: usize,
    pub ws: WsId,
    pub style: Option<String>,
}

impl TextRun {
    /// Whether the run carries one of the label styles (chapter/verse numbers)
    pub fn is_label_style(&self) -> bool {
        matches!(self.style.as_deref(), Some(CHAPTER_NUMBER_STYLE) | Some(VERSE_NUMBER_STYLE))
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Formatted paragraph text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledText {
    units: Vec<u16>,
    runs: Vec<TextRun>,
}

impl StyledText {
    /// Single-run text in one writing system with no style
    pub fn plain(text: &str, ws: WsId) -> Self {
        StyledText::builder().run(text, ws).build()
    }

    pub fn builder() -> StyledTextBuilder {
        StyledTextBuilder::default()
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    /// Full code point at `pos` and the number of code units it occupies.
    /// Surrogate pairs decode as `(high - 0xD800) << 10 + low + 0x2400`; a lone surrogate reads as U+FFFD.
    pub fn code_point_at(&self, pos: usize) -> (char, usize) {
        let unit = self.units[pos] as u32;
        if (0xD800..=0xDBFF).contains(&unit) {
            if let Some(&low) = self.units.get(pos + 1) {
                let low = low as u32;
                if (0xDC00..=0xDFFF).contains(&low) {
                    let cp = ((unit - 0xD800) << 10) + low + 0x2400;
                    return (char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER), 2);
                }
            }
            return (char::REPLACEMENT_CHARACTER, 1);
        }
        (char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER), 1)
    }

    /// Code point ending just before `pos`, if any
    pub fn code_point_before(&self, pos: usize) -> Option<(char, usize)> {
        if pos == 0 || pos > self.units.len() {
            return None;
        }
        let last = self.units[pos - 1];
        if (0xDC00..=0xDFFF).contains(&last) && pos >= 2 && (0xD800..=0xDBFF).contains(&self.units[pos - 2]) {
            return Some((self.code_point_at(pos - 2).0, 2));
        }
        Some((self.code_point_at(pos - 1).0, 1))
    }

    /// Run covering `pos`; `pos == len` maps to the last run
    pub fn run_at(&self, pos: usize) -> Option<&TextRun> {
        let idx = self.runs.partition_point(|r| r.end <= pos);
        self.runs.get(idx).or_else(|| self.runs.last())
    }

    /// Writing system at `pos`, defaulting to the first run's
    pub fn ws_at(&self, pos: usize) -> WsId {
        self.run_at(pos).map(|r| r.ws).unwrap_or(WsId(0))
    }

    /// Whether `pos` lies in a chapter/verse-number run
    pub fn is_label_run_at(&self, pos: usize) -> bool {
        self.run_at(pos).is_some_and(TextRun::is_label_style)
    }

    /// Whether the run at `pos` consists solely of the object-replacement character
    pub fn is_object_run_at(&self, pos: usize) -> bool {
        match self.run_at(pos) {
            Some(run) => run.len() == 1 && self.units[run.begin] == OBJECT_REPLACEMENT as u16,
            None => false,
        }
    }

    /// Text of `[begin, end)` as a Rust string
    pub fn slice(&self, begin: usize, end: usize) -> String {
        String::from_utf16_lossy(&self.units[begin..end])
    }

    pub fn to_text(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    /// Replace `[begin, end)` with `text`; inserted text joins the run that covers `begin`
    pub fn replace(&mut self, begin: usize, end: usize, text: &str) {
        assert!(begin <= end && end <= self.units.len(), "edit range out of bounds");
        let inserted: Vec<u16> = text.encode_utf16().collect();
        let ins = inserted.len();
        let del = end - begin;
        self.units.splice(begin..end, inserted);

        let owner = self
            .runs
            .iter()
            .position(|r| r.begin <= begin && begin < r.end)
            .unwrap_or(self.runs.len().saturating_sub(1));
        let shift = |o: usize| if o >= end { o - del + ins } else { begin + ins };

        let mut runs = Vec::with_capacity(self.runs.len());
        for (i, run) in self.runs.iter().enumerate() {
            let (nb, ne) = if i < owner {
                (run.begin, run.end)
            } else if i == owner {
                (run.begin, shift(run.end.max(begin)).max(begin + ins))
            } else {
                (shift(run.begin), shift(run.end))
            };
            if nb < ne || self.runs.len() == 1 {
                runs.push(TextRun { begin: nb, end: ne, ws: run.ws, style: run.style.clone() });
            }
        }
        self.runs = runs;
    }
}

impl fmt::Display for StyledText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Incremental construction of styled text
#[derive(Debug, Default)]
pub struct StyledTextBuilder {
    units: Vec<u16>,
    runs: Vec<TextRun>,
}

impl StyledTextBuilder {
    pub fn run(self, text: &str, ws: WsId) -> Self {
        self.push(text, ws, None)
    }

    pub fn styled_run(self, text: &str, ws: WsId, style: &str) -> Self {
        self.push(text, ws, Some(style.to_string()))
    }

    fn push(mut self, text: &str, ws: WsId, style: Option<String>) -> Self {
        let begin = self.units.len();
        self.units.extend(text.encode_utf16());
        let end = self.units.len();
        // Adjacent runs with identical properties merge
        if let Some(last) = self.runs.last_mut() {
            if last.ws == ws && last.style == style {
                last.end = end;
                return self;
            }
            if last.is_empty() {
                self.runs.pop();
            }
        }
        self.runs.push(TextRun { begin, end, ws, style });
        self
    }

    pub fn build(mut self) -> StyledText {
        if self.runs.is_empty() {
            self.runs.push(TextRun { begin: 0, end: 0, ws: WsId(0), style: None });
        }
        StyledText { units: self.units, runs: self.runs }
    }
}

/// A paragraph handed to the reconciler
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub id: ParagraphId,
    pub text: StyledText,
}

impl Paragraph {
    pub fn new(id: ParagraphId, text: StyledText) -> Self {
        Self { id, text }
    }

    pub fn plain(id: u64, text: &str) -> Self {
        Self::new(ParagraphId(id), StyledText::plain(text, WsId(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrogate_pair_decoding() {
        // U+1D11E MUSICAL SYMBOL G CLEF
        let text = StyledText::plain("a\u{1D11E}b", WsId(1));
        assert_eq!(text.len(), 4);
        assert_eq!(text.code_point_at(1), ('\u{1D11E}', 2));
        assert_eq!(text.code_point_at(3), ('b', 1));
        assert_eq!(text.code_point_before(3), Some(('\u{1D11E}', 2)));
        assert_eq!(text.code_point_before(0), None);
    }

    #[test]
    fn test_runs_and_label_styles() {
        let text = StyledText::builder()
            .styled_run("12", WsId(1), VERSE_NUMBER_STYLE)
            .run("In the beginning", WsId(1))
            .build();
        assert_eq!(text.runs().len(), 2);
        assert!(text.is_label_run_at(0));
        assert!(text.is_label_run_at(1));
        assert!(!text.is_label_run_at(2));
        assert_eq!(text.slice(2, 4), "In");
    }

    #[test]
    fn test_object_replacement_run() {
        let text = StyledText::builder()
            .run("word ", WsId(1))
            .styled_run("\u{FFFC}", WsId(1), "Footnote Anchor")
            .run(" more", WsId(1))
            .build();
        assert!(text.is_object_run_at(5));
        assert!(!text.is_object_run_at(0));
    }

    #[test]
    fn test_replace_inside_single_run() {
        let mut text = StyledText::plain("cats run.", WsId(1));
        text.replace(4, 4, " ");
        assert_eq!(text.to_text(), "cats  run.");
        assert_eq!(text.runs()[0].end, 10);
    }

    #[test]
    fn test_replace_shifts_following_runs() {
        let mut text = StyledText::builder()
            .run("abc ", WsId(1))
            .styled_run("3", WsId(1), VERSE_NUMBER_STYLE)
            .run(" def", WsId(1))
            .build();
        text.replace(1, 2, "XYZ");
        assert_eq!(text.to_text(), "aXYZc 3 def");
        let label = &text.runs()[1];
        assert_eq!((label.begin, label.end), (6, 7));
        assert!(text.is_label_run_at(6));
    }

    #[test]
    fn test_replace_at_end_extends_last_run() {
        let mut text = StyledText::plain("go", WsId(1));
        text.replace(2, 2, " home");
        assert_eq!(text.to_text(), "go home");
        assert_eq!(text.runs().len(), 1);
        assert_eq!(text.runs()[0].end, 7);
    }
}
