// WHY: Segment boundary state machine with anchors that keep segmentation stable across edits
// One pass over the paragraph; consumers decide whether boundaries become annotations or views

use serde::Serialize;
use tracing::debug;

use crate::classify::{is_decimal_digit, CharClassifier};
use crate::error::Result;
use crate::store::AnnotationRef;
use crate::text::{StyledText, HARD_LINE_BREAK};

/// Sentence terminators; `.` is further filtered by the special-period rules
pub const EOS_CHARS: &[char] = &[
    '.', '!', '?',
    '\u{037E}', // Greek question mark
    '\u{0589}', // Armenian full stop
    '\u{061F}', // Arabic question mark
    '\u{06D4}', // Arabic full stop
    '\u{0700}', // Syriac end of paragraph
    '\u{0964}', '\u{0965}', // Devanagari danda, double danda
    '\u{1362}', // Ethiopic full stop
    '\u{166E}', // Canadian syllabics full stop
    '\u{203C}', '\u{203D}', '\u{2047}', '\u{2048}', '\u{2049}',
    '\u{3002}', // Ideographic full stop
    '\u{FF01}', '\u{FF0E}', '\u{FF1F}',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitState {
    AwaitingFirstLetter,
    BuildingSegment,
    FoundEosChar,
    FoundBlankAfterEos,
    FoundNonBlankAfterBlankAfterEos,
}

/// One segment as offsets into the paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentBoundary {
    pub begin: usize,
    pub end: usize,
    /// First EOS character, or where the next segment begins for label and hard-break closes
    pub anchor: Option<usize>,
}

/// Receives boundaries in paragraph order
pub trait SegmentSink {
    fn accept(&mut self, boundary: SegmentBoundary) -> Result<()>;
}

/// Produces an annotation for each segment as it is recognized
pub trait SegmentFactory {
    fn create_segment(&mut self, boundary: SegmentBoundary) -> Result<AnnotationRef>;
}

/// Consumer that turns every boundary into an annotation via a factory
pub struct MaterializingSink<'f, F: SegmentFactory + ?Sized> {
    factory: &'f mut F,
    pub segments: Vec<(SegmentBoundary, AnnotationRef)>,
}

impl<'f, F: SegmentFactory + ?Sized> MaterializingSink<'f, F> {
    pub fn new(factory: &'f mut F) -> Self {
        Self { factory, segments: Vec::new() }
    }
}

impl<F: SegmentFactory + ?Sized> SegmentSink for MaterializingSink<'_, F> {
    fn accept(&mut self, boundary: SegmentBoundary) -> Result<()> {
        let id = self.factory.create_segment(boundary)?;
        self.segments.push((boundary, id));
        Ok(())
    }
}

/// Consumer that only records boundaries, never touching a store
#[derive(Debug, Default)]
pub struct BoundaryCollector {
    pub boundaries: Vec<SegmentBoundary>,
}

/// Lightweight view of a segment for previews and translation alignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentView {
    pub begin: usize,
    pub end: usize,
    pub anchor: Option<usize>,
    pub text: String,
}

impl BoundaryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn views(&self, text: &StyledText) -> Vec<SegmentView> {
        self.boundaries
            .iter()
            .map(|b| SegmentView { begin: b.begin, end: b.end, anchor: b.anchor, text: text.slice(b.begin, b.end) })
            .collect()
    }
}

impl SegmentSink for BoundaryCollector {
    fn accept(&mut self, boundary: SegmentBoundary) -> Result<()> {
        self.boundaries.push(boundary);
        Ok(())
    }
}

/// Sentence-like segmentation of one paragraph
pub struct SegmentSplitter<'a> {
    text: &'a StyledText,
    classifier: &'a dyn CharClassifier,
    state: SplitState,
    processing_label: bool,
    seg_start: usize,
    anchor: Option<usize>,
    tentative_end: usize,
    has_content: bool,
}

impl<'a> SegmentSplitter<'a> {
    pub fn new(text: &'a StyledText, classifier: &'a dyn CharClassifier) -> Self {
        Self {
            text,
            classifier,
            state: SplitState::AwaitingFirstLetter,
            processing_label: false,
            seg_start: 0,
            anchor: None,
            tentative_end: 0,
            has_content: false,
        }
    }

    /// Boundaries of `text` without materializing anything
    pub fn boundaries(text: &StyledText, classifier: &dyn CharClassifier) -> Result<Vec<SegmentBoundary>> {
        let mut collector = BoundaryCollector::new();
        SegmentSplitter::new(text, classifier).run(&mut collector)?;
        Ok(collector.boundaries)
    }

    pub fn state(&self) -> SplitState {
        self.state
    }

    /// Drive the state machine over the whole paragraph
    pub fn run<S: SegmentSink + ?Sized>(mut self, sink: &mut S) -> Result<()> {
        let len = self.text.len();
        let mut pos = 0;
        let mut emitted = 0usize;

        while pos < len {
            let (ch, width) = self.text.code_point_at(pos);

            if ch == HARD_LINE_BREAK {
                if pos > self.seg_start {
                    self.close(sink, pos, Some(pos))?;
                    emitted += 1;
                }
                self.close(sink, pos + width, Some(pos + width))?;
                emitted += 1;
                self.state = SplitState::AwaitingFirstLetter;
                self.processing_label = false;
                pos += width;
                continue;
            }

            let white = self.classifier.is_white(ch);
            let label = self.is_label_at(pos);

            if self.processing_label {
                if label || white {
                    pos += width;
                    continue;
                }
                self.close(sink, pos, Some(pos))?;
                emitted += 1;
                self.processing_label = false;
                self.state = SplitState::BuildingSegment;
            } else if label {
                if self.has_content {
                    self.close(sink, pos, Some(pos))?;
                    emitted += 1;
                }
                self.processing_label = true;
                pos += width;
                continue;
            }

            let letter = !white && self.classifier.is_word_forming(ch, self.text.ws_at(pos));
            match self.state {
                SplitState::AwaitingFirstLetter => {
                    if letter {
                        self.state = SplitState::BuildingSegment;
                    }
                }
                SplitState::BuildingSegment => {
                    if self.is_eos_at(pos, ch) {
                        self.state = SplitState::FoundEosChar;
                        self.anchor = Some(pos);
                    }
                }
                SplitState::FoundEosChar => {
                    if white {
                        self.state = SplitState::FoundBlankAfterEos;
                        self.tentative_end = pos + width;
                    } else if letter {
                        // Missing space after the terminator; close right here
                        let anchor = self.anchor;
                        self.close(sink, pos, anchor)?;
                        emitted += 1;
                        self.state = SplitState::BuildingSegment;
                    }
                }
                SplitState::FoundBlankAfterEos => {
                    if white {
                        self.tentative_end = pos + width;
                    } else if letter {
                        let (end, anchor) = (self.tentative_end, self.anchor);
                        self.close(sink, end, anchor)?;
                        emitted += 1;
                        self.state = SplitState::BuildingSegment;
                    } else {
                        self.state = SplitState::FoundNonBlankAfterBlankAfterEos;
                    }
                }
                SplitState::FoundNonBlankAfterBlankAfterEos => {
                    if letter {
                        let (end, anchor) = (self.tentative_end, self.anchor);
                        self.close(sink, end, anchor)?;
                        emitted += 1;
                        self.state = SplitState::BuildingSegment;
                    }
                }
            }
            if !white {
                self.has_content = true;
            }
            pos += width;
        }

        if self.seg_start < len {
            let anchor = self.anchor;
            self.close(sink, len, anchor)?;
            emitted += 1;
        }
        debug!("Split paragraph of {} code units into {} segments", len, emitted);
        Ok(())
    }

    fn close<S: SegmentSink + ?Sized>(&mut self, sink: &mut S, end: usize, anchor: Option<usize>) -> Result<()> {
        sink.accept(SegmentBoundary { begin: self.seg_start, end, anchor })?;
        self.seg_start = end;
        self.anchor = None;
        self.has_content = false;
        Ok(())
    }

    /// Chapter/verse label text or a lone embedded object
    fn is_label_at(&self, pos: usize) -> bool {
        self.text.is_label_run_at(pos) || self.text.is_object_run_at(pos)
    }

    fn dot_at(&self, pos: usize) -> bool {
        pos < self.text.len() && self.text.units()[pos] == '.' as u16
    }

    fn is_eos_at(&self, pos: usize, ch: char) -> bool {
        if ch != '.' {
            return EOS_CHARS.contains(&ch);
        }
        // Only the first dot of a run can end a segment
        if pos > 0 && self.dot_at(pos - 1) {
            return false;
        }
        let mut run = 1;
        while self.dot_at(pos + run) {
            run += 1;
        }
        match run {
            2 => false,
            // An ellipsis only ends the segment when it ends the paragraph
            3 => pos + 3 == self.text.len(),
            1 => !self.digit_flanked(pos),
            _ => true,
        }
    }

    fn digit_flanked(&self, pos: usize) -> bool {
        let before = self.text.code_point_before(pos).is_some_and(|(c, _)| is_decimal_digit(c));
        let after = pos + 1 < self.text.len() && is_decimal_digit(self.text.code_point_at(pos + 1).0);
        before && after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DefaultClassifier;
    use crate::text::{WsId, CHAPTER_NUMBER_STYLE, VERSE_NUMBER_STYLE};

    fn split(text: &StyledText) -> Vec<String> {
        let classifier = DefaultClassifier::new();
        SegmentSplitter::boundaries(text, &classifier)
            .unwrap()
            .iter()
            .map(|b| text.slice(b.begin, b.end))
            .collect()
    }

    fn split_plain(text: &str) -> Vec<String> {
        split(&StyledText::plain(text, WsId(1)))
    }

    #[test]
    fn test_two_simple_sentences() {
        assert_eq!(split_plain("Stop. Go."), vec!["Stop. ", "Go."]);
    }

    #[test]
    fn test_anchor_is_first_eos() {
        let classifier = DefaultClassifier::new();
        let text = StyledText::plain("Stop!! Go.", WsId(1));
        let b = SegmentSplitter::boundaries(&text, &classifier).unwrap();
        assert_eq!(b[0], SegmentBoundary { begin: 0, end: 7, anchor: Some(4) });
        assert_eq!(b[1], SegmentBoundary { begin: 7, end: 10, anchor: Some(9) });
    }

    #[test]
    fn test_decimal_point_is_not_eos() {
        assert_eq!(split_plain("The total is 3.5 today."), vec!["The total is 3.5 today."]);
        assert_eq!(split_plain("Paid \u{0663}.\u{0665} today."), vec!["Paid \u{0663}.\u{0665} today."]);
    }

    #[test]
    fn test_vulgar_fraction_does_not_protect_period() {
        assert_eq!(split_plain("Item 1.\u{00BD} Next one."), vec!["Item 1.\u{00BD} ", "Next one."]);
    }

    #[test]
    fn test_ellipsis_mid_text_is_not_eos() {
        assert_eq!(split_plain("Wait... then go."), vec!["Wait... then go."]);
    }

    #[test]
    fn test_two_dots_never_eos() {
        assert_eq!(split_plain("Hmm.. maybe so."), vec!["Hmm.. maybe so."]);
    }

    #[test]
    fn test_four_dots_end_segment() {
        assert_eq!(split_plain("Wait.... Then go."), vec!["Wait.... ", "Then go."]);
    }

    #[test]
    fn test_ellipsis_at_end_is_eos() {
        let classifier = DefaultClassifier::new();
        let text = StyledText::plain("And then...", WsId(1));
        let b = SegmentSplitter::boundaries(&text, &classifier).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].anchor, Some(8));
    }

    #[test]
    fn test_missing_space_after_eos_still_splits() {
        assert_eq!(split_plain("One.Two."), vec!["One.", "Two."]);
    }

    #[test]
    fn test_quote_after_blank_goes_with_next_segment() {
        assert_eq!(split_plain("He left. \"Why?\" she asked."), vec!["He left. ", "\"Why?\" ", "she asked."]);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        assert_eq!(split_plain("\"Go.\" He went."), vec!["\"Go.\" ", "He went."]);
    }

    #[test]
    fn test_trailing_punctuation_only_segment() {
        assert_eq!(split_plain("Done.   --"), vec!["Done.   --"]);
        assert_eq!(split_plain("   "), vec!["   "]);
        assert!(split_plain("").is_empty());
    }

    #[test]
    fn test_hard_line_break_is_its_own_segment() {
        assert_eq!(split_plain("first line\u{2028}second"), vec!["first line", "\u{2028}", "second"]);
    }

    #[test]
    fn test_verse_numbers_make_label_segments() {
        let text = StyledText::builder()
            .styled_run("3", WsId(1), CHAPTER_NUMBER_STYLE)
            .styled_run("1", WsId(1), VERSE_NUMBER_STYLE)
            .run(" In the beginning was the word ", WsId(1))
            .styled_run("2", WsId(1), VERSE_NUMBER_STYLE)
            .run("and the word was with God.", WsId(1))
            .build();
        assert_eq!(
            split(&text),
            vec!["31 ", "In the beginning was the word ", "2", "and the word was with God."]
        );
    }

    #[test]
    fn test_object_replacement_run_is_label() {
        let text = StyledText::builder()
            .run("Text here ", WsId(1))
            .styled_run("\u{FFFC}", WsId(1), "Footnote")
            .run(" more text.", WsId(1))
            .build();
        assert_eq!(split(&text), vec!["Text here ", "\u{FFFC} ", "more text."]);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let classifier = DefaultClassifier::new();
        let text = StyledText::plain("A b. C d? E f! G... h 3.5 i.. j", WsId(1));
        let first = SegmentSplitter::boundaries(&text, &classifier).unwrap();
        let second = SegmentSplitter::boundaries(&text, &classifier).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_segments_cover_paragraph() {
        let classifier = DefaultClassifier::new();
        let text = StyledText::plain("  Hello there. General Kenobi!  You are a bold one.  ", WsId(1));
        let b = SegmentSplitter::boundaries(&text, &classifier).unwrap();
        assert_eq!(b.first().map(|s| s.begin), Some(0));
        assert_eq!(b.last().map(|s| s.end), Some(text.len()));
        for pair in b.windows(2) {
            assert_eq!(pair[0].end, pair[1].begin);
        }
    }

    struct CountingFactory(u64);

    impl SegmentFactory for CountingFactory {
        fn create_segment(&mut self, _boundary: SegmentBoundary) -> Result<AnnotationRef> {
            self.0 += 1;
            Ok(AnnotationRef::Real(crate::store::RealId(self.0)))
        }
    }

    #[test]
    fn test_materializing_sink_calls_factory_per_segment() {
        let classifier = DefaultClassifier::new();
        let text = StyledText::plain("cats run. dogs run.", WsId(1));
        let mut factory = CountingFactory(0);
        let mut sink = MaterializingSink::new(&mut factory);
        SegmentSplitter::new(&text, &classifier).run(&mut sink).unwrap();
        assert_eq!(sink.segments.len(), 2);
        assert_eq!(sink.segments[1].0, SegmentBoundary { begin: 10, end: 19, anchor: Some(18) });
        assert_eq!(factory.0, 2);
    }
}
