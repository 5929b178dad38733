// WHY: Lazy word scanning over styled text with label runs forced non-word-forming
// Restartable so the reconciler can jump past a multi-word phrase it has consumed

use crate::classify::CharClassifier;
use crate::text::{StyledText, WsId};

/// One word-forming substring of the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub begin: usize,
    pub end: usize,
    pub ws: WsId,
}

impl WordSpan {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Outcome of comparing two pieces of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanMatch {
    /// Identical code units
    Exact,
    /// Equal after lowercasing, same writing system
    CaseInsensitive,
    NoMatch,
}

impl SpanMatch {
    pub fn is_match(self) -> bool {
        self != SpanMatch::NoMatch
    }
}

/// Iterator of word spans within `[begin, end)` of a paragraph
pub struct WordScanner<'a> {
    text: &'a StyledText,
    classifier: &'a dyn CharClassifier,
    limit: usize,
    pos: usize,
}

impl<'a> WordScanner<'a> {
    /// Scan the whole text
    pub fn new(text: &'a StyledText, classifier: &'a dyn CharClassifier) -> Self {
        Self::over(text, classifier, 0, text.len())
    }

    /// Scan `[begin, end)` only
    pub fn over(text: &'a StyledText, classifier: &'a dyn CharClassifier, begin: usize, end: usize) -> Self {
        let limit = end.min(text.len());
        Self { text, classifier, limit, pos: begin.min(limit) }
    }

    /// Resume scanning at `pos`
    pub fn restart_at(&mut self, pos: usize) {
        self.pos = pos.min(self.limit);
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether the code point at `pos` forms words, and its width in code units
    pub fn word_forming_at(&self, pos: usize) -> (bool, usize) {
        let (ch, width) = self.text.code_point_at(pos);
        // WHY: chapter/verse numbers are labels, never words
        if self.text.is_label_run_at(pos) {
            return (false, width);
        }
        (self.classifier.is_word_forming(ch, self.text.ws_at(pos)), width)
    }

    pub fn is_white_at(&self, pos: usize) -> bool {
        self.classifier.is_white(self.text.code_point_at(pos).0)
    }

    pub fn text_of(&self, begin: usize, end: usize) -> String {
        self.text.slice(begin, end)
    }

    /// Compare two spans of the paragraph
    pub fn spans_equal(&self, a: (usize, usize), b: (usize, usize)) -> SpanMatch {
        let units = self.text.units();
        if units[a.0..a.1] == units[b.0..b.1] {
            return SpanMatch::Exact;
        }
        let (ws_a, ws_b) = (self.text.ws_at(a.0), self.text.ws_at(b.0));
        if ws_a != ws_b {
            return SpanMatch::NoMatch;
        }
        let lower_a = self.classifier.to_lower(&self.text.slice(a.0, a.1), ws_a);
        let lower_b = self.classifier.to_lower(&self.text.slice(b.0, b.1), ws_b);
        if lower_a == lower_b {
            SpanMatch::CaseInsensitive
        } else {
            SpanMatch::NoMatch
        }
    }

    /// Compare the text starting at `pos` with `target` (same writing system required for the fallback)
    pub fn matches_at(&self, pos: usize, target: &str, ws: WsId) -> SpanMatch {
        let target_units: Vec<u16> = target.encode_utf16().collect();
        let end = pos + target_units.len();
        if end > self.limit {
            return SpanMatch::NoMatch;
        }
        if self.text.units()[pos..end] == target_units[..] {
            return SpanMatch::Exact;
        }
        if self.text.ws_at(pos) != ws {
            return SpanMatch::NoMatch;
        }
        let here = self.classifier.to_lower(&self.text.slice(pos, end), ws);
        if here == self.classifier.to_lower(target, ws) {
            SpanMatch::CaseInsensitive
        } else {
            SpanMatch::NoMatch
        }
    }

    /// Whether a word could start at `pos` and end at `end` without splitting a longer word
    pub fn is_word_boundary(&self, begin: usize, end: usize) -> bool {
        let starts_clean = match self.text.code_point_before(begin) {
            Some((_, width)) if begin > 0 => !self.word_forming_at(begin - width).0,
            _ => true,
        };
        let ends_clean = end >= self.text.len() || !self.word_forming_at(end).0;
        starts_clean && ends_clean
    }

    /// Next exact occurrence of `target` as a whole word starting within `[from, to)`
    pub fn find_next(&self, target: &str, from: usize, to: usize) -> Option<usize> {
        let target_units: Vec<u16> = target.encode_utf16().collect();
        if target_units.is_empty() {
            return None;
        }
        let units = self.text.units();
        let to = to.min(self.text.len());
        let mut pos = from;
        while pos < to {
            let end = pos + target_units.len();
            if end <= units.len() && units[pos..end] == target_units[..] && self.is_word_boundary(pos, end) {
                return Some(pos);
            }
            pos += 1;
        }
        None
    }
}

impl<'a> Iterator for WordScanner<'a> {
    type Item = WordSpan;

    fn next(&mut self) -> Option<WordSpan> {
        while self.pos < self.limit {
            let (forming, width) = self.word_forming_at(self.pos);
            if forming {
                break;
            }
            self.pos += width;
        }
        if self.pos >= self.limit {
            return None;
        }
        let begin = self.pos;
        while self.pos < self.limit {
            let (forming, width) = self.word_forming_at(self.pos);
            if !forming {
                break;
            }
            self.pos += width;
        }
        Some(WordSpan { begin, end: self.pos, ws: self.text.ws_at(begin) })
    }
}
