// WHY: Character classification is a service so writing systems can override the Unicode defaults
// The scanners never consult char properties directly

use std::collections::{HashMap, HashSet};
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::text::WsId;

/// Classification of code points for word scanning and segmentation
pub trait CharClassifier {
    /// Whether `ch` can be part of a word in writing system `ws`
    fn is_word_forming(&self, ch: char, ws: WsId) -> bool;

    /// Whether `ch` separates tokens
    fn is_white(&self, ch: char) -> bool {
        is_space_separator(ch) || ch == '\t'
    }

    /// Locale-aware lowercasing
    fn to_lower(&self, text: &str, ws: WsId) -> String;
}

/// Unicode general category Zs
pub fn is_space_separator(ch: char) -> bool {
    matches!(get_general_category(ch), GeneralCategory::SpaceSeparator)
}

/// Unicode general category M: nonspacing, spacing and enclosing marks
pub fn is_combining_mark(ch: char) -> bool {
    matches!(
        get_general_category(ch),
        GeneralCategory::NonspacingMark | GeneralCategory::SpacingMark | GeneralCategory::EnclosingMark
    )
}

/// Unicode general category Nd
pub fn is_decimal_digit(ch: char) -> bool {
    matches!(get_general_category(ch), GeneralCategory::DecimalNumber)
}

/// Default rule: letters, combining marks and digits form words
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    /// Extra word-forming characters per writing system (e.g. apostrophe as glottal stop)
    extra_word_forming: HashMap<WsId, HashSet<char>>,
    /// Writing systems that use Turkic dotted/dotless i casing
    turkic: HashSet<WsId>,
}

impl DefaultClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `ch` as word-forming in `ws`
    pub fn with_word_forming(mut self, ws: WsId, ch: char) -> Self {
        self.extra_word_forming.entry(ws).or_default().insert(ch);
        self
    }

    /// Lowercase `ws` with Turkic rules (I → ı, İ → i)
    pub fn with_turkic_casing(mut self, ws: WsId) -> Self {
        self.turkic.insert(ws);
        self
    }
}

impl CharClassifier for DefaultClassifier {
    fn is_word_forming(&self, ch: char, ws: WsId) -> bool {
        if ch.is_alphabetic() || is_decimal_digit(ch) || is_combining_mark(ch) {
            return true;
        }
        self.extra_word_forming.get(&ws).is_some_and(|set| set.contains(&ch))
    }

    fn to_lower(&self, text: &str, ws: WsId) -> String {
        if self.turkic.contains(&ws) {
            let mut out = String::with_capacity(text.len());
            for ch in text.chars() {
                match ch {
                    'I' => out.push('ı'),
                    '\u{0130}' => out.push('i'),
                    _ => out.extend(ch.to_lowercase()),
                }
            }
            return out;
        }
        text.to_lowercase()
    }
}

/// Memoized lowercasing keyed by string value and writing system
#[derive(Debug, Default)]
pub struct LowercaseCache {
    entries: HashMap<(WsId, String), String>,
    hits: u64,
}

impl LowercaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lower(&mut self, classifier: &dyn CharClassifier, text: &str, ws: WsId) -> String {
        if let Some(hit) = self.entries.get(&(ws, text.to_string())) {
            self.hits += 1;
            return hit.clone();
        }
        let lowered = classifier.to_lower(text, ws);
        self.entries.insert((ws, text.to_string()), lowered.clone());
        lowered
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
