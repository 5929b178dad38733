// WHY: Multi-word spellings confirmed as single lexical units during the session
// Keyed by lowercased first word so the reconciler checks only phrases that could start at a word

use std::collections::HashMap;

use crate::text::WsId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub spelling: String,
    pub ws: WsId,
    units: usize,
}

impl Phrase {
    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units == 0
    }
}

#[derive(Debug, Default)]
pub struct PhraseRegistry {
    by_first_word: HashMap<(WsId, String), Vec<Phrase>>,
}

impl PhraseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a phrase under its lowercased first word; returns false if already known
    pub fn register(&mut self, spelling: &str, ws: WsId, first_word: &str) -> bool {
        let list = self.by_first_word.entry((ws, first_word.to_string())).or_default();
        if list.iter().any(|p| p.spelling == spelling) {
            return false;
        }
        list.push(Phrase { spelling: spelling.to_string(), ws, units: spelling.encode_utf16().count() });
        // Longest first so matching is greedy
        list.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.spelling.cmp(&b.spelling)));
        true
    }

    /// Known phrases starting with `first_word`, longest first
    pub fn candidates(&self, ws: WsId, first_word: &str) -> &[Phrase] {
        self.by_first_word
            .get(&(ws, first_word.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_first_word.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_first_word.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_first_word.clear();
    }
}
