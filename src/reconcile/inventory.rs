// WHY: Per-paragraph arenas of previously known annotations with a used-bitset
// Reuse lookups scan a cursor over the bitset instead of searching lists for sentinel entries

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::store::{AnalysisLink, AnnotationKind, ParagraphId, RealId, WordformId};
use crate::text::WsId;

/// Fixed-size bitset of consumed slots
#[derive(Debug, Clone, Default)]
pub struct UsedSet {
    words: Vec<u64>,
    len: usize,
}

impl UsedSet {
    pub fn new(len: usize) -> Self {
        Self { words: vec![0; len.div_ceil(64)], len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow by one clear bit
    pub fn push(&mut self) {
        self.len += 1;
        if self.words.len() * 64 < self.len {
            self.words.push(0);
        }
    }

    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] |= 1 << (index % 64);
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1 << (index % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// First clear bit at or after `from`
    pub fn first_clear_from(&self, from: usize) -> Option<usize> {
        (from..self.len).find(|&i| !self.contains(i))
    }
}

/// Slots of prior annotations plus which of them have been consumed
#[derive(Debug, Clone)]
pub struct SlotArena<T> {
    slots: Vec<T>,
    used: UsedSet,
    cursor: usize,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), used: UsedSet::default(), cursor: 0 }
    }
}

impl<T> SlotArena<T> {
    pub fn new(slots: Vec<T>) -> Self {
        let used = UsedSet::new(slots.len());
        Self { slots, used, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, slot: T) -> usize {
        self.slots.push(slot);
        self.used.push();
        self.slots.len() - 1
    }

    pub fn get(&self, index: usize) -> &T {
        &self.slots[index]
    }

    pub fn mark_used(&mut self, index: usize) {
        self.used.insert(index);
    }

    pub fn is_used(&self, index: usize) -> bool {
        self.used.contains(index)
    }

    /// Consume every slot at once
    pub fn mark_all_used(&mut self) {
        for i in 0..self.slots.len() {
            self.used.insert(i);
        }
        self.cursor = self.slots.len();
    }

    /// First unused slot in order
    pub fn first_unused(&mut self) -> Option<usize> {
        let next = self.used.first_clear_from(self.cursor);
        self.cursor = next.unwrap_or(self.slots.len());
        next
    }

    pub fn find_unused(&self, pred: impl Fn(&T) -> bool) -> Option<usize> {
        (0..self.slots.len()).find(|&i| !self.used.contains(i) && pred(&self.slots[i]))
    }

    pub fn unused(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots.iter().enumerate().filter(|(i, _)| !self.used.contains(*i))
    }

    pub fn unused_count(&self) -> usize {
        self.slots.len() - self.used.count()
    }

    /// Move every unused slot out, leaving the arena fully consumed
    pub fn drain_unused(&mut self) -> Vec<T>
    where
        T: Clone,
    {
        let out: Vec<T> = self.unused().map(|(_, s)| s.clone()).collect();
        self.mark_all_used();
        out
    }
}

/// Prior segment or punctuation annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanSlot {
    pub id: RealId,
    pub begin: usize,
    pub end: usize,
    pub paragraph: Option<ParagraphId>,
}

/// Prior word occurrence with its wordform spelling resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceSlot {
    pub id: RealId,
    pub begin: usize,
    pub end: usize,
    pub wordform: WordformId,
    pub analysis: Option<AnalysisLink>,
    pub spelling: String,
    pub ws: WsId,
}

impl OccurrenceSlot {
    pub fn has_confirmed_analysis(&self) -> bool {
        self.analysis.is_some_and(|a| a.class.is_nontrivial())
    }
}

/// Everything known about one paragraph before it is re-tokenized
#[derive(Debug, Default)]
pub struct ParagraphInventory {
    pub segments: SlotArena<SpanSlot>,
    pub punctuation: SlotArena<SpanSlot>,
    pub occurrences: SlotArena<OccurrenceSlot>,
    /// Lowercased first word of each occurrence's spelling → slot indices in offset order
    first_word: HashMap<String, Vec<usize>>,
    /// Offsets the new tokenization asks for exactly; slots there wait for that request
    claimed_segments: HashSet<(usize, usize)>,
    claimed_punctuation: HashSet<(usize, usize)>,
}

impl ParagraphInventory {
    pub fn new(segments: Vec<SpanSlot>, punctuation: Vec<SpanSlot>, occurrences: Vec<OccurrenceSlot>) -> Self {
        Self {
            segments: SlotArena::new(segments),
            punctuation: SlotArena::new(punctuation),
            occurrences: SlotArena::new(occurrences),
            ..Self::default()
        }
    }

    /// Hold back every slot whose offsets reappear among the new spans
    pub fn claim_exact(
        &mut self,
        segments: impl IntoIterator<Item = (usize, usize)>,
        punctuation: impl IntoIterator<Item = (usize, usize)>,
    ) {
        self.claimed_segments = segments.into_iter().collect();
        self.claimed_punctuation = punctuation.into_iter().collect();
    }

    /// Consume the first unused span slot of `kind` that no exact request is waiting for
    pub fn take_unclaimed(&mut self, kind: AnnotationKind) -> Option<SpanSlot> {
        let (arena, claimed) = match kind {
            AnnotationKind::Segment => (&mut self.segments, &self.claimed_segments),
            _ => (&mut self.punctuation, &self.claimed_punctuation),
        };
        let index = arena.find_unused(|s| !claimed.contains(&(s.begin, s.end)))?;
        arena.mark_used(index);
        Some(arena.get(index).clone())
    }

    /// Build the first-word index with `key` mapping a slot to its lowercased first word
    pub fn index_occurrences(&mut self, mut key: impl FnMut(&OccurrenceSlot) -> String) {
        self.first_word.clear();
        for i in 0..self.occurrences.len() {
            let k = key(self.occurrences.get(i));
            self.first_word.entry(k).or_default().push(i);
        }
        for list in self.first_word.values_mut() {
            list.sort_by_key(|&i| (self.occurrences.slots[i].begin, i));
        }
    }

    pub fn candidates(&self, lowered_first_word: &str) -> &[usize] {
        self.first_word.get(lowered_first_word).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Splits id lists so the comma-joined text of each batch stays within a budget
#[derive(Debug, Clone, Copy)]
pub struct IdListBatcher {
    budget: usize,
}

impl IdListBatcher {
    pub const SEPARATOR: char = ',';

    pub fn new(budget: usize) -> Self {
        Self { budget: budget.max(1) }
    }

    /// Batches break only between ids; an id longer than the budget forms its own batch
    pub fn batches<'a, T: fmt::Display>(&self, ids: &'a [T]) -> Vec<&'a [T]> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut joined = 0;
        for (i, id) in ids.iter().enumerate() {
            let width = id.to_string().len();
            if i > start && joined + 1 + width > self.budget {
                out.push(&ids[start..i]);
                start = i;
                joined = width;
            } else if i == start {
                joined = width;
            } else {
                joined += 1 + width;
            }
        }
        if start < ids.len() {
            out.push(&ids[start..]);
        }
        out
    }

    pub fn joined<T: fmt::Display>(ids: &[T]) -> String {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(&Self::SEPARATOR.to_string())
    }
}
