// WHY: In-memory reference implementations of the store, registry and lexicon
// Used by the binary, the tests and the benchmarks; counters make reconciliation side effects observable

use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{
    AnnotationBody, AnnotationKind, AnnotationRecord, AnnotationRef, AnnotationStore, DummyId, Duality,
    GuessedAnalysis, LexEntryId, Lexicon, LexiconMatch, ParagraphId, RealId, StoredOccurrence, StoredSpan,
    WordformId, WordformInfo, WordformRegistry,
};
use crate::error::{Error, Result};
use crate::text::WsId;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Side effects performed against a `MemoryStore`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounters {
    pub created_real: u64,
    pub created_dummy: u64,
    pub updated: u64,
    pub promoted: u64,
    pub reserved: u64,
    pub deleted: u64,
    pub released: u64,
    pub notifications: u64,
}

impl StoreCounters {
    /// Creates, deletes and reserves; zero for an idempotent pass
    pub fn structural_changes(&self) -> u64 {
        self.created_real + self.created_dummy + self.deleted + self.reserved
    }
}

/// Annotation store held entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    instance: u64,
    next_real: u64,
    real: BTreeMap<RealId, AnnotationRecord>,
    dummies: Vec<Option<AnnotationRecord>>,
    free_dummies: Vec<DummyId>,
    reserved: HashSet<RealId>,
    paragraphs: HashMap<ParagraphId, Vec<AnnotationRef>>,
    guesses: HashMap<AnnotationRef, GuessedAnalysis>,
    notifications_enabled: bool,
    counters: StoreCounters,
    query_sizes: RefCell<Vec<usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::attach(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    /// A handle reporting an explicit instance id, as a second connection to the same database would
    pub fn attach(instance: u64) -> Self {
        Self {
            instance,
            next_real: 1,
            real: BTreeMap::new(),
            dummies: Vec::new(),
            free_dummies: Vec::new(),
            reserved: HashSet::new(),
            paragraphs: HashMap::new(),
            guesses: HashMap::new(),
            notifications_enabled: true,
            counters: StoreCounters::default(),
            query_sizes: RefCell::new(Vec::new()),
        }
    }

    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = StoreCounters::default();
        self.query_sizes.borrow_mut().clear();
    }

    /// Number of paragraph ids passed to each bulk query, in order
    pub fn query_sizes(&self) -> Vec<usize> {
        self.query_sizes.borrow().clone()
    }

    fn record_query(&self, paragraphs: usize) {
        self.query_sizes.borrow_mut().push(paragraphs);
    }

    /// Insert a persisted record directly, bypassing the engine (seeding, fixtures)
    pub fn insert_real(&mut self, record: AnnotationRecord) -> RealId {
        let id = RealId(self.next_real);
        self.next_real += 1;
        self.real.insert(id, record);
        id
    }

    pub fn live_dummy_count(&self) -> usize {
        self.dummies.iter().filter(|d| d.is_some()).count()
    }

    pub fn real_count(&self, kind: AnnotationKind) -> usize {
        self.real.values().filter(|r| r.kind() == kind).count()
    }

    pub fn reserved_ids(&self) -> Vec<RealId> {
        let mut ids: Vec<_> = self.reserved.iter().copied().collect();
        ids.sort();
        ids
    }

    fn notify(&mut self) {
        if self.notifications_enabled {
            self.counters.notifications += 1;
        }
    }

    fn record_mut(&mut self, id: AnnotationRef) -> Option<&mut AnnotationRecord> {
        match id {
            AnnotationRef::Real(r) => self.real.get_mut(&r),
            AnnotationRef::Dummy(d) => self.dummies.get_mut(d.0 as usize).and_then(Option::as_mut),
        }
    }

    fn spans_where(&self, kind: AnnotationKind, keep: impl Fn(Option<ParagraphId>) -> bool) -> Vec<StoredSpan> {
        let mut rows: Vec<StoredSpan> = self
            .real
            .iter()
            .filter(|(_, r)| r.kind() == kind && keep(r.paragraph))
            .map(|(id, r)| StoredSpan { id: *id, begin: r.begin, end: r.end, paragraph: r.paragraph })
            .collect();
        rows.sort_by_key(|r| (r.paragraph, r.begin, r.id));
        rows
    }

    fn replace_refs(&mut self, from: AnnotationRef, to: AnnotationRef) {
        for segments in self.paragraphs.values_mut() {
            for seg in segments.iter_mut().filter(|s| **s == from) {
                *seg = to;
            }
        }
        let swap = |record: &mut AnnotationRecord| {
            if let AnnotationBody::Segment(body) = &mut record.body {
                for form in body.forms.iter_mut().filter(|f| **f == from) {
                    *form = to;
                }
            }
        };
        self.real.values_mut().for_each(swap);
        self.dummies.iter_mut().flatten().for_each(swap);
    }
}

impl AnnotationStore for MemoryStore {
    fn instance(&self) -> u64 {
        self.instance
    }

    fn load_spans(&self, kind: AnnotationKind, paragraphs: &[ParagraphId]) -> Result<Vec<StoredSpan>> {
        self.record_query(paragraphs.len());
        let wanted: HashSet<_> = paragraphs.iter().copied().collect();
        Ok(self.spans_where(kind, |p| p.is_some_and(|p| wanted.contains(&p))))
    }

    fn load_orphan_spans(&self, kind: AnnotationKind) -> Result<Vec<StoredSpan>> {
        Ok(self.spans_where(kind, |p| p.is_none()))
    }

    fn load_occurrences(&self, paragraphs: &[ParagraphId]) -> Result<Vec<StoredOccurrence>> {
        self.record_query(paragraphs.len());
        let wanted: HashSet<_> = paragraphs.iter().copied().collect();
        let mut rows: Vec<StoredOccurrence> = self
            .real
            .iter()
            .filter(|(_, r)| r.paragraph.is_some_and(|p| wanted.contains(&p)))
            .filter_map(|(id, r)| match r.body {
                AnnotationBody::Word { wordform, analysis } => Some(StoredOccurrence {
                    id: *id,
                    begin: r.begin,
                    end: r.end,
                    paragraph: r.paragraph,
                    wordform,
                    analysis,
                }),
                _ => None,
            })
            .collect();
        rows.sort_by_key(|r| (r.paragraph, r.begin, r.id));
        Ok(rows)
    }

    fn get(&self, id: AnnotationRef) -> Option<&AnnotationRecord> {
        match id {
            AnnotationRef::Real(r) => self.real.get(&r),
            AnnotationRef::Dummy(d) => self.dummies.get(d.0 as usize).and_then(Option::as_ref),
        }
    }

    fn create(&mut self, record: AnnotationRecord, duality: Duality) -> AnnotationRef {
        self.notify();
        match duality {
            Duality::Real => {
                self.counters.created_real += 1;
                AnnotationRef::Real(self.insert_real(record))
            }
            Duality::Dummy => {
                self.counters.created_dummy += 1;
                if let Some(slot) = self.free_dummies.pop() {
                    self.dummies[slot.0 as usize] = Some(record);
                    return AnnotationRef::Dummy(slot);
                }
                let slot = DummyId(self.dummies.len() as u32);
                self.dummies.push(Some(record));
                AnnotationRef::Dummy(slot)
            }
        }
    }

    fn update(&mut self, id: AnnotationRef, record: AnnotationRecord) -> Result<()> {
        let slot = self.record_mut(id).ok_or_else(|| Error::store(format!("annotation {id} not found")))?;
        if *slot != record {
            *slot = record;
            self.counters.updated += 1;
            self.notify();
        }
        if let AnnotationRef::Real(r) = id {
            self.reserved.remove(&r);
        }
        Ok(())
    }

    fn promote(&mut self, id: DummyId) -> Result<RealId> {
        let record = self
            .dummies
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| Error::store(format!("dummy {} not found", id.0)))?;
        self.free_dummies.push(id);
        let real = self.insert_real(record);
        self.replace_refs(AnnotationRef::Dummy(id), AnnotationRef::Real(real));
        if let Some(guess) = self.guesses.remove(&AnnotationRef::Dummy(id)) {
            self.guesses.insert(AnnotationRef::Real(real), guess);
        }
        self.counters.promoted += 1;
        self.notify();
        debug!("Promoted dummy {} to real {}", id.0, real.0);
        Ok(real)
    }

    fn reserve(&mut self, ids: &[RealId]) -> usize {
        let mut fresh = 0;
        for id in ids {
            if self.real.contains_key(id) && self.reserved.insert(*id) {
                fresh += 1;
            }
        }
        self.counters.reserved += fresh as u64;
        fresh
    }

    fn is_reserved(&self, id: RealId) -> bool {
        self.reserved.contains(&id)
    }

    fn delete(&mut self, ids: &[AnnotationRef]) -> Result<()> {
        for id in ids {
            match id {
                AnnotationRef::Real(r) => {
                    if self.real.remove(r).is_none() {
                        return Err(Error::store(format!("cannot delete missing annotation {r}")));
                    }
                    self.reserved.remove(r);
                }
                AnnotationRef::Dummy(d) => {
                    if let Some(slot) = self.dummies.get_mut(d.0 as usize) {
                        if slot.take().is_some() {
                            self.free_dummies.push(*d);
                        }
                    }
                }
            }
            self.guesses.remove(id);
            self.counters.deleted += 1;
            self.notify();
        }
        Ok(())
    }

    fn release_dummies(&mut self, ids: &[DummyId]) {
        for id in ids {
            if let Some(slot) = self.dummies.get_mut(id.0 as usize) {
                if slot.take().is_some() {
                    self.free_dummies.push(*id);
                    self.counters.released += 1;
                }
            }
            self.guesses.remove(&AnnotationRef::Dummy(*id));
        }
    }

    fn clear_cached_info(&mut self, id: AnnotationRef) {
        self.guesses.remove(&id);
    }

    fn paragraph_segments(&self, paragraph: ParagraphId) -> Vec<AnnotationRef> {
        self.paragraphs.get(&paragraph).cloned().unwrap_or_default()
    }

    fn set_paragraph_segments(&mut self, paragraph: ParagraphId, segments: Vec<AnnotationRef>) {
        let changed = self.paragraphs.get(&paragraph) != Some(&segments);
        self.paragraphs.insert(paragraph, segments);
        if changed {
            self.notify();
        }
    }

    fn set_guess(&mut self, id: AnnotationRef, guess: GuessedAnalysis) {
        self.guesses.insert(id, guess);
    }

    fn guess(&self, id: AnnotationRef) -> Option<&GuessedAnalysis> {
        self.guesses.get(&id)
    }

    fn set_change_notifications(&mut self, enabled: bool) {
        self.notifications_enabled = enabled;
    }

    fn relink_wordform(&mut self, from: WordformId, to: WordformId) -> usize {
        let mut moved = 0;
        let mut swap = |record: &mut AnnotationRecord| {
            if let AnnotationBody::Word { wordform, .. } = &mut record.body {
                if *wordform == from {
                    *wordform = to;
                    moved += 1;
                }
            }
        };
        self.real.values_mut().for_each(&mut swap);
        self.dummies.iter_mut().flatten().for_each(&mut swap);
        if moved > 0 {
            debug!(?from, ?to, moved, "Relinked occurrences to converted wordform");
        }
        moved
    }
}

/// Wordform registry kept in memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    by_spelling: HashMap<(WsId, String), WordformId>,
    info: HashMap<WordformId, WordformInfo>,
    case_variants: HashMap<WordformId, WordformId>,
    confirmed: HashMap<WordformId, usize>,
    /// Dummy ids that were converted, so stale references still resolve
    converted: HashMap<WordformId, WordformId>,
    next_dummy: u32,
    next_real: u64,
    created: u64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self { next_real: 1, ..Self::default() }
    }

    /// Record a user-confirmed analysis for the wordform
    pub fn confirm_analysis(&mut self, id: WordformId) {
        *self.confirmed.entry(self.resolve(id)).or_insert(0) += 1;
    }

    /// Wordforms created since construction
    pub fn created_count(&self) -> u64 {
        self.created
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn spellings(&self) -> Vec<String> {
        let mut all: Vec<_> = self.info.values().map(|i| i.spelling.clone()).collect();
        all.sort();
        all
    }

    fn rekey(&mut self, from: WordformId, to: WordformId) {
        if let Some(info) = self.info.remove(&from) {
            self.by_spelling.insert((info.ws, info.spelling.clone()), to);
            self.info.insert(to, info);
        }
        if let Some(lower) = self.case_variants.remove(&from) {
            self.case_variants.insert(to, lower);
        }
        for target in self.case_variants.values_mut().filter(|v| **v == from) {
            *target = to;
        }
        if let Some(count) = self.confirmed.remove(&from) {
            self.confirmed.insert(to, count);
        }
        self.converted.insert(from, to);
    }
}

impl WordformRegistry for MemoryRegistry {
    fn find(&self, spelling: &str, ws: WsId) -> Option<WordformId> {
        self.by_spelling.get(&(ws, spelling.to_string())).copied()
    }

    fn find_or_create(&mut self, spelling: &str, ws: WsId, duality: Duality) -> WordformId {
        if let Some(existing) = self.find(spelling, ws) {
            if duality == Duality::Real && existing.is_dummy() {
                return self.convert_to_real(existing).unwrap_or(existing);
            }
            return existing;
        }
        let id = match duality {
            Duality::Real => {
                self.next_real += 1;
                WordformId::Real(self.next_real - 1)
            }
            Duality::Dummy => {
                self.next_dummy += 1;
                WordformId::Dummy(self.next_dummy - 1)
            }
        };
        self.by_spelling.insert((ws, spelling.to_string()), id);
        self.info.insert(id, WordformInfo { spelling: spelling.to_string(), ws });
        self.created += 1;
        id
    }

    fn resolve(&self, id: WordformId) -> WordformId {
        self.converted.get(&id).copied().unwrap_or(id)
    }

    fn convert_to_real(&mut self, id: WordformId) -> Result<WordformId> {
        let id = self.resolve(id);
        match id {
            WordformId::Real(_) => Ok(id),
            WordformId::Dummy(_) => {
                if !self.info.contains_key(&id) {
                    return Err(Error::store(format!("unknown wordform {id:?}")));
                }
                let real = WordformId::Real(self.next_real);
                self.next_real += 1;
                self.rekey(id, real);
                Ok(real)
            }
        }
    }

    fn info(&self, id: WordformId) -> Option<WordformInfo> {
        self.info.get(&self.resolve(id)).cloned()
    }

    fn add_case_variant(&mut self, wordform: WordformId, lowercase: WordformId) {
        self.case_variants.insert(self.resolve(wordform), self.resolve(lowercase));
    }

    fn case_variant(&self, wordform: WordformId) -> Option<WordformId> {
        self.case_variants.get(&self.resolve(wordform)).copied()
    }

    fn confirmed_analysis_count(&self, id: WordformId) -> usize {
        self.confirmed.get(&self.resolve(id)).copied().unwrap_or(0)
    }
}

/// Lexicon of citation forms held in memory
#[derive(Debug, Default)]
pub struct MemoryLexicon {
    entries: HashMap<(WsId, String), Vec<LexEntryId>>,
    next: u64,
    queries: std::cell::Cell<u64>,
}

impl MemoryLexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, form: &str, ws: WsId) -> LexEntryId {
        self.next += 1;
        let id = LexEntryId(self.next);
        self.entries.entry((ws, form.to_string())).or_default().push(id);
        id
    }

    pub fn query_count(&self) -> u64 {
        self.queries.get()
    }
}

impl Lexicon for MemoryLexicon {
    fn entries_for_forms(&self, forms: &[(String, WsId)]) -> Result<Vec<LexiconMatch>> {
        self.queries.set(self.queries.get() + 1);
        let mut matches = Vec::new();
        for (form, ws) in forms {
            if let Some(ids) = self.entries.get(&(*ws, form.clone())) {
                matches.extend(ids.iter().map(|entry| LexiconMatch { form: form.clone(), ws: *ws, entry: *entry }));
            }
        }
        Ok(matches)
    }
}
