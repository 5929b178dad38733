// WHY: Tokenize-and-reconcile pass mapping fresh tokens onto prior annotation identities
// Load, salvage, reconcile paragraph by paragraph, then clean up; reuse decisions consult the strictness policy

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::classify::CharClassifier;
use crate::config::{ParseOptions, ReconcilerConfig, StrictnessPolicy};
use crate::error::{EditStateMismatch, Error, MalformedReason, Result};
use crate::scanner::{MaterializingSink, SegmentBoundary, SegmentFactory, SegmentSplitter, SpanMatch, WordScanner, WordSpan};
use crate::store::{
    stored_range, to_stored, AnalysisClass, AnalysisLink, AnnotationBody, AnnotationKind, AnnotationRecord, AnnotationRef,
    AnnotationStore, DummyId, Duality, ParagraphId, RealId, StoredOccurrence, StoredSpan, WordformId, WordformInfo,
    WordformRegistry,
};
use crate::text::{Paragraph, StyledText, WsId};

use super::inventory::{IdListBatcher, OccurrenceSlot, ParagraphInventory, SlotArena, SpanSlot};
use super::phrase::Phrase;
use super::session::{Session, SessionState};

/// Result of one parse call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
    pub success: bool,
    /// False when there was nothing to parse
    pub did_parse: bool,
    /// Stopped at the match ceiling; paragraphs after the stop keep their old structure
    pub partial: bool,
    pub paragraphs: usize,
    pub matches: usize,
}

/// Dummies salvaged from the cached trees, recycled in walk order before any new dummy is allocated
#[derive(Debug, Default)]
struct DummyPools {
    segments: VecDeque<DummyId>,
    words: VecDeque<DummyId>,
    punctuation: VecDeque<DummyId>,
    sources: HashSet<ParagraphId>,
}

impl DummyPools {
    fn queue(&mut self, kind: AnnotationKind) -> &mut VecDeque<DummyId> {
        match kind {
            AnnotationKind::Segment => &mut self.segments,
            AnnotationKind::Word => &mut self.words,
            AnnotationKind::Punctuation => &mut self.punctuation,
        }
    }

    fn push(&mut self, kind: AnnotationKind, id: DummyId, paragraph: ParagraphId) {
        self.queue(kind).push_back(id);
        self.sources.insert(paragraph);
    }

    fn pop(&mut self, kind: AnnotationKind) -> Option<DummyId> {
        self.queue(kind).pop_front()
    }

    fn len(&self) -> usize {
        self.segments.len() + self.words.len() + self.punctuation.len()
    }

    fn drain(&mut self) -> Vec<DummyId> {
        self.segments.drain(..).chain(self.words.drain(..)).chain(self.punctuation.drain(..)).collect()
    }
}

/// Span annotations available beyond the paragraph being reconciled
#[derive(Debug, Default)]
struct ReusePools {
    orphan_segments: SlotArena<SpanSlot>,
    orphan_punctuation: SlotArena<SpanSlot>,
    leftover_segments: SlotArena<SpanSlot>,
    leftover_punctuation: SlotArena<SpanSlot>,
    dummies: DummyPools,
}

impl ReusePools {
    fn keep_leftovers(&mut self, inventory: &mut ParagraphInventory) {
        for slot in inventory.segments.drain_unused() {
            self.leftover_segments.push(slot);
        }
        for slot in inventory.punctuation.drain_unused() {
            self.leftover_punctuation.push(slot);
        }
    }

    /// Orphans first, then leftovers of earlier paragraphs
    fn take(&mut self, kind: AnnotationKind) -> Option<SpanSlot> {
        let tiers = match kind {
            AnnotationKind::Segment => [&mut self.orphan_segments, &mut self.leftover_segments],
            _ => [&mut self.orphan_punctuation, &mut self.leftover_punctuation],
        };
        for arena in tiers {
            if let Some(index) = arena.first_unused() {
                arena.mark_used(index);
                return Some(arena.get(index).clone());
            }
        }
        None
    }
}

/// Counts accepted occurrences and collects the ones a concordance query asked for
struct MatchCollector<'m> {
    matcher: Option<&'m dyn Fn(&WordformInfo) -> bool>,
    ceiling: Option<usize>,
    accepted: usize,
    hits: Vec<AnnotationRef>,
}

impl<'m> MatchCollector<'m> {
    fn new(matcher: Option<&'m dyn Fn(&WordformInfo) -> bool>, ceiling: Option<usize>) -> Self {
        Self { matcher, ceiling, accepted: 0, hits: Vec::new() }
    }

    fn wants_info(&self) -> bool {
        self.matcher.is_some() && !self.reached()
    }

    fn record(&mut self, id: AnnotationRef, info: Option<&WordformInfo>) {
        if self.reached() {
            return;
        }
        self.accepted += 1;
        if let (Some(matcher), Some(info)) = (self.matcher, info) {
            if matcher(info) {
                self.hits.push(id);
            }
        }
    }

    fn count(&self) -> usize {
        if self.matcher.is_some() {
            self.hits.len()
        } else {
            self.accepted
        }
    }

    fn reached(&self) -> bool {
        self.ceiling.is_some_and(|ceiling| self.count() >= ceiling)
    }
}

/// Prior-annotation rows before validation
#[derive(Default)]
struct LoadedRows {
    segments: Vec<StoredSpan>,
    punctuation: Vec<StoredSpan>,
    occurrences: Vec<StoredOccurrence>,
}

impl<'a, S: AnnotationStore, R: WordformRegistry> Session<'a, S, R> {
    /// Tokenize `paragraphs` and reconcile the result with what the store already holds
    pub fn parse(&mut self, paragraphs: &[Paragraph], options: &ParseOptions) -> Result<ParseOutcome> {
        self.run(paragraphs, options, None).map(|(outcome, _)| outcome)
    }

    /// Parse while collecting occurrences whose wordform satisfies `matcher`, stopping at `options.max_matches`
    pub fn concord(
        &mut self,
        paragraphs: &[Paragraph],
        options: &ParseOptions,
        matcher: &dyn Fn(&WordformInfo) -> bool,
    ) -> Result<Vec<AnnotationRef>> {
        self.run(paragraphs, options, Some(matcher)).map(|(_, hits)| hits)
    }

    fn run(
        &mut self,
        paragraphs: &[Paragraph],
        options: &ParseOptions,
        matcher: Option<&dyn Fn(&WordformInfo) -> bool>,
    ) -> Result<(ParseOutcome, Vec<AnnotationRef>)> {
        self.ensure_open()?;
        if paragraphs.is_empty() {
            debug!("Nothing to parse");
            return Ok((ParseOutcome { success: true, ..ParseOutcome::default() }, Vec::new()));
        }
        if options.suppress_sub_tasks {
            self.store.set_change_notifications(false);
        }
        let result = self.reconcile_all(paragraphs, options, matcher);
        if options.suppress_sub_tasks {
            self.store.set_change_notifications(true);
        }
        result
    }

    fn reconcile_all(
        &mut self,
        paragraphs: &[Paragraph],
        options: &ParseOptions,
        matcher: Option<&dyn Fn(&WordformInfo) -> bool>,
    ) -> Result<(ParseOutcome, Vec<AnnotationRef>)> {
        self.state.parsed_words.clear();
        let (mut inventories, mut pools) = self.load_inventories(paragraphs, options)?;
        pools.dummies = self.salvage_dummies(paragraphs);
        debug!(paragraphs = paragraphs.len(), salvaged = pools.dummies.len(), "Loaded prior annotations");

        let mut collector = MatchCollector::new(matcher, options.max_matches);
        let mut unused_occurrences: Vec<(ParagraphId, RealId)> = Vec::new();
        let mut processed = 0;
        for paragraph in paragraphs {
            let mut inventory = inventories.remove(&paragraph.id).unwrap_or_default();
            let segments = self.reconcile_paragraph(paragraph, &mut inventory, &mut pools, options, &mut collector)?;
            debug!(paragraph = %paragraph.id, segments = segments.len(), "Paragraph reconciled");
            self.store.set_paragraph_segments(paragraph.id, segments);
            pools.keep_leftovers(&mut inventory);
            let unused = inventory.occurrences.drain_unused();
            self.refresh_occurrence_cache(paragraph.id, &unused);
            unused_occurrences.extend(unused.into_iter().map(|s| (paragraph.id, s.id)));
            processed += 1;
            self.state.stats.paragraphs_parsed += 1;
            if collector.reached() {
                break;
            }
        }

        let partial = processed < paragraphs.len();
        if partial {
            info!(processed, total = paragraphs.len(), "Match ceiling reached, parse stopped early");
        }
        self.cleanup(&paragraphs[processed..], pools, unused_occurrences, partial)?;

        if options.guess_analyses && !partial {
            self.run_guess_phase()?;
        }

        info!(
            paragraphs = processed,
            words = self.state.parsed_words.len(),
            matches = collector.count(),
            "Parse complete"
        );
        let outcome = ParseOutcome { success: true, did_parse: true, partial, paragraphs: processed, matches: collector.count() };
        Ok((outcome, collector.hits))
    }

    fn reconcile_paragraph(
        &mut self,
        paragraph: &Paragraph,
        inventory: &mut ParagraphInventory,
        pools: &mut ReusePools,
        options: &ParseOptions,
        collector: &mut MatchCollector<'_>,
    ) -> Result<Vec<AnnotationRef>> {
        let Self { store, registry, classifier, state, config, .. } = self;
        let classifier: &dyn CharClassifier = &**classifier;
        if config.strictness == StrictnessPolicy::Heuristic {
            let (segments, punctuation) = expected_spans(&paragraph.text, classifier)?;
            inventory.claim_exact(segments, punctuation);
        }
        let mut worker = ParagraphWorker {
            store: &mut **store,
            registry: &mut **registry,
            classifier,
            state,
            config,
            options,
            paragraph,
            inventory,
            pools,
            collector,
        };
        let mut sink = MaterializingSink::new(&mut worker);
        SegmentSplitter::new(&paragraph.text, classifier).run(&mut sink)?;
        Ok(sink.segments.into_iter().map(|(_, id)| id).collect())
    }

    /// Prior annotations of every paragraph, from bulk queries or from the cached trees
    fn load_inventories(
        &mut self,
        paragraphs: &[Paragraph],
        options: &ParseOptions,
    ) -> Result<(HashMap<ParagraphId, ParagraphInventory>, ReusePools)> {
        let mut pools = ReusePools::default();
        let rows = if options.use_store_data {
            let ids: Vec<ParagraphId> = paragraphs.iter().map(|p| p.id).collect();
            let batcher = IdListBatcher::new(self.config.query_id_budget);
            let mut rows = LoadedRows::default();
            for batch in batcher.batches(&ids) {
                rows.segments.extend(self.store.load_spans(AnnotationKind::Segment, batch)?);
                rows.punctuation.extend(self.store.load_spans(AnnotationKind::Punctuation, batch)?);
                // Occurrences are queried once per session, then kept in step by `refresh_occurrence_cache`
                let fresh: Vec<ParagraphId> =
                    batch.iter().copied().filter(|p| !self.state.occurrence_cache.contains_key(p)).collect();
                if !fresh.is_empty() {
                    let loaded = self.store.load_occurrences(&fresh)?;
                    let cache = &mut self.state.occurrence_cache;
                    for paragraph in &fresh {
                        cache.entry(*paragraph).or_default();
                    }
                    for row in loaded {
                        if let Some(paragraph) = row.paragraph {
                            cache.entry(paragraph).or_default().push(row);
                        }
                    }
                }
            }
            for id in &ids {
                if let Some(cached) = self.state.occurrence_cache.get(id) {
                    rows.occurrences.extend(cached.iter().cloned());
                }
            }
            let mut malformed = Vec::new();
            for row in self.store.load_orphan_spans(AnnotationKind::Segment)? {
                if let Some(slot) = self.admit_span(&row, &mut malformed) {
                    pools.orphan_segments.push(slot);
                }
            }
            for row in self.store.load_orphan_spans(AnnotationKind::Punctuation)? {
                if let Some(slot) = self.admit_span(&row, &mut malformed) {
                    pools.orphan_punctuation.push(slot);
                }
            }
            self.reserve_malformed(&malformed);
            rows
        } else {
            self.rows_from_tree(paragraphs.iter().map(|p| p.id))
        };

        let mut malformed = Vec::new();
        let mut grouped: HashMap<ParagraphId, (Vec<SpanSlot>, Vec<SpanSlot>, Vec<OccurrenceSlot>)> = HashMap::new();
        for row in &rows.segments {
            if let (Some(p), Some(slot)) = (row.paragraph, self.admit_span(row, &mut malformed)) {
                grouped.entry(p).or_default().0.push(slot);
            }
        }
        for row in &rows.punctuation {
            if let (Some(p), Some(slot)) = (row.paragraph, self.admit_span(row, &mut malformed)) {
                grouped.entry(p).or_default().1.push(slot);
            }
        }
        for row in &rows.occurrences {
            if let (Some(p), Some(slot)) = (row.paragraph, self.admit_occurrence(row, &mut malformed)) {
                grouped.entry(p).or_default().2.push(slot);
            }
        }
        self.reserve_malformed(&malformed);

        let mut inventories = HashMap::with_capacity(grouped.len());
        let mut stale = Vec::new();
        for (paragraph, (mut segments, mut punctuation, mut occurrences)) in grouped {
            segments.sort_by_key(|s| (s.begin, s.id));
            punctuation.sort_by_key(|s| (s.begin, s.id));
            occurrences.sort_by_key(|s| (s.begin, s.id));
            if options.reset_occurrences_first {
                stale.extend(occurrences.drain(..).map(|s| s.id));
            }
            let classifier: &dyn CharClassifier = &*self.classifier;
            let state = &mut self.state;
            for slot in &occurrences {
                let key = state.first_word_key(classifier, &slot.spelling, slot.ws);
                if key.chars().count() < slot.spelling.chars().count() {
                    state.phrases.register(&slot.spelling, slot.ws, &key);
                }
            }
            let mut inventory = ParagraphInventory::new(segments, punctuation, occurrences);
            inventory.index_occurrences(|slot| state.first_word_key(classifier, &slot.spelling, slot.ws));
            inventories.insert(paragraph, inventory);
        }
        if !stale.is_empty() {
            let fresh = self.store.reserve(&stale);
            self.state.stats.reserved += fresh as u64;
            debug!(reserved = fresh, "Reset existing occurrences before matching");
        }
        Ok((inventories, pools))
    }

    /// Keep the session's copy of stored occurrences in step with what this parse wrote
    fn refresh_occurrence_cache(&mut self, paragraph: ParagraphId, unused: &[OccurrenceSlot]) {
        if !self.state.occurrence_cache.contains_key(&paragraph) {
            return;
        }
        let mut rows = self.rows_from_tree([paragraph]).occurrences;
        for slot in unused {
            let Some(record) = self.store.get(AnnotationRef::Real(slot.id)) else { continue };
            if let AnnotationBody::Word { wordform, analysis } = record.body {
                rows.push(StoredOccurrence {
                    id: slot.id,
                    begin: record.begin,
                    end: record.end,
                    paragraph: record.paragraph,
                    wordform,
                    analysis,
                });
            }
        }
        rows.sort_by_key(|r| (r.begin, r.id));
        self.state.occurrence_cache.insert(paragraph, rows);
    }

    /// Real annotations reachable from the cached paragraph trees
    fn rows_from_tree(&self, paragraphs: impl IntoIterator<Item = ParagraphId>) -> LoadedRows {
        let mut rows = LoadedRows::default();
        for paragraph in paragraphs {
            let owner = Some(paragraph);
            for segment in self.store.paragraph_segments(paragraph) {
                let Some(record) = self.store.get(segment) else { continue };
                if let AnnotationRef::Real(id) = segment {
                    rows.segments.push(StoredSpan { id, begin: record.begin, end: record.end, paragraph: owner });
                }
                for form in record.forms() {
                    let (AnnotationRef::Real(id), Some(child)) = (*form, self.store.get(*form)) else { continue };
                    match child.body {
                        AnnotationBody::Word { wordform, analysis } => rows.occurrences.push(StoredOccurrence {
                            id,
                            begin: child.begin,
                            end: child.end,
                            paragraph: owner,
                            wordform,
                            analysis,
                        }),
                        AnnotationBody::Punctuation { .. } => {
                            rows.punctuation.push(StoredSpan { id, begin: child.begin, end: child.end, paragraph: owner })
                        }
                        AnnotationBody::Segment(_) => {}
                    }
                }
            }
        }
        rows
    }

    fn admit_span(&mut self, row: &StoredSpan, malformed: &mut Vec<RealId>) -> Option<SpanSlot> {
        match stored_range(row.begin, row.end) {
            Some((begin, end)) => Some(SpanSlot { id: row.id, begin, end, paragraph: row.paragraph }),
            None => {
                self.note_malformed(row.id, MalformedReason::BadOffsets { begin: row.begin, end: row.end }, malformed);
                None
            }
        }
    }

    fn admit_occurrence(&mut self, row: &StoredOccurrence, malformed: &mut Vec<RealId>) -> Option<OccurrenceSlot> {
        let Some((begin, end)) = stored_range(row.begin, row.end) else {
            self.note_malformed(row.id, MalformedReason::BadOffsets { begin: row.begin, end: row.end }, malformed);
            return None;
        };
        if let Some(AnalysisLink { class: AnalysisClass::Unknown(class), .. }) = row.analysis {
            self.note_malformed(row.id, MalformedReason::UnknownAnalysisClass(class), malformed);
            return None;
        }
        let Some(info) = self.registry.info(row.wordform) else {
            self.note_malformed(row.id, MalformedReason::UnknownWordform, malformed);
            return None;
        };
        Some(OccurrenceSlot {
            id: row.id,
            begin,
            end,
            wordform: self.registry.resolve(row.wordform),
            analysis: row.analysis,
            spelling: info.spelling,
            ws: info.ws,
        })
    }

    fn note_malformed(&mut self, id: RealId, reason: MalformedReason, malformed: &mut Vec<RealId>) {
        let err = Error::MalformedAnnotation { id: AnnotationRef::Real(id), reason };
        warn!(error = %err, "Excluding annotation from matching");
        self.state.stats.malformed += 1;
        malformed.push(id);
    }

    fn reserve_malformed(&mut self, malformed: &[RealId]) {
        if !malformed.is_empty() {
            let fresh = self.store.reserve(malformed);
            self.state.stats.reserved += fresh as u64;
        }
    }

    /// Pull every dummy out of the current trees before anything is matched
    fn salvage_dummies(&self, paragraphs: &[Paragraph]) -> DummyPools {
        let mut pools = DummyPools::default();
        for paragraph in paragraphs {
            for segment in self.store.paragraph_segments(paragraph.id) {
                if let AnnotationRef::Dummy(id) = segment {
                    pools.push(AnnotationKind::Segment, id, paragraph.id);
                }
                let Some(record) = self.store.get(segment) else { continue };
                for form in record.forms() {
                    if let (AnnotationRef::Dummy(id), Some(child)) = (*form, self.store.get(*form)) {
                        pools.push(child.kind(), id, paragraph.id);
                    }
                }
            }
        }
        pools
    }

    fn cleanup(
        &mut self,
        unparsed: &[Paragraph],
        mut pools: ReusePools,
        unused_occurrences: Vec<(ParagraphId, RealId)>,
        partial: bool,
    ) -> Result<()> {
        if self.config.strictness == StrictnessPolicy::ExactOrFail {
            if let Some((paragraph, _)) = unused_occurrences.first() {
                let count = unused_occurrences.iter().filter(|(p, _)| p == paragraph).count();
                return Err(Error::InconsistentEditState(EditStateMismatch::Leftovers {
                    kind: AnnotationKind::Word,
                    paragraph: Some(*paragraph),
                    count,
                }));
            }
            for (kind, arena) in [
                (AnnotationKind::Segment, &pools.leftover_segments),
                (AnnotationKind::Punctuation, &pools.leftover_punctuation),
            ] {
                if let Some((_, slot)) = arena.unused().next() {
                    return Err(Error::InconsistentEditState(EditStateMismatch::Leftovers {
                        kind,
                        paragraph: slot.paragraph,
                        count: arena.unused_count(),
                    }));
                }
            }
        }

        if !unused_occurrences.is_empty() {
            let ids: Vec<RealId> = unused_occurrences.iter().map(|(_, id)| *id).collect();
            let fresh = self.store.reserve(&ids);
            self.state.stats.reserved += fresh as u64;
            debug!(reserved = fresh, "Reserved unmatched occurrences");
        }

        if !partial {
            let doomed: Vec<AnnotationRef> = pools
                .leftover_segments
                .unused()
                .chain(pools.leftover_punctuation.unused())
                .map(|(_, slot)| AnnotationRef::Real(slot.id))
                .collect();
            if !doomed.is_empty() {
                self.store.delete(&doomed)?;
                self.state.stats.deleted += doomed.len() as u64;
                debug!(deleted = doomed.len(), "Deleted unmatched segments and punctuation");
            }
        }

        // Trees of paragraphs the parse never reached may hold dummies that were recycled elsewhere
        for paragraph in unparsed.iter().filter(|p| pools.dummies.sources.contains(&p.id)) {
            self.store.set_paragraph_segments(paragraph.id, Vec::new());
            debug!(paragraph = %paragraph.id, "Dropped cached structure of unparsed paragraph");
        }

        let leftover = pools.dummies.drain();
        if !leftover.is_empty() {
            self.store.release_dummies(&leftover);
            self.state.stats.released += leftover.len() as u64;
        }
        Ok(())
    }
}

/// Segment and punctuation offsets a fresh tokenization of `text` asks for, phrases aside
fn expected_spans(text: &StyledText, classifier: &dyn CharClassifier) -> Result<(Vec<(usize, usize)>, Vec<(usize, usize)>)> {
    let boundaries = SegmentSplitter::boundaries(text, classifier)?;
    let mut punctuation = Vec::new();
    for boundary in &boundaries {
        let mut cursor = boundary.begin;
        for word in WordScanner::over(text, classifier, boundary.begin, boundary.end) {
            punctuation.extend(punctuation_runs(text, classifier, cursor, word.begin));
            cursor = word.end;
        }
        punctuation.extend(punctuation_runs(text, classifier, cursor, boundary.end));
    }
    Ok((boundaries.iter().map(|b| (b.begin, b.end)).collect(), punctuation))
}

/// Maximal non-white runs of `[begin, end)`; between words these are the punctuation forms
pub(crate) fn punctuation_runs(text: &StyledText, classifier: &dyn CharClassifier, begin: usize, end: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut pos = begin;
    while pos < end {
        let (ch, width) = text.code_point_at(pos);
        if classifier.is_white(ch) {
            pos += width;
            continue;
        }
        let start = pos;
        while pos < end {
            let (ch, width) = text.code_point_at(pos);
            if classifier.is_white(ch) {
                break;
            }
            pos += width;
        }
        runs.push((start, pos));
    }
    runs
}

/// Reconciles one paragraph; also the factory that turns segment boundaries into annotations
struct ParagraphWorker<'w, 'm, S: AnnotationStore, R: WordformRegistry> {
    store: &'w mut S,
    registry: &'w mut R,
    classifier: &'w dyn CharClassifier,
    state: &'w mut SessionState,
    config: &'w ReconcilerConfig,
    options: &'w ParseOptions,
    paragraph: &'w Paragraph,
    inventory: &'w mut ParagraphInventory,
    pools: &'w mut ReusePools,
    collector: &'w mut MatchCollector<'m>,
}

impl<S: AnnotationStore, R: WordformRegistry> SegmentFactory for ParagraphWorker<'_, '_, S, R> {
    fn create_segment(&mut self, boundary: SegmentBoundary) -> Result<AnnotationRef> {
        let segment = self.place_segment(boundary)?;
        let forms = self.tokenize(boundary)?;
        self.store.set_segment_forms(segment, forms)?;
        Ok(segment)
    }
}

impl<S: AnnotationStore, R: WordformRegistry> ParagraphWorker<'_, '_, S, R> {
    fn strict(&self) -> bool {
        self.config.strictness == StrictnessPolicy::ExactOrFail
    }

    /// Prior span annotation for `[begin, end)`, by reuse tier
    fn take_span(&mut self, kind: AnnotationKind, begin: usize, end: usize) -> Result<Option<SpanSlot>> {
        let strict = self.strict();
        let local = match kind {
            AnnotationKind::Segment => &mut self.inventory.segments,
            _ => &mut self.inventory.punctuation,
        };
        if let Some(index) = local.find_unused(|s| s.begin == begin && s.end == end) {
            local.mark_used(index);
            return Ok(Some(local.get(index).clone()));
        }
        if strict {
            // An unused slot before this point can never be matched any more
            if local.find_unused(|s| s.begin < begin).is_some() {
                return Err(Error::InconsistentEditState(EditStateMismatch::NoExactCandidate {
                    kind,
                    expected: (begin, end),
                }));
            }
            return Ok(None);
        }
        if let Some(slot) = self.inventory.take_unclaimed(kind) {
            return Ok(Some(slot));
        }
        Ok(self.pools.take(kind))
    }

    /// New annotation, recycling a salvaged dummy of the same kind when one is left
    fn create(&mut self, kind: AnnotationKind, record: AnnotationRecord, duality: Duality) -> Result<AnnotationRef> {
        let Some(dummy) = self.pools.dummies.pop(kind) else {
            return Ok(self.store.create(record, duality));
        };
        let id = AnnotationRef::Dummy(dummy);
        self.store.clear_cached_info(id);
        self.store.update(id, record)?;
        self.state.stats.dummies_recycled += 1;
        if duality == Duality::Real {
            let real = self.store.promote(dummy)?;
            self.state.stats.promoted += 1;
            return Ok(AnnotationRef::Real(real));
        }
        Ok(id)
    }

    fn place_segment(&mut self, boundary: SegmentBoundary) -> Result<AnnotationRef> {
        let paragraph = self.paragraph.id;
        if let Some(slot) = self.take_span(AnnotationKind::Segment, boundary.begin, boundary.end)? {
            let id = AnnotationRef::Real(slot.id);
            let mut record = self
                .store
                .get(id)
                .cloned()
                .ok_or_else(|| Error::store(format!("segment {id} disappeared during parse")))?;
            record.paragraph = Some(paragraph);
            record.begin = to_stored(boundary.begin);
            record.end = to_stored(boundary.end);
            if let AnnotationBody::Segment(body) = &mut record.body {
                body.anchor = boundary.anchor.map(to_stored);
            }
            self.store.update(id, record)?;
            self.state.stats.segments_reused += 1;
            return Ok(id);
        }
        let record = AnnotationRecord::segment(paragraph, boundary.begin, boundary.end, boundary.anchor);
        let id = self.create(AnnotationKind::Segment, record, Duality::from_flag(self.options.create_real_segments))?;
        self.state.stats.segments_created += 1;
        Ok(id)
    }

    /// Forms of one segment: word occurrences and punctuation runs in text order
    fn tokenize(&mut self, boundary: SegmentBoundary) -> Result<Vec<AnnotationRef>> {
        let paragraph = self.paragraph;
        let mut scanner = WordScanner::over(&paragraph.text, self.classifier, boundary.begin, boundary.end);
        let mut forms = Vec::new();
        let mut cursor = boundary.begin;
        let mut sentence_initial = true;
        while let Some(word) = scanner.next() {
            if word.begin > cursor {
                self.place_punctuation_runs(cursor, word.begin, &mut forms)?;
            }
            let (id, end) = self.reconcile_word(&scanner, word, sentence_initial)?;
            forms.push(id);
            sentence_initial = false;
            if end > word.end {
                scanner.restart_at(end);
            }
            cursor = end;
        }
        if cursor < boundary.end {
            self.place_punctuation_runs(cursor, boundary.end, &mut forms)?;
        }
        Ok(forms)
    }

    fn place_punctuation_runs(&mut self, begin: usize, end: usize, forms: &mut Vec<AnnotationRef>) -> Result<()> {
        let paragraph = self.paragraph;
        for (start, stop) in punctuation_runs(&paragraph.text, self.classifier, begin, end) {
            forms.push(self.place_punctuation(start, stop)?);
        }
        Ok(())
    }

    fn place_punctuation(&mut self, begin: usize, end: usize) -> Result<AnnotationRef> {
        let record = AnnotationRecord::punctuation(self.paragraph.id, begin, end, self.paragraph.text.slice(begin, end));
        if let Some(slot) = self.take_span(AnnotationKind::Punctuation, begin, end)? {
            let id = AnnotationRef::Real(slot.id);
            self.store.update(id, record)?;
            self.state.stats.punctuation_reused += 1;
            return Ok(id);
        }
        let id = self.create(AnnotationKind::Punctuation, record, Duality::from_flag(self.options.create_real_segments))?;
        self.state.stats.punctuation_created += 1;
        Ok(id)
    }

    /// Occurrence for the word at `word`, and where the consumed text ends
    fn reconcile_word(&mut self, scanner: &WordScanner<'_>, word: WordSpan, sentence_initial: bool) -> Result<(AnnotationRef, usize)> {
        let spelling = self.paragraph.text.slice(word.begin, word.end);
        let key = self.state.lowercase.lower(self.classifier, &spelling, word.ws);

        if !self.options.reset_occurrences_first {
            if let Some((index, end)) = self.select_candidate(scanner, &key, word, sentence_initial)? {
                let id = self.relink(index, word.begin, end)?;
                return Ok((id, end));
            }
        }

        if let Some(phrase) = self.match_phrase(scanner, &key, word, sentence_initial) {
            let end = word.begin + phrase.len();
            let text = self.paragraph.text.slice(word.begin, end);
            let id = self.create_occurrence(word.begin, end, &text, word.ws, sentence_initial)?;
            self.state.stats.phrases_matched += 1;
            return Ok((id, end));
        }

        let id = self.create_occurrence(word.begin, word.end, &spelling, word.ws, sentence_initial)?;
        Ok((id, word.end))
    }

    /// Pick the prior occurrence this word should keep: exact offset, else the closest plausible one
    fn select_candidate(
        &mut self,
        scanner: &WordScanner<'_>,
        key: &str,
        word: WordSpan,
        sentence_initial: bool,
    ) -> Result<Option<(usize, usize)>> {
        let target = word.begin;
        let mut before: Option<(usize, usize, usize)> = None;
        let mut after: Option<(usize, usize, usize)> = None;
        for &index in self.inventory.candidates(key) {
            if self.inventory.occurrences.is_used(index) {
                continue;
            }
            let slot = self.inventory.occurrences.get(index);
            if slot.ws != word.ws {
                continue;
            }
            let fits = match scanner.matches_at(target, &slot.spelling, slot.ws) {
                SpanMatch::Exact => true,
                SpanMatch::CaseInsensitive => sentence_initial,
                SpanMatch::NoMatch => false,
            };
            let end = target + slot.spelling.encode_utf16().count();
            if !fits || !scanner.is_word_boundary(target, end) {
                continue;
            }
            if slot.begin == target {
                return Ok(Some((index, end)));
            }
            if slot.begin < target {
                let distance = target - slot.begin;
                if before.map_or(true, |(_, _, d)| distance < d) {
                    before = Some((index, end, distance));
                }
            } else {
                let distance = slot.begin - target;
                if after.map_or(true, |(_, _, d)| distance < d) {
                    after = Some((index, end, distance));
                }
            }
        }

        let drift = self.config.drift_threshold;
        let Some((index, end, _)) = [before, after]
            .into_iter()
            .flatten()
            .find(|&(index, _, distance)| distance <= drift && !self.closer_occurrence_between(scanner, index, target))
        else {
            return Ok(None);
        };

        if self.strict() {
            let slot = self.inventory.occurrences.get(index);
            return Err(Error::InconsistentEditState(EditStateMismatch::Offsets {
                kind: AnnotationKind::Word,
                id: AnnotationRef::Real(slot.id),
                expected: (target, end),
                actual: (to_stored(slot.begin), to_stored(slot.end)),
            }));
        }
        Ok(Some((index, end)))
    }

    /// Whether the text has another occurrence of the candidate's spelling between it and `target`
    fn closer_occurrence_between(&self, scanner: &WordScanner<'_>, index: usize, target: usize) -> bool {
        let slot = self.inventory.occurrences.get(index);
        let (mut from, to) = if slot.begin < target { (slot.begin, target) } else { (target + 1, slot.begin + 1) };
        while let Some(found) = scanner.find_next(&slot.spelling, from, to) {
            if found != target {
                return true;
            }
            from = found + 1;
        }
        false
    }

    fn relink(&mut self, index: usize, begin: usize, end: usize) -> Result<AnnotationRef> {
        self.inventory.occurrences.mark_used(index);
        let slot = self.inventory.occurrences.get(index).clone();
        let mut wordform = self.registry.resolve(slot.wordform);
        if self.options.create_real_wordforms && wordform.is_dummy() {
            wordform = self.realize_wordform(wordform)?;
        }
        let id = AnnotationRef::Real(slot.id);
        self.store.update(id, AnnotationRecord::word(self.paragraph.id, begin, end, wordform, slot.analysis))?;
        self.state.stats.words_reused += 1;
        self.accept(id, wordform);
        Ok(id)
    }

    /// Longest known phrase starting at `word` that stays inside the segment and the analysis fence
    fn match_phrase(&mut self, scanner: &WordScanner<'_>, key: &str, word: WordSpan, sentence_initial: bool) -> Option<Phrase> {
        let candidates = self.state.phrases.candidates(word.ws, key);
        if candidates.is_empty() {
            return None;
        }
        // Never swallow an unmatched occurrence whose analysis the user confirmed
        let fence = self
            .inventory
            .occurrences
            .unused()
            .filter(|(_, slot)| slot.begin > word.begin && slot.has_confirmed_analysis())
            .map(|(_, slot)| slot.begin)
            .min();
        candidates
            .iter()
            .find(|phrase| {
                let end = word.begin + phrase.len();
                if end <= word.end || end > scanner.limit() || fence.is_some_and(|f| end > f) {
                    return false;
                }
                let fits = match scanner.matches_at(word.begin, &phrase.spelling, phrase.ws) {
                    SpanMatch::Exact => true,
                    SpanMatch::CaseInsensitive => sentence_initial,
                    SpanMatch::NoMatch => false,
                };
                fits && scanner.is_word_boundary(word.begin, end)
            })
            .cloned()
    }

    fn create_occurrence(&mut self, begin: usize, end: usize, spelling: &str, ws: WsId, sentence_initial: bool) -> Result<AnnotationRef> {
        let lookup: String = spelling.chars().take(self.config.max_field_length).collect();
        let duality = Duality::from_flag(self.options.create_real_wordforms);
        let known = self.registry.find(&lookup, ws);
        let wordform = self.registry.find_or_create(&lookup, ws, duality);
        if let Some(previous) = known.filter(|&k| k != wordform) {
            self.store.relink_wordform(previous, wordform);
        }
        if sentence_initial {
            let lower = self.state.lowercase.lower(self.classifier, &lookup, ws);
            if lower != lookup {
                if let Some(lowercase) = self.registry.find(&lower, ws) {
                    self.registry.add_case_variant(wordform, lowercase);
                }
            }
        }
        let record = AnnotationRecord::word(self.paragraph.id, begin, end, wordform, None);
        let id = self.create(AnnotationKind::Word, record, duality)?;
        self.state.stats.words_created += 1;
        self.accept(id, wordform);
        Ok(id)
    }

    /// Convert a dummy wordform and move every stored occurrence of it along
    fn realize_wordform(&mut self, wordform: WordformId) -> Result<WordformId> {
        let real = self.registry.convert_to_real(wordform)?;
        if real != wordform {
            self.store.relink_wordform(wordform, real);
        }
        Ok(real)
    }

    fn accept(&mut self, id: AnnotationRef, wordform: WordformId) {
        self.state.touched_wordforms.insert(wordform);
        if self.options.collect_occurrences {
            self.state.occurrences.entry(wordform).or_default().push(id);
        }
        self.state.parsed_words.push((id, wordform));
        let info = if self.collector.wants_info() { self.registry.info(wordform) } else { None };
        self.collector.record(id, info.as_ref());
    }
}
