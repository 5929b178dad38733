// WHY: Form lists for a span of one paragraph, for callers assembling phrases or selections
// Preview mode never writes; update-real mode reconciles first and hands back persisted identities

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::classify::CharClassifier;
use crate::config::ParseOptions;
use crate::error::{Error, Result};
use crate::scanner::WordScanner;
use crate::store::{AnnotationBody, AnnotationKind, AnnotationRef, AnnotationStore, ParagraphId, WordformRegistry};
use crate::text::{Paragraph, WsId};

use super::engine::punctuation_runs;
use super::session::Session;

/// One form covering part of the requested span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FormRef {
    /// Annotation already in the paragraph's structure
    Existing(AnnotationRef),
    /// Token a parse would create here
    Proposed { kind: AnnotationKind, begin: usize, end: usize, text: String },
}

impl FormRef {
    pub fn annotation(&self) -> Option<AnnotationRef> {
        match self {
            FormRef::Existing(id) => Some(*id),
            FormRef::Proposed { .. } => None,
        }
    }
}

/// A form already in the cached structure, as seen by a preview
struct StoredForm {
    id: AnnotationRef,
    kind: AnnotationKind,
    end: usize,
    /// Lowercased wordform spelling, or the punctuation text
    text: Option<String>,
}

impl StoredForm {
    fn matches(&self, kind: AnnotationKind, here: &str, classifier: &dyn CharClassifier, ws: WsId) -> bool {
        match (&self.text, kind) {
            (Some(stored), AnnotationKind::Word) => *stored == classifier.to_lower(here, ws),
            (Some(stored), _) => stored == here,
            (None, _) => false,
        }
    }
}

impl<'a, S: AnnotationStore, R: WordformRegistry> Session<'a, S, R> {
    /// Forms covering `[begin, end)` of `paragraph`.
    ///
    /// With `update_real` unset nothing is written and forms the structure lacks come back as
    /// [`FormRef::Proposed`]. With it set the paragraph is reconciled and every form in the span,
    /// together with its segment, is promoted to a real annotation.
    pub fn collect_segment_forms(
        &mut self,
        paragraph: &Paragraph,
        begin: usize,
        end: usize,
        update_real: bool,
    ) -> Result<Vec<FormRef>> {
        self.ensure_open()?;
        if begin > end || end > paragraph.text.len() {
            return Err(Error::invalid_input(format!(
                "span [{begin}, {end}) outside paragraph of length {}",
                paragraph.text.len()
            )));
        }
        if begin == end {
            return Ok(Vec::new());
        }
        if update_real {
            return self.persist_forms(paragraph, begin, end);
        }
        Ok(self.preview_forms(paragraph, begin, end))
    }

    /// Word and punctuation forms of the cached structure keyed by begin offset
    fn existing_forms(&self, paragraph: ParagraphId) -> HashMap<usize, StoredForm> {
        let mut forms = HashMap::new();
        for segment in self.store.paragraph_segments(paragraph) {
            let Some(record) = self.store.get(segment) else { continue };
            for form in record.forms() {
                let Some(child) = self.store.get(*form) else { continue };
                let Some((b, e)) = child.range() else { continue };
                let text = match &child.body {
                    AnnotationBody::Word { wordform, .. } => self
                        .registry
                        .info(*wordform)
                        .map(|info| self.classifier.to_lower(&info.spelling, info.ws)),
                    AnnotationBody::Punctuation { text } => Some(text.clone()),
                    AnnotationBody::Segment(_) => None,
                };
                forms.insert(b, StoredForm { id: *form, kind: child.kind(), end: e, text });
            }
        }
        forms
    }

    fn preview_forms(&self, paragraph: &Paragraph, begin: usize, end: usize) -> Vec<FormRef> {
        let existing = self.existing_forms(paragraph.id);
        let text = &paragraph.text;
        let classifier = &*self.classifier;
        // Same offsets and kind, and the stored spelling still matches the text ignoring case
        let lookup = |kind: AnnotationKind, b: usize, e: usize| {
            let here = text.slice(b, e);
            match existing.get(&b) {
                Some(form) if form.kind == kind && form.end == e && form.matches(kind, &here, classifier, text.ws_at(b)) => {
                    FormRef::Existing(form.id)
                }
                _ => FormRef::Proposed { kind, begin: b, end: e, text: here },
            }
        };

        let mut out = Vec::new();
        let mut scanner = WordScanner::over(text, classifier, begin, end);
        let mut cursor = begin;
        while let Some(word) = scanner.next() {
            for (b, e) in punctuation_runs(text, classifier, cursor, word.begin) {
                out.push(lookup(AnnotationKind::Punctuation, b, e));
            }
            // A stored phrase may cover more than the scanned word
            let phrase = existing.get(&word.begin).filter(|form| {
                form.kind == AnnotationKind::Word
                    && form.end > word.end
                    && form.end <= end
                    && form.matches(AnnotationKind::Word, &text.slice(word.begin, form.end), classifier, word.ws)
            });
            match phrase {
                Some(form) => {
                    out.push(FormRef::Existing(form.id));
                    scanner.restart_at(form.end);
                    cursor = form.end;
                }
                None => {
                    out.push(lookup(AnnotationKind::Word, word.begin, word.end));
                    cursor = word.end;
                }
            }
        }
        for (b, e) in punctuation_runs(text, classifier, cursor, end) {
            out.push(lookup(AnnotationKind::Punctuation, b, e));
        }
        out
    }

    fn persist_forms(&mut self, paragraph: &Paragraph, begin: usize, end: usize) -> Result<Vec<FormRef>> {
        self.parse(std::slice::from_ref(paragraph), &ParseOptions::default())?;
        let mut out = Vec::new();
        for segment in self.store.paragraph_segments(paragraph.id) {
            let Some((seg_begin, seg_end)) = self.store.get(segment).and_then(|r| r.range()) else { continue };
            if seg_end <= begin || seg_begin >= end {
                continue;
            }
            let segment = self.make_real(segment)?;
            let forms = self.store.get(segment).map(|r| r.forms().to_vec()).unwrap_or_default();
            for form in forms {
                let Some((b, e)) = self.store.get(form).and_then(|r| r.range()) else { continue };
                if b >= begin && e <= end {
                    out.push(FormRef::Existing(self.make_real(form)?));
                }
            }
        }
        // Promotion gave occurrences new identities; the next parse reloads them
        self.state.occurrence_cache.remove(&paragraph.id);
        debug!(paragraph = %paragraph.id, forms = out.len(), "Collected real forms");
        Ok(out)
    }

    /// Promote a dummy, converting a dummy wordform it points at first
    fn make_real(&mut self, id: AnnotationRef) -> Result<AnnotationRef> {
        let AnnotationRef::Dummy(dummy) = id else { return Ok(id) };
        let mut record = self.store.get(id).cloned().ok_or_else(|| Error::store(format!("{id} not found")))?;
        if let AnnotationBody::Word { wordform, .. } = &mut record.body {
            if self.registry.is_dummy(*wordform) {
                let dummy = *wordform;
                *wordform = self.registry.convert_to_real(dummy)?;
                self.store.relink_wordform(dummy, *wordform);
                self.store.update(id, record)?;
            }
        }
        let real = self.store.promote(dummy)?;
        self.state.stats.promoted += 1;
        Ok(AnnotationRef::Real(real))
    }
}
