// WHY: Serializable snapshot of the reconciled structure, for the binary's JSON output and for inspection in tests

use serde::Serialize;

use crate::reconcile::{ParseOutcome, SessionStats};
use crate::store::{
    AnnotationBody, AnnotationKind, AnnotationRef, AnnotationStore, LexEntryId, ParagraphId, StoreCounters, WordformRegistry,
};
use crate::text::Paragraph;

/// One word or punctuation form
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FormReport {
    pub id: AnnotationRef,
    pub kind: AnnotationKind,
    pub begin: i32,
    pub end: i32,
    /// Text covered in the paragraph
    pub text: String,
    /// Wordform spelling for word occurrences
    pub wordform: Option<String>,
    pub real: bool,
    pub guess: Option<LexEntryId>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub id: AnnotationRef,
    pub begin: i32,
    pub end: i32,
    pub anchor: Option<i32>,
    pub real: bool,
    pub forms: Vec<FormReport>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ParagraphReport {
    pub id: ParagraphId,
    pub text: String,
    pub segments: Vec<SegmentReport>,
}

/// Everything one parse produced
#[derive(Serialize, Debug, Clone)]
pub struct ParseReport {
    /// Source file or label
    pub source: String,
    pub outcome: ParseOutcome,
    pub stats: SessionStats,
    pub store: Option<StoreCounters>,
    pub paragraphs: Vec<ParagraphReport>,
}

impl ParseReport {
    /// Read the current structure of `paragraphs` back out of the store
    pub fn collect<S: AnnotationStore, R: WordformRegistry>(
        source: impl Into<String>,
        outcome: ParseOutcome,
        stats: SessionStats,
        store: &S,
        registry: &R,
        paragraphs: &[Paragraph],
    ) -> Self {
        let paragraphs = paragraphs.iter().map(|p| paragraph_report(store, registry, p)).collect();
        Self { source: source.into(), outcome, stats, store: None, paragraphs }
    }

    pub fn with_counters(mut self, counters: StoreCounters) -> Self {
        self.store = Some(counters);
        self
    }

    pub fn segment_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.segments.len()).sum()
    }

    /// Ids of every segment and form, in document order
    pub fn identities(&self) -> Vec<AnnotationRef> {
        self.paragraphs
            .iter()
            .flat_map(|p| p.segments.iter())
            .flat_map(|s| std::iter::once(s.id).chain(s.forms.iter().map(|f| f.id)))
            .collect()
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

fn paragraph_report<S: AnnotationStore, R: WordformRegistry>(store: &S, registry: &R, paragraph: &Paragraph) -> ParagraphReport {
    let mut segments = Vec::new();
    for id in store.paragraph_segments(paragraph.id) {
        let Some(record) = store.get(id) else { continue };
        let anchor = match &record.body {
            AnnotationBody::Segment(body) => body.anchor,
            _ => None,
        };
        let forms = record
            .forms()
            .iter()
            .filter_map(|form| {
                let child = store.get(*form)?;
                let text = child.range().map(|(b, e)| paragraph.text.slice(b, e)).unwrap_or_default();
                Some(FormReport {
                    id: *form,
                    kind: child.kind(),
                    begin: child.begin,
                    end: child.end,
                    text,
                    wordform: child.wordform().and_then(|w| registry.info(w)).map(|i| i.spelling),
                    real: !form.is_dummy(),
                    guess: store.guess(*form).map(|g| g.entry),
                })
            })
            .collect();
        segments.push(SegmentReport { id, begin: record.begin, end: record.end, anchor, real: !id.is_dummy(), forms });
    }
    ParagraphReport { id: paragraph.id, text: paragraph.text.to_text(), segments }
}
