// WHY: Contracts for the external collaborators the engine consumes
// The annotation store, wordform registry and lexicon are traits; `memory` provides reference implementations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::text::WsId;

pub mod memory;

pub use memory::{MemoryLexicon, MemoryRegistry, MemoryStore, StoreCounters};

/// Stable paragraph identity
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParagraphId(pub u64);

/// Identity of a persisted annotation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RealId(pub u64);

/// Index of a session-local placeholder in the store's dummy arena
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DummyId(pub u32);

/// Lexicon entry identity
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LexEntryId(pub u64);

impl fmt::Display for ParagraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an annotation object: either a session-local dummy or a persisted real object
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnnotationRef {
    Dummy(DummyId),
    Real(RealId),
}

impl AnnotationRef {
    pub fn is_dummy(&self) -> bool {
        matches!(self, AnnotationRef::Dummy(_))
    }

    pub fn real(&self) -> Option<RealId> {
        match self {
            AnnotationRef::Real(id) => Some(*id),
            AnnotationRef::Dummy(_) => None,
        }
    }

    pub fn dummy(&self) -> Option<DummyId> {
        match self {
            AnnotationRef::Dummy(id) => Some(*id),
            AnnotationRef::Real(_) => None,
        }
    }
}

impl fmt::Display for AnnotationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationRef::Dummy(id) => write!(f, "dummy#{}", id.0),
            AnnotationRef::Real(id) => write!(f, "#{}", id.0),
        }
    }
}

/// Canonical wordform identity, dummy until persisted
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WordformId {
    Dummy(u32),
    Real(u64),
}

impl WordformId {
    pub fn is_dummy(&self) -> bool {
        matches!(self, WordformId::Dummy(_))
    }
}

/// Whether a new object should be persisted
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Duality {
    Dummy,
    Real,
}

impl Duality {
    pub fn from_flag(real: bool) -> Self {
        if real {
            Duality::Real
        } else {
            Duality::Dummy
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnnotationKind {
    Segment,
    Word,
    Punctuation,
}

/// Class of the object a word occurrence is an instance of
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisClass {
    /// Plain wordform; carries no confirmed analysis
    Wordform,
    Analysis,
    Gloss,
    /// A class id the engine does not know
    Unknown(u32),
}

impl AnalysisClass {
    /// Whether the link records a user-confirmed analysis
    pub fn is_nontrivial(&self) -> bool {
        matches!(self, AnalysisClass::Analysis | AnalysisClass::Gloss)
    }
}

/// Link from an occurrence to a richer analysis object (opaque to the engine)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisLink {
    pub class: AnalysisClass,
    pub id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentBody {
    pub anchor: Option<i32>,
    pub forms: Vec<AnnotationRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationBody {
    Segment(SegmentBody),
    Word { wordform: WordformId, analysis: Option<AnalysisLink> },
    Punctuation { text: String },
}

/// Annotation object as the store holds it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Owning paragraph; `None` marks an orphan
    pub paragraph: Option<ParagraphId>,
    pub begin: i32,
    pub end: i32,
    pub body: AnnotationBody,
}

impl AnnotationRecord {
    pub fn kind(&self) -> AnnotationKind {
        match self.body {
            AnnotationBody::Segment(_) => AnnotationKind::Segment,
            AnnotationBody::Word { .. } => AnnotationKind::Word,
            AnnotationBody::Punctuation { .. } => AnnotationKind::Punctuation,
        }
    }

    pub fn segment(paragraph: ParagraphId, begin: usize, end: usize, anchor: Option<usize>) -> Self {
        Self {
            paragraph: Some(paragraph),
            begin: to_stored(begin),
            end: to_stored(end),
            body: AnnotationBody::Segment(SegmentBody { anchor: anchor.map(to_stored), forms: Vec::new() }),
        }
    }

    pub fn word(paragraph: ParagraphId, begin: usize, end: usize, wordform: WordformId, analysis: Option<AnalysisLink>) -> Self {
        Self {
            paragraph: Some(paragraph),
            begin: to_stored(begin),
            end: to_stored(end),
            body: AnnotationBody::Word { wordform, analysis },
        }
    }

    pub fn punctuation(paragraph: ParagraphId, begin: usize, end: usize, text: String) -> Self {
        Self {
            paragraph: Some(paragraph),
            begin: to_stored(begin),
            end: to_stored(end),
            body: AnnotationBody::Punctuation { text },
        }
    }

    pub fn forms(&self) -> &[AnnotationRef] {
        match &self.body {
            AnnotationBody::Segment(seg) => &seg.forms,
            _ => &[],
        }
    }

    pub fn wordform(&self) -> Option<WordformId> {
        match self.body {
            AnnotationBody::Word { wordform, .. } => Some(wordform),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<AnalysisLink> {
        match self.body {
            AnnotationBody::Word { analysis, .. } => analysis,
            _ => None,
        }
    }

    /// Offsets as unsigned, if valid
    pub fn range(&self) -> Option<(usize, usize)> {
        stored_range(self.begin, self.end)
    }
}

/// Store-side offset representation
pub fn to_stored(offset: usize) -> i32 {
    i32::try_from(offset).unwrap_or(i32::MAX)
}

/// Valid unsigned range from stored offsets
pub fn stored_range(begin: i32, end: i32) -> Option<(usize, usize)> {
    let b = usize::try_from(begin).ok()?;
    let e = usize::try_from(end).ok()?;
    (b <= e).then_some((b, e))
}

/// Bulk-load row for segment and punctuation annotations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSpan {
    pub id: RealId,
    pub begin: i32,
    pub end: i32,
    pub paragraph: Option<ParagraphId>,
}

/// Bulk-load row for word occurrences, joined with wordform and analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredOccurrence {
    pub id: RealId,
    pub begin: i32,
    pub end: i32,
    pub paragraph: Option<ParagraphId>,
    pub wordform: WordformId,
    pub analysis: Option<AnalysisLink>,
}

/// Best-guess analysis attached by the deferred guess phase
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessedAnalysis {
    pub entry: LexEntryId,
    pub wordform: WordformId,
}

/// Wordform data the registry can report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordformInfo {
    pub spelling: String,
    pub ws: WsId,
}

/// Lexicon entry whose citation form matches a spelling
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexiconMatch {
    pub form: String,
    pub ws: WsId,
    pub entry: LexEntryId,
}

/// Persistent/cached graph of annotation objects
pub trait AnnotationStore {
    /// Identity of the backing store; sessions are exclusive per instance
    fn instance(&self) -> u64;

    /// Segment or punctuation rows owned by any of `paragraphs`
    fn load_spans(&self, kind: AnnotationKind, paragraphs: &[ParagraphId]) -> Result<Vec<StoredSpan>>;

    /// Segment or punctuation rows with no owning paragraph
    fn load_orphan_spans(&self, kind: AnnotationKind) -> Result<Vec<StoredSpan>>;

    /// Word occurrence rows owned by any of `paragraphs`
    fn load_occurrences(&self, paragraphs: &[ParagraphId]) -> Result<Vec<StoredOccurrence>>;

    fn get(&self, id: AnnotationRef) -> Option<&AnnotationRecord>;

    fn create(&mut self, record: AnnotationRecord, duality: Duality) -> AnnotationRef;

    /// Replace the record behind an existing identity; a reserved object becomes live again
    fn update(&mut self, id: AnnotationRef, record: AnnotationRecord) -> Result<()>;

    /// Persist a dummy under a new real identity, rewriting references to it
    fn promote(&mut self, id: DummyId) -> Result<RealId>;

    /// Mark as reusable without deleting; returns how many were not reserved already
    fn reserve(&mut self, ids: &[RealId]) -> usize;

    fn is_reserved(&self, id: RealId) -> bool;

    fn delete(&mut self, ids: &[AnnotationRef]) -> Result<()>;

    /// Give dummy arena slots back to the allocator
    fn release_dummies(&mut self, ids: &[DummyId]);

    /// Drop side-cached state before an identity takes on a new role
    fn clear_cached_info(&mut self, id: AnnotationRef);

    fn paragraph_segments(&self, paragraph: ParagraphId) -> Vec<AnnotationRef>;

    fn set_paragraph_segments(&mut self, paragraph: ParagraphId, segments: Vec<AnnotationRef>);

    fn set_guess(&mut self, id: AnnotationRef, guess: GuessedAnalysis);

    fn guess(&self, id: AnnotationRef) -> Option<&GuessedAnalysis>;

    /// Suppress or restore change notifications for sub-changes
    fn set_change_notifications(&mut self, _enabled: bool) {}

    /// Point every word occurrence of `from` at `to` once the wordform changed identity; returns how many moved
    fn relink_wordform(&mut self, from: WordformId, to: WordformId) -> usize;

    fn set_segment_forms(&mut self, segment: AnnotationRef, forms: Vec<AnnotationRef>) -> Result<()> {
        let mut record = self
            .get(segment)
            .cloned()
            .ok_or_else(|| crate::Error::store(format!("segment {segment} not found")))?;
        match &mut record.body {
            AnnotationBody::Segment(body) => body.forms = forms,
            _ => return Err(crate::Error::store(format!("{segment} is not a segment"))),
        }
        self.update(segment, record)
    }
}

/// Find-or-create canonical wordforms
pub trait WordformRegistry {
    fn find(&self, spelling: &str, ws: WsId) -> Option<WordformId>;

    /// Existing wordform for the spelling, or a new one; asking for `Real` converts an existing dummy
    fn find_or_create(&mut self, spelling: &str, ws: WsId, duality: Duality) -> WordformId;

    /// Current identity of `id`, following a dummy that was converted to real
    fn resolve(&self, id: WordformId) -> WordformId {
        id
    }

    fn is_dummy(&self, id: WordformId) -> bool {
        self.resolve(id).is_dummy()
    }

    fn convert_to_real(&mut self, id: WordformId) -> Result<WordformId>;

    fn info(&self, id: WordformId) -> Option<WordformInfo>;

    /// Link a sentence-initial wordform to its lowercased form
    fn add_case_variant(&mut self, wordform: WordformId, lowercase: WordformId);

    fn case_variant(&self, wordform: WordformId) -> Option<WordformId>;

    /// Number of user-confirmed analyses of the wordform
    fn confirmed_analysis_count(&self, id: WordformId) -> usize;
}

/// Lexicon lookups for best-guess analyses
pub trait Lexicon {
    /// Entries whose form exactly matches any of `forms`, in one query
    fn entries_for_forms(&self, forms: &[(String, WsId)]) -> Result<Vec<LexiconMatch>>;
}
