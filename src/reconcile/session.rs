// WHY: Explicit parse session replacing process-wide reconciler state
// One active session per store instance, released on end() or drop

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

use crate::classify::{CharClassifier, DefaultClassifier, LowercaseCache};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::store::{AnnotationRef, AnnotationStore, Lexicon, ParagraphId, StoredOccurrence, WordformId, WordformRegistry};
use crate::text::WsId;

use super::phrase::PhraseRegistry;

static ACTIVE_STORES: OnceLock<Mutex<HashSet<u64>>> = OnceLock::new();

fn active_stores() -> &'static Mutex<HashSet<u64>> {
    ACTIVE_STORES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on a store instance for the lifetime of a session
#[derive(Debug)]
struct StoreLease {
    instance: u64,
}

impl StoreLease {
    fn acquire(instance: u64) -> Result<Self> {
        let mut active = active_stores().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(instance) {
            return Err(Error::SessionBusy(instance));
        }
        Ok(Self { instance })
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        let mut active = active_stores().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.instance);
    }
}

/// Counts of what the session did to annotation identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub paragraphs_parsed: u64,
    pub segments_created: u64,
    pub segments_reused: u64,
    pub punctuation_created: u64,
    pub punctuation_reused: u64,
    pub words_created: u64,
    pub words_reused: u64,
    pub phrases_matched: u64,
    pub dummies_recycled: u64,
    pub promoted: u64,
    pub reserved: u64,
    pub deleted: u64,
    pub released: u64,
    pub malformed: u64,
    pub guesses_attached: u64,
}

/// Mutable bookkeeping that lives as long as the session
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) touched_wordforms: HashSet<WordformId>,
    pub(crate) occurrences: HashMap<WordformId, Vec<AnnotationRef>>,
    pub(crate) phrases: PhraseRegistry,
    pub(crate) lowercase: LowercaseCache,
    pub(crate) stats: SessionStats,
    /// Occurrences reconciled by the current parse, for the guess phase
    pub(crate) parsed_words: Vec<(AnnotationRef, WordformId)>,
    /// Stored occurrences per paragraph, bulk-loaded once and refreshed after each reconcile
    pub(crate) occurrence_cache: HashMap<ParagraphId, Vec<StoredOccurrence>>,
}

impl SessionState {
    /// Lowercased leading word of `spelling`
    pub(crate) fn first_word_key(&mut self, classifier: &dyn CharClassifier, spelling: &str, ws: WsId) -> String {
        let first: String = spelling.chars().take_while(|c| classifier.is_word_forming(*c, ws)).collect();
        self.lowercase.lower(classifier, &first, ws)
    }
}

/// A reconciliation session against one store and wordform registry
pub struct Session<'a, S: AnnotationStore, R: WordformRegistry> {
    pub(crate) store: &'a mut S,
    pub(crate) registry: &'a mut R,
    pub(crate) lexicon: Option<&'a dyn Lexicon>,
    pub(crate) classifier: Box<dyn CharClassifier + 'a>,
    pub(crate) config: ReconcilerConfig,
    pub(crate) state: SessionState,
    lease: Option<StoreLease>,
}

impl<'a, S: AnnotationStore, R: WordformRegistry> Session<'a, S, R> {
    /// Start a session with the default classifier and configuration
    pub fn acquire(store: &'a mut S, registry: &'a mut R) -> Result<Self> {
        Self::with_config(store, registry, ReconcilerConfig::default())
    }

    pub fn with_config(store: &'a mut S, registry: &'a mut R, config: ReconcilerConfig) -> Result<Self> {
        let lease = StoreLease::acquire(store.instance())?;
        info!(instance = store.instance(), strictness = ?config.strictness, "Parse session started");
        Ok(Self {
            store,
            registry,
            lexicon: None,
            classifier: Box::new(DefaultClassifier::new()),
            config,
            state: SessionState::default(),
            lease: Some(lease),
        })
    }

    /// Replace the character classification service
    pub fn with_classifier(mut self, classifier: impl CharClassifier + 'a) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Lexicon consulted by the deferred guess phase
    pub fn with_lexicon(mut self, lexicon: &'a dyn Lexicon) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    pub fn is_open(&self) -> bool {
        self.lease.is_some()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.lease.is_none() {
            return Err(Error::UseAfterDispose);
        }
        Ok(())
    }

    /// Release the store; every later call fails with `UseAfterDispose`
    pub fn end(&mut self) {
        if let Some(lease) = self.lease.take() {
            debug!(instance = lease.instance, "Parse session ended");
        }
    }

    // Inspectors below stay readable after `end()` so callers can report on a finished session

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.state.stats
    }

    pub fn store(&self) -> &S {
        self.store
    }

    pub fn registry(&self) -> &R {
        self.registry
    }

    /// Wordforms touched by any parse in this session
    pub fn touched_wordforms(&self) -> Result<&HashSet<WordformId>> {
        self.ensure_open()?;
        Ok(&self.state.touched_wordforms)
    }

    /// Occurrences collected for `wordform` (requires `collect_occurrences`)
    pub fn occurrences_of(&self, wordform: WordformId) -> Result<&[AnnotationRef]> {
        self.ensure_open()?;
        let wordform = self.registry.resolve(wordform);
        Ok(self.state.occurrences.get(&wordform).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Declare a multi-word spelling as one lexical unit for the rest of the session
    pub fn register_phrase(&mut self, spelling: &str, ws: WsId) -> Result<bool> {
        self.ensure_open()?;
        let key = self.state.first_word_key(self.classifier.as_ref(), spelling, ws);
        if key.chars().count() == spelling.chars().count() {
            return Err(Error::invalid_input(format!("'{spelling}' is a single word, not a phrase")));
        }
        Ok(self.state.phrases.register(spelling, ws, &key))
    }

    pub fn phrase_count(&self) -> usize {
        self.state.phrases.len()
    }
}

impl<S: AnnotationStore, R: WordformRegistry> Drop for Session<'_, S, R> {
    fn drop(&mut self) {
        self.end();
    }
}
