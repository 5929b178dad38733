// WHY: Deferred best-guess analyses, looked up for the whole parse in a single lexicon query

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::store::{AnnotationRef, AnnotationStore, GuessedAnalysis, LexEntryId, WordformId, WordformRegistry};
use crate::text::WsId;

use super::session::Session;

struct PendingGuess {
    id: AnnotationRef,
    wordform: WordformId,
    /// Own spelling first, then the lowercase case variant if any
    keys: Vec<(String, WsId)>,
}

impl<'a, S: AnnotationStore, R: WordformRegistry> Session<'a, S, R> {
    /// Attach guesses to occurrences of the last parse that have no analysis of their own.
    /// Wordforms with any user-confirmed analysis are left alone.
    pub(crate) fn run_guess_phase(&mut self) -> Result<usize> {
        let Some(lexicon) = self.lexicon else {
            debug!("No lexicon attached, skipping guesses");
            return Ok(0);
        };

        let mut pending = Vec::new();
        let mut forms: Vec<(String, WsId)> = Vec::new();
        let mut seen: HashSet<(String, WsId)> = HashSet::new();
        for &(id, parsed_wordform) in &self.state.parsed_words {
            let Some(record) = self.store.get(id) else { continue };
            if record.analysis().is_some_and(|a| a.class.is_nontrivial()) {
                continue;
            }
            let wordform = record.wordform().unwrap_or(parsed_wordform);
            if self.registry.confirmed_analysis_count(wordform) > 0 {
                continue;
            }
            let mut keys = Vec::with_capacity(2);
            if let Some(info) = self.registry.info(wordform) {
                keys.push((info.spelling, info.ws));
            }
            if let Some(info) = self.registry.case_variant(wordform).and_then(|lower| self.registry.info(lower)) {
                keys.push((info.spelling, info.ws));
            }
            for key in &keys {
                if seen.insert(key.clone()) {
                    forms.push(key.clone());
                }
            }
            if !keys.is_empty() {
                pending.push(PendingGuess { id, wordform, keys });
            }
        }
        if forms.is_empty() {
            return Ok(0);
        }

        let mut best: HashMap<(String, WsId), LexEntryId> = HashMap::new();
        for found in lexicon.entries_for_forms(&forms)? {
            best.entry((found.form, found.ws)).or_insert(found.entry);
        }

        let mut attached = 0;
        for guess in pending {
            if let Some(entry) = guess.keys.iter().find_map(|key| best.get(key)) {
                self.store.set_guess(guess.id, GuessedAnalysis { entry: *entry, wordform: guess.wordform });
                attached += 1;
            }
        }
        self.state.stats.guesses_attached += attached as u64;
        debug!(forms = forms.len(), attached, "Guess phase complete");
        Ok(attached)
    }
}
