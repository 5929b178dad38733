// WHY: Caller-facing options plus the engine's tunable heuristic constants
// Both deserialize from JSON so the binary can load them from a file

use serde::{Deserialize, Serialize};

/// Largest offset drift at which a word occurrence may still be reused.
/// Calibration point carried over from the editor's behavior, not a derived bound.
pub const DEFAULT_DRIFT_THRESHOLD: usize = 25;

/// Longest spelling the store accepts in a wordform field; longer words are truncated for lookup only
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 300;

/// Safety margin for the joined id list of one bulk query, in characters
pub const DEFAULT_QUERY_ID_BUDGET: usize = 4000;

/// Per-parse options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Record every reconciled occurrence under its wordform
    pub collect_occurrences: bool,
    /// Ignore existing occurrences and reserve them all before matching
    pub reset_occurrences_first: bool,
    /// New wordforms and word occurrences are persisted rather than dummy
    pub create_real_wordforms: bool,
    /// Load prior annotation metadata with bulk store queries instead of walking the cached tree
    pub use_store_data: bool,
    /// Suppress store change notifications while the session mutates objects
    pub suppress_sub_tasks: bool,
    /// New segments and punctuation spans are persisted rather than dummy
    pub create_real_segments: bool,
    /// Attach best-guess analyses from the lexicon after a whole-text parse
    pub guess_analyses: bool,
    /// Stop after this many accepted occurrences (concordance searches)
    pub max_matches: Option<usize>,
}

impl ParseOptions {
    /// Options for an interactive parse whose results persist
    pub fn real() -> Self {
        Self {
            create_real_wordforms: true,
            create_real_segments: true,
            use_store_data: true,
            ..Self::default()
        }
    }
}

/// How reuse decisions are made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrictnessPolicy {
    /// Re-offset and relink prior annotations wherever they plausibly still fit
    #[default]
    Heuristic,
    /// Edit-monitoring: every reused annotation must already sit at the computed offsets
    ExactOrFail,
}

/// Engine tuning shared by every parse in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub drift_threshold: usize,
    pub max_field_length: usize,
    pub query_id_budget: usize,
    pub strictness: StrictnessPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            query_id_budget: DEFAULT_QUERY_ID_BUDGET,
            strictness: StrictnessPolicy::Heuristic,
        }
    }
}

impl ReconcilerConfig {
    /// Edit-monitoring configuration
    pub fn monitoring() -> Self {
        Self { strictness: StrictnessPolicy::ExactOrFail, ..Self::default() }
    }
}
