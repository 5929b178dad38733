// WHY: Typed failure taxonomy for the reconciliation engine
// Recoverable data problems stay local (logged, reserved); only structural failures reach callers

use std::fmt;
use thiserror::Error;

use crate::store::{AnnotationKind, AnnotationRef, ParagraphId};

/// Result type for interlin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a stored annotation was excluded from matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// Offsets below zero or an inverted range
    BadOffsets { begin: i32, end: i32 },
    /// The analysis link points at an object class the engine does not know
    UnknownAnalysisClass(u32),
    /// The registry has no spelling for the occurrence's wordform
    UnknownWordform,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::BadOffsets { begin, end } => write!(f, "invalid offsets [{begin}, {end})"),
            MalformedReason::UnknownAnalysisClass(class) => write!(f, "unknown analysis class {class}"),
            MalformedReason::UnknownWordform => write!(f, "wordform not in registry"),
        }
    }
}

/// What edit-monitoring mode found out of step with the live-edited structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStateMismatch {
    /// A reused annotation's stored offsets differ from the freshly computed ones
    Offsets {
        kind: AnnotationKind,
        id: AnnotationRef,
        expected: (usize, usize),
        actual: (i32, i32),
    },
    /// A token had a candidate annotation that was not at its offset
    NoExactCandidate {
        kind: AnnotationKind,
        expected: (usize, usize),
    },
    /// Annotations that should have been consumed were left over after cleanup
    Leftovers {
        kind: AnnotationKind,
        paragraph: Option<ParagraphId>,
        count: usize,
    },
}

impl fmt::Display for EditStateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditStateMismatch::Offsets { kind, id, expected, actual } => write!(
                f,
                "{kind:?} {id} stored at [{}, {}) but computed [{}, {})",
                actual.0, actual.1, expected.0, expected.1
            ),
            EditStateMismatch::NoExactCandidate { kind, expected } => write!(
                f,
                "no {kind:?} annotation stored at computed [{}, {})",
                expected.0, expected.1
            ),
            EditStateMismatch::Leftovers { kind, paragraph, count } => match paragraph {
                Some(p) => write!(f, "{count} unused {kind:?} annotations left in paragraph {p}"),
                None => write!(f, "{count} unused {kind:?} annotations left over"),
            },
        }
    }
}

/// Error type for interlin operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Stored annotation cannot take part in matching. Logged by the engine, never returned by `parse`.
    #[error("Malformed annotation {id}: {reason}")]
    MalformedAnnotation { id: AnnotationRef, reason: MalformedReason },

    /// Edit-monitoring mode found a structure that live editing should already have produced.
    #[error("Inconsistent edit state: {0}")]
    InconsistentEditState(EditStateMismatch),

    /// Session object used after `end()`.
    #[error("Session used after it was ended")]
    UseAfterDispose,

    /// Another session is already active against the same store instance.
    #[error("A parse session is already active for store instance {0}")]
    SessionBusy(u64),

    /// The external store rejected an operation.
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Whether the session must be abandoned after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedAnnotation { .. })
    }
}
