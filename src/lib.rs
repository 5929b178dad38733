pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod store;
pub mod text;

// Re-export main types for convenient access
pub use classify::{CharClassifier, DefaultClassifier};
pub use config::{ParseOptions, ReconcilerConfig, StrictnessPolicy};
pub use error::{EditStateMismatch, Error, MalformedReason, Result};
pub use reconcile::{FormRef, ParseOutcome, Session, SessionStats};
pub use report::ParseReport;
pub use scanner::{SegmentBoundary, SegmentSplitter, WordScanner};
pub use store::{
    AnnotationKind, AnnotationRef, AnnotationStore, Lexicon, MemoryLexicon, MemoryRegistry, MemoryStore, ParagraphId,
    WordformId, WordformRegistry,
};
pub use text::{Paragraph, StyledText, WsId};

// Re-export document loading for the binary and benchmarks
pub use document::{load_document, split_paragraphs, Document};
