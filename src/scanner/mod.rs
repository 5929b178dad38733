// WHY: Tokenization layer: word spans and segment boundaries over styled paragraph text

pub mod segment_splitter;
pub mod word_scanner;

pub use segment_splitter::{
    BoundaryCollector, MaterializingSink, SegmentBoundary, SegmentFactory, SegmentSink, SegmentSplitter, SegmentView,
    SplitState,
};
pub use word_scanner::{SpanMatch, WordScanner, WordSpan};
