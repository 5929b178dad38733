// Integration test utilities and common code
// WHY: Centralized utilities avoid duplication across integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use interlin::report::{FormReport, ParagraphReport};
use interlin::{AnnotationKind, AnnotationStore, Paragraph, ParseOutcome, ParseReport, SessionStats, WordformRegistry};

/// Test fixture helper for creating temporary directories with source texts
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();
        Self { temp_dir, root_path }
    }

    /// Create a text file with given content
    pub fn create_text_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }
}

/// Plain paragraphs numbered from 1
pub fn paragraphs(texts: &[&str]) -> Vec<Paragraph> {
    texts.iter().enumerate().map(|(i, t)| Paragraph::plain(i as u64 + 1, t)).collect()
}

/// Current structure of `paragraphs` as the store holds it
pub fn snapshot<S: AnnotationStore, R: WordformRegistry>(store: &S, registry: &R, paragraphs: &[Paragraph]) -> ParseReport {
    ParseReport::collect("test", ParseOutcome::default(), SessionStats::default(), store, registry, paragraphs)
}

/// Texts of every segment's forms
pub fn form_texts(paragraph: &ParagraphReport) -> Vec<Vec<String>> {
    paragraph.segments.iter().map(|s| s.forms.iter().map(|f| f.text.clone()).collect()).collect()
}

/// Word forms of a paragraph in order
pub fn words(paragraph: &ParagraphReport) -> Vec<&FormReport> {
    paragraph
        .segments
        .iter()
        .flat_map(|s| s.forms.iter())
        .filter(|f| f.kind == AnnotationKind::Word)
        .collect()
}

/// The word form starting at `begin`
pub fn word_at(paragraph: &ParagraphReport, begin: i32) -> &FormReport {
    words(paragraph)
        .into_iter()
        .find(|f| f.begin == begin)
        .unwrap_or_else(|| panic!("no word at {begin}"))
}

/// Segments tile the paragraph; forms are ordered, disjoint, inside their segment and cover every non-white character
pub fn assert_coverage(paragraph: &ParagraphReport, source: &Paragraph) {
    let len = source.text.len() as i32;
    if len == 0 {
        assert!(paragraph.segments.is_empty());
        return;
    }
    assert_eq!(paragraph.segments.first().map(|s| s.begin), Some(0), "first segment must start at 0");
    assert_eq!(paragraph.segments.last().map(|s| s.end), Some(len), "last segment must end at paragraph end");
    for pair in paragraph.segments.windows(2) {
        assert_eq!(pair[0].end, pair[1].begin, "segments must be contiguous");
    }
    let mut covered = vec![false; len as usize];
    for segment in &paragraph.segments {
        let mut cursor = segment.begin;
        for form in &segment.forms {
            assert!(form.begin >= cursor, "forms must be ordered and disjoint: {form:?}");
            assert!(form.end <= segment.end, "form outside its segment: {form:?}");
            for slot in &mut covered[form.begin as usize..form.end as usize] {
                *slot = true;
            }
            cursor = form.end;
        }
    }
    let units = source.text.units();
    for (pos, covered) in covered.iter().enumerate() {
        let ch = char::from_u32(units[pos] as u32).unwrap_or('x');
        if !covered {
            assert!(ch == ' ' || ch == '\t', "offset {pos} ({ch:?}) is not covered by any form");
        }
    }
}
