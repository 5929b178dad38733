// Reconciliation scenarios run end to end against the in-memory store
// WHY: Identity reuse only shows across successive parses, so these drive whole sessions

use interlin::report::ParagraphReport;
use interlin::store::{AnalysisClass, AnalysisLink, AnnotationRecord, Duality, RealId};
use interlin::text::VERSE_NUMBER_STYLE;
use interlin::{
    AnnotationKind, AnnotationRef, AnnotationStore, Error, MemoryRegistry, MemoryStore, Paragraph, ParagraphId, ParseOptions,
    ReconcilerConfig, Session, StyledText, WordformRegistry, WsId,
};

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{assert_coverage, form_texts, paragraphs, snapshot, word_at, words};

const WS: WsId = WsId(1);

/// Segment offsets and identities in order
fn segments(paragraph: &ParagraphReport) -> Vec<(i32, i32, AnnotationRef)> {
    paragraph.segments.iter().map(|s| (s.begin, s.end, s.id)).collect()
}

/// Punctuation offsets and identities in order
fn marks(paragraph: &ParagraphReport) -> Vec<(i32, i32, AnnotationRef)> {
    paragraph
        .segments
        .iter()
        .flat_map(|s| s.forms.iter())
        .filter(|f| f.kind == AnnotationKind::Punctuation)
        .map(|f| (f.begin, f.end, f.id))
        .collect()
}

fn parse(store: &mut MemoryStore, registry: &mut MemoryRegistry, paras: &[Paragraph], options: &ParseOptions) {
    let mut session = Session::acquire(store, registry).expect("session");
    let outcome = session.parse(paras, options).expect("parse");
    assert!(outcome.success);
}

#[test]
fn test_two_sentences_create_three_wordforms() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run. dogs run."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());

    assert_eq!(registry.spellings(), vec!["cats", "dogs", "run"]);
    let report = snapshot(&store, &registry, &paras);
    assert_eq!(report.segment_count(), 2);
    assert_eq!(
        form_texts(&report.paragraphs[0]),
        vec![vec!["cats", "run", "."], vec!["dogs", "run", "."]]
    );
    assert!(report.identities().iter().all(AnnotationRef::is_dummy));
    assert_coverage(&report.paragraphs[0], &paras[0]);
}

#[test]
fn test_reparse_of_unchanged_dummy_text_is_idempotent() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run. dogs run.", "Birds fly, fish swim!"]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    let before = snapshot(&store, &registry, &paras).identities();

    store.reset_counters();
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    assert_eq!(store.counters().structural_changes(), 0);
    assert_eq!(snapshot(&store, &registry, &paras).identities(), before);
}

#[test]
fn test_reparse_of_unchanged_real_text_touches_nothing() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run. dogs run."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::real());
    let before = snapshot(&store, &registry, &paras).identities();
    assert!(before.iter().all(|id| !id.is_dummy()));

    store.reset_counters();
    parse(&mut store, &mut registry, &paras, &ParseOptions::real());
    assert_eq!(store.counters().structural_changes(), 0);
    assert_eq!(store.counters().updated, 0);
    assert_eq!(snapshot(&store, &registry, &paras).identities(), before);
}

#[test]
fn test_insertion_keeps_occurrence_identities() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["cats run. dogs run."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old = snapshot(&store, &registry, &original);
    let old_words: Vec<_> = words(&old.paragraphs[0]).iter().map(|f| f.id).collect();

    let edited = paragraphs(&["big cats run. dogs run."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    let p = &new.paragraphs[0];

    assert_eq!(word_at(p, 4).id, old_words[0], "cats keeps its identity");
    assert_eq!(word_at(p, 9).id, old_words[1]);
    assert_eq!(word_at(p, 14).id, old_words[2]);
    assert_eq!(word_at(p, 19).id, old_words[3]);
    assert!(!old_words.contains(&word_at(p, 0).id), "the inserted word is new");
    assert_eq!(word_at(p, 4).end, 8);

    let old_segments: Vec<_> = old.paragraphs[0].segments.iter().map(|s| s.id).collect();
    let new_segments: Vec<_> = p.segments.iter().map(|s| s.id).collect();
    assert_eq!(old_segments, new_segments);
    assert_eq!(store.reserved_ids(), Vec::<RealId>::new());
    assert_coverage(p, &edited[0]);
}

#[test]
fn test_far_moved_word_is_not_reused() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["cats run."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old = snapshot(&store, &registry, &original);
    let old_cats = word_at(&old.paragraphs[0], 0).id;

    let edited = paragraphs(&["aaa bbb ccc ddd eee fff ggg hhh cats run."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    let cats = word_at(&new.paragraphs[0], 32);

    assert_ne!(cats.id, old_cats);
    assert_eq!(cats.wordform.as_deref(), Some("cats"));
    let AnnotationRef::Real(old_real) = old_cats else { panic!("expected a real occurrence") };
    assert!(store.is_reserved(old_real), "unmatched occurrence is reserved, not deleted");
    assert!(store.get(old_cats).is_some());
}

#[test]
fn test_candidate_goes_to_the_closest_matching_word() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["xx yy cat."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old_cat = word_at(&snapshot(&store, &registry, &original).paragraphs[0], 6).id;

    // A word between the first new "cat" and the stored one claims it instead
    let edited = paragraphs(&["cat cat yy cat."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    let p = &new.paragraphs[0];
    assert_eq!(word_at(p, 4).id, old_cat);
    assert_ne!(word_at(p, 0).id, old_cat);
    assert_ne!(word_at(p, 11).id, old_cat);
}

#[test]
fn test_case_fallback_only_at_sentence_start() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["the cat sat. the dog."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old = snapshot(&store, &registry, &original);
    let old_the = word_at(&old.paragraphs[0], 0).id;
    let old_cat = word_at(&old.paragraphs[0], 4).id;

    let edited = paragraphs(&["The Cat sat. the dog."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    assert_eq!(word_at(&new.paragraphs[0], 0).id, old_the);
    assert_ne!(word_at(&new.paragraphs[0], 4).id, old_cat);
}

#[test]
fn test_promotion_round_trip_leaves_no_dummies() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run. dogs run."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    assert!(store.live_dummy_count() > 0);

    parse(&mut store, &mut registry, &paras, &ParseOptions::real());
    let report = snapshot(&store, &registry, &paras);
    assert!(report.identities().iter().all(|id| !id.is_dummy()));
    assert_eq!(store.live_dummy_count(), 0);
    assert_eq!(store.real_count(AnnotationKind::Word), 4);
    assert_eq!(store.real_count(AnnotationKind::Punctuation), 2);
    assert_eq!(store.real_count(AnnotationKind::Segment), 2);
    assert!(matches!(registry.find("cats", WS), Some(id) if !id.is_dummy()));
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_registered_phrase_becomes_one_occurrence() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["I love New York city. I saw New. York is big."]);
    {
        let mut session = Session::acquire(&mut store, &mut registry).unwrap();
        session.register_phrase("New York", WS).unwrap();
        session.parse(&paras, &ParseOptions::default()).unwrap();
    }
    let report = snapshot(&store, &registry, &paras);
    let texts = form_texts(&report.paragraphs[0]);
    assert_eq!(texts[0], vec!["I", "love", "New York", "city", "."]);
    assert_eq!(texts[1], vec!["I", "saw", "New", "."], "phrases never cross segments");
    assert!(registry.find("New York", WS).is_some());
    assert_coverage(&report.paragraphs[0], &paras[0]);
}

#[test]
fn test_phrase_stops_at_analyzed_occurrence() {
    for (analysis, expect_phrase) in [(None, true), (Some(AnalysisClass::Analysis), false)] {
        let mut store = MemoryStore::new();
        let mut registry = MemoryRegistry::new();
        let york = registry.find_or_create("York", WS, Duality::Real);
        let link = analysis.map(|class| AnalysisLink { class, id: 77 });
        let prior = store.insert_real(AnnotationRecord::word(ParagraphId(1), 11, 15, york, link));

        let paras = paragraphs(&["I love New York."]);
        {
            let mut session = Session::acquire(&mut store, &mut registry).unwrap();
            session.register_phrase("New York", WS).unwrap();
            session.parse(&paras, &ParseOptions::real()).unwrap();
        }
        let report = snapshot(&store, &registry, &paras);
        let texts = form_texts(&report.paragraphs[0]);
        if expect_phrase {
            assert_eq!(texts[0], vec!["I", "love", "New York", "."]);
            assert!(store.is_reserved(prior));
        } else {
            assert_eq!(texts[0], vec!["I", "love", "New", "York", "."]);
            assert_eq!(word_at(&report.paragraphs[0], 11).id, AnnotationRef::Real(prior));
            let record = store.get(AnnotationRef::Real(prior)).unwrap();
            assert_eq!(record.analysis(), link, "relinking keeps the analysis");
        }
    }
}

#[test]
fn test_stored_multiword_occurrence_teaches_the_phrase() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let phrase = registry.find_or_create("de facto", WS, Duality::Real);
    store.insert_real(AnnotationRecord::word(ParagraphId(1), 0, 8, phrase, None));
    let paras = paragraphs(&["de facto rule.", "a de facto ban."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::real());

    let report = snapshot(&store, &registry, &paras);
    assert_eq!(form_texts(&report.paragraphs[0])[0], vec!["de facto", "rule", "."]);
    assert_eq!(form_texts(&report.paragraphs[1])[0], vec!["a", "de facto", "ban", "."]);
}

#[test]
fn test_malformed_annotations_are_reserved_and_skipped() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let cats = registry.find_or_create("cats", WS, Duality::Real);
    let negative = store.insert_real(AnnotationRecord::word(ParagraphId(1), 0, 4, cats, None));
    let mut broken = store.get(AnnotationRef::Real(negative)).cloned().unwrap();
    broken.begin = -1;
    store.update(AnnotationRef::Real(negative), broken).unwrap();
    let unknown = store.insert_real(AnnotationRecord::word(
        ParagraphId(1),
        5,
        8,
        cats,
        Some(AnalysisLink { class: AnalysisClass::Unknown(4242), id: 1 }),
    ));

    let paras = paragraphs(&["cats run."]);
    let mut session = Session::acquire(&mut store, &mut registry).unwrap();
    let outcome = session.parse(&paras, &ParseOptions::real()).unwrap();
    assert!(outcome.success);
    assert_eq!(session.stats().malformed, 2);
    drop(session);

    assert!(store.is_reserved(negative));
    assert!(store.is_reserved(unknown));
    let report = snapshot(&store, &registry, &paras);
    assert_ne!(word_at(&report.paragraphs[0], 0).id, AnnotationRef::Real(negative));
}

#[test]
fn test_orphan_segment_is_adopted() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let mut orphan = AnnotationRecord::segment(ParagraphId(99), 0, 5, None);
    orphan.paragraph = None;
    let orphan = store.insert_real(orphan);

    let paras = paragraphs(&["Hello there."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::real());
    let report = snapshot(&store, &registry, &paras);
    assert_eq!(report.paragraphs[0].segments[0].id, AnnotationRef::Real(orphan));
    assert_eq!(store.get(AnnotationRef::Real(orphan)).unwrap().paragraph, Some(ParagraphId(1)));
}

#[test]
fn test_leftovers_move_to_later_paragraphs_and_rest_are_deleted() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["a. b. c.", "d."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old = snapshot(&store, &registry, &original);
    let old_p1: Vec<_> = old.paragraphs[0].segments.iter().map(|s| s.id).collect();

    let edited = paragraphs(&["a.", "d. e."]);
    store.reset_counters();
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    assert_eq!(new.paragraphs[0].segments[0].id, old_p1[0]);
    assert_eq!(new.paragraphs[1].segments[1].id, old_p1[1], "leftover of an earlier paragraph is reused");
    assert!(store.get(old_p1[2]).is_none(), "remaining leftover segment is deleted");
    assert_eq!(store.counters().deleted, 2, "one segment and one punctuation span");
}

#[test]
fn test_reset_occurrences_first_replaces_every_occurrence() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::real());
    let old: Vec<_> = words(&snapshot(&store, &registry, &paras).paragraphs[0]).iter().map(|f| f.id).collect();

    let options = ParseOptions { reset_occurrences_first: true, ..ParseOptions::real() };
    parse(&mut store, &mut registry, &paras, &options);
    let new: Vec<_> = words(&snapshot(&store, &registry, &paras).paragraphs[0]).iter().map(|f| f.id).collect();
    assert_eq!(new.len(), 2);
    assert!(new.iter().all(|id| !old.contains(id)));
    assert_eq!(store.reserved_ids().len(), 2);
}

#[test]
fn test_collected_occurrences_and_touched_wordforms() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["run, run, run away."]);
    let options = ParseOptions { collect_occurrences: true, ..ParseOptions::default() };
    let mut session = Session::acquire(&mut store, &mut registry).unwrap();
    session.parse(&paras, &options).unwrap();
    let run = session.registry().find("run", WS).unwrap();
    assert_eq!(session.occurrences_of(run).unwrap().len(), 3);
    assert_eq!(session.touched_wordforms().unwrap().len(), 2);
}

#[test]
fn test_sub_task_notifications_can_be_suppressed() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run."]);
    let options = ParseOptions { suppress_sub_tasks: true, ..ParseOptions::default() };
    parse(&mut store, &mut registry, &paras, &options);
    assert_eq!(store.counters().notifications, 0);

    let other = vec![Paragraph::plain(2, "dogs bark.")];
    parse(&mut store, &mut registry, &other, &ParseOptions::default());
    assert!(store.counters().notifications > 0);
}

#[test]
fn test_session_is_exclusive_and_disposable() {
    let mut store = MemoryStore::attach(77_000_001);
    let mut twin = MemoryStore::attach(77_000_001);
    let mut registry = MemoryRegistry::new();
    let mut twin_registry = MemoryRegistry::new();

    let mut session = Session::acquire(&mut store, &mut registry).unwrap();
    assert!(matches!(Session::acquire(&mut twin, &mut twin_registry), Err(Error::SessionBusy(77_000_001))));
    session.end();
    let paras = paragraphs(&["cats run."]);
    assert!(matches!(session.parse(&paras, &ParseOptions::default()), Err(Error::UseAfterDispose)));
    assert!(Session::acquire(&mut twin, &mut twin_registry).is_ok());
}

#[test]
fn test_empty_input_parses_nothing() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let mut session = Session::acquire(&mut store, &mut registry).unwrap();
    let outcome = session.parse(&[], &ParseOptions::default()).unwrap();
    assert!(outcome.success);
    assert!(!outcome.did_parse);
}

#[test]
fn test_verse_labels_are_not_words() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let text = StyledText::builder()
        .styled_run("16", WS, VERSE_NUMBER_STYLE)
        .run(" For God so loved the world.", WS)
        .build();
    let paras = vec![Paragraph::new(ParagraphId(1), text)];
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());

    let report = snapshot(&store, &registry, &paras);
    let texts = form_texts(&report.paragraphs[0]);
    assert_eq!(texts[0], vec!["16"]);
    assert_eq!(texts[1], vec!["For", "God", "so", "loved", "the", "world", "."]);
    assert_eq!(report.paragraphs[0].segments[0].forms[0].kind, AnnotationKind::Punctuation);
    assert!(registry.find("16", WS).is_none());
}

#[test]
fn test_offsets_are_utf16_code_units() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["a\u{10400}b c."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    let report = snapshot(&store, &registry, &paras);
    let first = word_at(&report.paragraphs[0], 0);
    assert_eq!(first.end, 4);
    assert_eq!(word_at(&report.paragraphs[0], 5).text, "c");
    assert_coverage(&report.paragraphs[0], &paras[0]);
}

#[test]
fn test_overlong_word_is_truncated_for_lookup_only() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let long = "a".repeat(400);
    let paras = paragraphs(&[long.as_str()]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    assert_eq!(registry.spellings()[0].chars().count(), 300);
    let report = snapshot(&store, &registry, &paras);
    assert_eq!(word_at(&report.paragraphs[0], 0).end, 400);
}

#[test]
fn test_drift_threshold_is_configurable() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["cats run."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old_cats = word_at(&snapshot(&store, &registry, &original).paragraphs[0], 0).id;

    let edited = paragraphs(&["big cats run."]);
    let config = ReconcilerConfig { drift_threshold: 2, ..ReconcilerConfig::default() };
    let mut session = Session::with_config(&mut store, &mut registry, config).unwrap();
    session.parse(&edited, &ParseOptions::real()).unwrap();
    drop(session);
    assert_ne!(word_at(&snapshot(&store, &registry, &edited).paragraphs[0], 4).id, old_cats);
}

#[test]
fn test_split_segment_leaves_later_exact_spans_their_identities() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["Ab. Cdef. Gh."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old = snapshot(&store, &registry, &original);
    let old_segments = segments(&old.paragraphs[0]);
    let old_marks = marks(&old.paragraphs[0]);
    assert_eq!(old_segments.len(), 3);
    assert_eq!(old_marks.len(), 3);

    let edited = paragraphs(&["Ab. Cd.E. Gh."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new = snapshot(&store, &registry, &edited);
    let new_segments = segments(&new.paragraphs[0]);
    assert_eq!(new_segments.len(), 4);
    assert_eq!(new_segments[0], (0, 4, old_segments[0].2));
    assert_eq!(new_segments[1], (4, 7, old_segments[1].2));
    assert_eq!(new_segments[3], (10, 13, old_segments[2].2));
    assert!(old_segments.iter().all(|s| s.2 != new_segments[2].2));

    let new_marks = marks(&new.paragraphs[0]);
    assert_eq!(new_marks.len(), 4);
    assert_eq!(new_marks[0], (2, 3, old_marks[0].2));
    assert_eq!(new_marks[2], (8, 9, old_marks[1].2));
    assert_eq!(new_marks[3], (12, 13, old_marks[2].2));
    assert!(old_marks.iter().all(|m| m.2 != new_marks[1].2));
    assert_coverage(&new.paragraphs[0], &edited[0]);
}

#[test]
fn test_new_leading_punctuation_does_not_take_a_later_exact_span() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let original = paragraphs(&["ab, cd."]);
    parse(&mut store, &mut registry, &original, &ParseOptions::real());
    let old_marks = marks(&snapshot(&store, &registry, &original).paragraphs[0]);
    assert_eq!(old_marks.iter().map(|m| (m.0, m.1)).collect::<Vec<_>>(), vec![(2, 3), (6, 7)]);

    let edited = paragraphs(&["(b, cd."]);
    parse(&mut store, &mut registry, &edited, &ParseOptions::real());
    let new_marks = marks(&snapshot(&store, &registry, &edited).paragraphs[0]);
    assert_eq!(new_marks.len(), 3);
    assert_eq!(new_marks[1], (2, 3, old_marks[0].2));
    assert_eq!(new_marks[2], (6, 7, old_marks[1].2));
    assert!(old_marks.iter().all(|m| m.2 != new_marks[0].2));
}

#[test]
fn test_real_parse_relinks_dummy_occurrences_in_other_paragraphs() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["cats run.", "dogs run."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());
    parse(&mut store, &mut registry, &paras[..1], &ParseOptions::real());

    let run = registry.find("run", WS).unwrap();
    assert!(!run.is_dummy());
    let report = snapshot(&store, &registry, &paras);
    let untouched = word_at(&report.paragraphs[1], 5);
    assert_eq!(untouched.wordform.as_deref(), Some("run"));
    assert_eq!(store.get(untouched.id).unwrap().wordform(), Some(run));
}

#[test]
fn test_thai_words_keep_their_tone_marks() {
    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();
    let paras = paragraphs(&["\u{0E19}\u{0E48}\u{0E32}\u{0E23}\u{0E31}\u{0E01} \u{0E21}\u{0E32}\u{0E01}."]);
    parse(&mut store, &mut registry, &paras, &ParseOptions::default());

    let report = snapshot(&store, &registry, &paras);
    assert_eq!(
        form_texts(&report.paragraphs[0]),
        vec![vec!["\u{0E19}\u{0E48}\u{0E32}\u{0E23}\u{0E31}\u{0E01}", "\u{0E21}\u{0E32}\u{0E01}", "."]]
    );
    assert_eq!(registry.len(), 2);
    assert_coverage(&report.paragraphs[0], &paras[0]);
}
