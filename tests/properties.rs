//! Property-based tests for the §8 invariants and laws.
//!
//! Uses proptest to find edge cases in the data-model invariants and the
//! content-addressed dedup law automatically through randomized testing.

use deckmind::storage::Database;
use deckmind::types::{
    CheckResult, CheckStatus, Chapter, ConceptCluster, Document, DocumentId, ExpandedContent, FileKind, GapKind,
    GlobalAnalysis, KnowledgeGap, KnowledgeUnit, Page, PageAnalysis, Reference, content_hash, truncate_chars,
};
use proptest::prelude::*;

fn arb_gap_kind() -> impl Strategy<Value = GapKind> {
    prop_oneof![
        Just(GapKind::Intuition),
        Just(GapKind::Example),
        Just(GapKind::Prerequisite),
        Just(GapKind::Derivation),
    ]
}

fn sample_page_analysis(revision_count: u32, n_refs: usize) -> PageAnalysis {
    PageAnalysis {
        page_number: 1,
        clusters: vec![],
        notes: String::new(),
        gaps: vec![],
        expansions: vec![],
        references: (0..n_refs)
            .map(|i| Reference {
                title: format!("ref {i}"),
                url: format!("https://example.com/{i}"),
                source_tag: "web".into(),
                snippet: "s".into(),
            })
            .collect(),
        check_result: CheckResult::pass(),
        final_notes: String::new(),
        revision_count,
    }
}

proptest! {
    /// `clamp_difficulty` always lands in `[1, 5]`, matching the
    /// PageClusterer's documented coercion rule for out-of-range model output.
    #[test]
    fn concept_cluster_difficulty_always_clamped(difficulty in 0u8..=255) {
        let cluster = ConceptCluster {
            concept: "attention".into(),
            difficulty,
            why_difficult: "reasons".into(),
            related_concepts: vec![],
            global_context: None,
        }
        .clamp_difficulty();
        prop_assert!((1..=5).contains(&cluster.difficulty));
    }

    /// A cluster with a non-empty concept is valid after clamping,
    /// regardless of the raw difficulty value the model returned.
    #[test]
    fn concept_cluster_is_valid_after_clamp_given_nonempty_concept(
        concept in "[a-zA-Z ]{1,40}",
        difficulty in 0u8..=255,
    ) {
        let cluster = ConceptCluster {
            concept,
            difficulty,
            why_difficult: "x".into(),
            related_concepts: vec![],
            global_context: None,
        }
        .clamp_difficulty();
        prop_assert!(cluster.is_valid());
    }

    /// Same clamping law for `KnowledgeGap::priority`.
    #[test]
    fn knowledge_gap_priority_always_clamped(priority in 0u8..=255) {
        let gap = KnowledgeGap {
            concept: "backprop".into(),
            gap_kind: GapKind::Derivation,
            priority,
        }
        .clamp_priority();
        prop_assert!((1..=5).contains(&gap.priority));
    }

    /// Every `GapKind` round-trips through its string form for any
    /// combination of upper/lower ASCII case, since `parse` lowercases.
    #[test]
    fn gap_kind_parse_is_case_insensitive(kind in arb_gap_kind(), upcase_all in any::<bool>()) {
        let s = kind.as_str();
        let probe = if upcase_all { s.to_ascii_uppercase() } else { s.to_string() };
        prop_assert_eq!(GapKind::parse(&probe), Some(kind));
    }

    /// §8: "for every `KnowledgeUnit`: `page_numbers ⊆ [1..total_pages]` and
    /// non-empty" — `is_valid` must agree with a direct re-check over the
    /// same generated data for any `total_pages` and any page-number list.
    #[test]
    fn knowledge_unit_validity_matches_range_check(
        total_pages in 1u32..500,
        page_numbers in prop::collection::vec(0u32..600, 0..10),
    ) {
        let unit = KnowledgeUnit {
            unit_id: "u".into(),
            title: "Attention".into(),
            page_numbers: page_numbers.clone(),
            core_concepts: vec!["c".into()],
        };
        let expected = !page_numbers.is_empty() && page_numbers.iter().all(|&p| p >= 1 && p <= total_pages);
        prop_assert_eq!(unit.is_valid(total_pages), expected);
    }

    /// §8: `main_topic` must be non-empty and not the literal "unknown".
    #[test]
    fn global_analysis_main_topic_validity(main_topic in "(unknown|[a-zA-Z ]{0,20})") {
        let ga = GlobalAnalysis {
            main_topic: main_topic.clone(),
            chapters: vec![],
            knowledge_flow: String::new(),
            knowledge_units: vec![],
            total_pages: 1,
        };
        let trimmed = main_topic.trim();
        let expected = !trimmed.is_empty() && trimmed != "unknown";
        prop_assert_eq!(ga.has_valid_main_topic(), expected);
    }

    /// `PageAnalysis::check_invariants` flags exactly the violations the
    /// §8 invariant list names, for arbitrary list sizes and revision counts.
    #[test]
    fn page_analysis_invariants_match_caps(
        n_refs in 0usize..20,
        max_references in 0usize..20,
        revision_count in 0u32..10,
        max_revisions in 0u32..10,
    ) {
        let pa = sample_page_analysis(revision_count, n_refs);
        let violations = pa.check_invariants(max_references, max_revisions);

        let expects_too_many_refs = n_refs > max_references;
        let expects_revision_overflow = revision_count > max_revisions;

        prop_assert_eq!(violations.iter().any(|v| v.contains("too many references")), expects_too_many_refs);
        prop_assert_eq!(violations.iter().any(|v| v.contains("revision_count")), expects_revision_overflow);
        // Every generated reference here has a well-formed url, so that
        // violation never fires regardless of the other parameters.
        prop_assert!(!violations.iter().any(|v| v.contains("empty url")));
    }

    /// `content_hash` is a pure function of the bytes: equal inputs always
    /// produce equal hex digests, and it never panics on arbitrary bytes.
    #[test]
    fn content_hash_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
        let a = content_hash(&bytes);
        let b = content_hash(&bytes);
        prop_assert_eq!(a.len(), 64);
        prop_assert_eq!(a, b);
    }

    /// `truncate_chars` never panics on arbitrary Unicode input and never
    /// returns more than `max_chars` characters.
    #[test]
    fn truncate_chars_never_exceeds_requested_length(s in ".{0,200}", max_chars in 0usize..300) {
        let truncated = truncate_chars(&s, max_chars);
        prop_assert!(truncated.chars().count() <= max_chars);
        prop_assert!(truncated.chars().count() <= s.chars().count());
    }

    /// Law: ingesting bytes whose hash already exists in the Persistence
    /// Store returns the pre-existing `Document.id` unchanged, and creates
    /// no duplicate row, for any pair of (possibly differing) document
    /// shells that happen to share a `content_hash`.
    #[test]
    fn content_addressed_dedup_ignores_everything_but_the_hash(
        bytes in prop::collection::vec(any::<u8>(), 1..64),
        first_name in "[a-z]{1,10}\\.pptx",
        second_name in "[a-z]{1,10}\\.pptx",
    ) {
        let db = Database::open_in_memory().unwrap();
        let hash = content_hash(&bytes);

        let first = Document {
            id: DocumentId::generate(),
            file_name: first_name,
            file_kind: FileKind::Deck,
            content_hash: hash.clone(),
            pages: vec![],
            global_analysis: None,
        };
        let second = Document {
            id: DocumentId::generate(),
            file_name: second_name,
            file_kind: FileKind::Deck,
            content_hash: hash,
            pages: vec![],
            global_analysis: None,
        };

        let first_id = db.upsert_document(&first).unwrap();
        let second_id = db.upsert_document(&second).unwrap();
        prop_assert_eq!(first_id, second_id.clone());
        prop_assert_eq!(second_id, first.id);
    }
}

#[test]
fn global_analysis_rejects_empty_chapters_and_units_caps_hold() {
    // Not itself a proptest, but documents the fixed §8 caps this file's
    // generators assume elsewhere: at most 15 knowledge units, at most 3
    // expansions, at most 10 clusters, at most 5 gaps.
    assert_eq!(GlobalAnalysis::MAX_KNOWLEDGE_UNITS, 15);
    assert_eq!(ConceptCluster::MAX_PER_PAGE, 10);
    assert_eq!(KnowledgeGap::MAX_PER_PAGE, 5);
    assert_eq!(ExpandedContent::MAX_EXPANSIONS, 3);
}

#[test]
fn chapter_and_check_status_are_constructible_for_fixture_reuse() {
    // Smoke check that the public types used by the generators above stay
    // constructible with plain literals, so fixtures elsewhere in the
    // crate can keep using them without reaching for builders.
    let chapter = Chapter {
        title: "Intro".into(),
        page_numbers: vec![1, 2],
        key_concepts: vec!["basics".into()],
    };
    assert_eq!(chapter.page_numbers.len(), 2);
    assert_eq!(CheckResult::pass().status, CheckStatus::Pass);
    let page = Page {
        page_number: 1,
        title: "t".into(),
        raw_text: "x".into(),
        bullet_points: vec![],
        image_descriptions: vec![],
    };
    assert_eq!(page.page_number, 1);
}
