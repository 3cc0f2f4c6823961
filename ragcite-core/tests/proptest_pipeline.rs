//! Property-based tests for the citation pipeline using proptest.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use ragcite_core::hallucination::is_mandatory;
use ragcite_core::locate::find_spans;
use ragcite_core::{
    AnswerContext, CitationPipeline, LocalEmbedder, MockNlpEngine, RecordOutcome, SourcePassage,
};

const ENTITIES: &[(&str, &str)] = &[
    ("Apple", "ORG"),
    ("2020", "DATE"),
    ("$5 million", "MONEY"),
    ("March 2021", "DATE"),
    ("third", "ORDINAL"),
    ("42", "CARDINAL"),
];

const NOUNS: &[&str] = &["revenue", "growth", "market"];

const VOCABULARY: &[&str] = &[
    "Apple", "2020", "$5 million", "March 2021", "third", "42", "revenue", "growth", "market",
    "the", "grew", "in", "was", "report", "Sales",
];

fn lexicon() -> MockNlpEngine {
    let nlp = ENTITIES
        .iter()
        .fold(MockNlpEngine::new(), |nlp, (word, category)| {
            nlp.with_entity(word, category)
        });
    NOUNS.iter().fold(nlp, |nlp, noun| nlp.with_noun(noun))
}

fn pipeline(threshold: f32) -> CitationPipeline {
    CitationPipeline::new(
        Arc::new(lexicon()),
        Arc::new(LocalEmbedder::new(64)),
        threshold,
    )
    .unwrap()
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(VOCABULARY), 1..6)
        .prop_map(|words| format!("{}.", words.join(" ")))
}

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(sentence(), 1..4).prop_map(|sentences| sentences.join(" "))
}

fn passages() -> impl Strategy<Value = Vec<SourcePassage>> {
    prop::collection::vec((text(), prop::option::of(0u8..4)), 1..4).prop_map(|items| {
        items
            .into_iter()
            .map(|(document, id)| match id {
                Some(id) => SourcePassage::new(document).with_source_id(format!("doc{id}")),
                None => SourcePassage::new(document),
            })
            .collect()
    })
}

fn accepted_triples(
    pipeline: &CitationPipeline,
    context: &AnswerContext,
) -> BTreeSet<(String, String, Option<String>)> {
    let (_, trace) = pipeline.run_with_trace(context).unwrap();
    trace
        .records
        .into_iter()
        .filter(|r| r.outcome == RecordOutcome::Accepted)
        .map(|r| {
            (
                r.record.answer_sentence,
                r.record.document_sentence,
                r.record.source_id,
            )
        })
        .collect()
}

// --- Occurrence properties ---

proptest! {
    #[test]
    fn occurrences_never_overlap(word in "[ab]{1,3}", sentence in "[ab ]{0,40}") {
        let spans = find_spans(&word, &sentence);
        for pair in spans.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
        let chars: Vec<char> = sentence.chars().collect();
        for span in &spans {
            let found: String = chars[span.start..span.end].iter().collect();
            prop_assert_eq!(found, word.clone());
        }
    }

    #[test]
    fn occurrence_count_matches_std(word in "[a-c]{1,2}", sentence in "[a-c]{0,30}") {
        prop_assert_eq!(find_spans(&word, &sentence).len(), sentence.matches(word.as_str()).count());
    }
}

// --- Pipeline properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cited_sources_come_from_input(answer in text(), passages in passages()) {
        let context = AnswerContext::new(answer, passages).unwrap();
        let report = pipeline(0.5).run_context(&context).unwrap();
        let input_ids = context.source_ids();
        for id in report.cited_source_ids() {
            prop_assert!(input_ids.contains(id));
        }
    }

    #[test]
    fn repeated_runs_are_identical(answer in text(), passages in passages()) {
        let context = AnswerContext::new(answer, passages).unwrap();
        let pipeline = pipeline(0.7);
        let first = pipeline.run_context(&context).unwrap();
        let second = pipeline.run_context(&context).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn raising_threshold_only_shrinks_accepted(
        answer in text(),
        passages in passages(),
        low in 0.0f32..1.0,
        delta in 0.0f32..1.0,
    ) {
        let high = (low + delta).min(1.0);
        let context = AnswerContext::new(answer, passages).unwrap();
        let lenient = accepted_triples(&pipeline(low), &context);
        let strict = accepted_triples(&pipeline(high), &context);
        prop_assert!(strict.is_subset(&lenient));
    }

    #[test]
    fn fully_supported_answer_is_not_hallucinated(answer in text(), passages in passages()) {
        let context = AnswerContext::new(answer, passages).unwrap();
        let supported = ENTITIES
            .iter()
            .filter(|(word, category)| is_mandatory(category) && context.answer().contains(word))
            .all(|(word, _)| context.passages().iter().any(|p| p.document.contains(word)));
        // Non-negative local embeddings never score below zero.
        let report = pipeline(0.0).run_context(&context).unwrap();
        if supported {
            prop_assert!(!report.hallucination);
        }
        if report.hallucination {
            prop_assert!(!report.missing_words.is_empty());
        }
    }
}
