//! Occurrence location: where each focus word literally appears, per sentence.
//!
//! Matching is case-sensitive and substring based, so a focus word also
//! matches inside a longer token ("Mark" in "Markets").

use tracing::debug;

use crate::error::CollaboratorError;
use crate::nlp::NlpEngine;
use crate::types::{FocusWord, LocatedWord, SourcePassage, Span, WordOccurrence};

/// Non-overlapping occurrences of `word` in `sentence`, scanning left to right.
///
/// Spans are character offsets. After a match the scan resumes at the match
/// end, so a word never overlaps itself.
pub fn find_spans(word: &str, sentence: &str) -> Vec<Span> {
    if word.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut byte_cursor = 0;
    let mut char_cursor = 0;
    let word_chars = word.chars().count();
    for (byte_start, _) in sentence.match_indices(word) {
        char_cursor += sentence[byte_cursor..byte_start].chars().count();
        byte_cursor = byte_start;
        spans.push(Span {
            start: char_cursor,
            end: char_cursor + word_chars,
        });
    }
    spans
}

fn collect_occurrences(
    focus: &FocusWord,
    sentences: &[String],
    source_id: Option<&str>,
    into: &mut Vec<WordOccurrence>,
) {
    for sentence in sentences {
        for span in find_spans(&focus.word, sentence) {
            into.push(WordOccurrence {
                word: focus.word.clone(),
                kind: focus.kind,
                category: focus.category.clone(),
                sentence: sentence.clone(),
                span,
                source_id: source_id.map(str::to_string),
            });
        }
    }
}

fn located(focus: &FocusWord, occurrences: Vec<WordOccurrence>) -> LocatedWord {
    LocatedWord {
        word: focus.word.clone(),
        kind: focus.kind,
        category: focus.category.clone(),
        occurrences,
    }
}

/// Locate every focus word in a single text, typically the answer.
///
/// Words without any occurrence are omitted. Occurrences carry no source id.
pub fn locate_in_text(
    nlp: &dyn NlpEngine,
    focus_words: &[FocusWord],
    text: &str,
) -> Result<Vec<LocatedWord>, CollaboratorError> {
    let sentences = nlp.segment_sentences(text)?;

    let result: Vec<LocatedWord> = focus_words
        .iter()
        .filter_map(|focus| {
            let mut occurrences = Vec::new();
            collect_occurrences(focus, &sentences, None, &mut occurrences);
            (!occurrences.is_empty()).then(|| located(focus, occurrences))
        })
        .collect();

    debug!(
        sentences = sentences.len(),
        words = result.len(),
        "Located focus words in text"
    );
    Ok(result)
}

/// Locate every focus word across all passages.
///
/// Occurrences of one word from different passages accumulate into a single
/// entry, in passage order. Entries follow the order of `focus_words`.
pub fn locate_in_sources(
    nlp: &dyn NlpEngine,
    focus_words: &[FocusWord],
    passages: &[SourcePassage],
) -> Result<Vec<LocatedWord>, CollaboratorError> {
    let segmented = passages
        .iter()
        .map(|p| Ok((nlp.segment_sentences(&p.document)?, p.source_id.as_deref())))
        .collect::<Result<Vec<_>, CollaboratorError>>()?;

    let result: Vec<LocatedWord> = focus_words
        .iter()
        .filter_map(|focus| {
            let mut occurrences = Vec::new();
            for (sentences, source_id) in &segmented {
                collect_occurrences(focus, sentences, *source_id, &mut occurrences);
            }
            (!occurrences.is_empty()).then(|| located(focus, occurrences))
        })
        .collect();

    debug!(
        passages = passages.len(),
        words = result.len(),
        occurrences = result.iter().map(|w| w.occurrences.len()).sum::<usize>(),
        "Located focus words in sources"
    );
    Ok(result)
}
