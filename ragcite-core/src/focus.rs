//! Focus word classification: which words of an answer need a citation.

use tracing::debug;

use crate::error::CollaboratorError;
use crate::nlp::NlpEngine;
use crate::types::{FocusWord, FocusWordSet, WordKind};

/// Extract the categorized focus words of `answer`.
///
/// Entities keep their first-appearance order and take the category of their
/// last occurrence. Nouns whose exact text is also an entity are dropped.
/// Each word appears at most once per kind.
pub fn classify_focus_words(
    nlp: &dyn NlpEngine,
    answer: &str,
) -> Result<FocusWordSet, CollaboratorError> {
    if answer.trim().is_empty() {
        return Ok(FocusWordSet::default());
    }

    let mut entities: Vec<FocusWord> = Vec::new();
    for span in nlp.extract_entities(answer)? {
        match entities.iter_mut().find(|e| e.word == span.text) {
            Some(existing) => existing.category = span.category,
            None => entities.push(FocusWord {
                word: span.text,
                category: span.category,
                kind: WordKind::Entity,
            }),
        }
    }

    let mut nouns: Vec<FocusWord> = Vec::new();
    for token in nlp.extract_nouns(answer)? {
        if entities.iter().any(|e| e.word == token.text)
            || nouns.iter().any(|n| n.word == token.text)
        {
            continue;
        }
        nouns.push(FocusWord {
            word: token.text,
            category: token.pos_tag,
            kind: WordKind::Word,
        });
    }

    let combined = entities.iter().chain(nouns.iter()).cloned().collect();

    debug!(
        entities = entities.len(),
        nouns = nouns.len(),
        "Classified focus words"
    );

    Ok(FocusWordSet {
        entities,
        nouns,
        combined,
    })
}
