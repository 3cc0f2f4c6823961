//! Citation scoring: embed both sentences of every evidence record and split
//! the records into accepted citations and a fallback pool.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::embeddings::{Embedder, checked_cosine_similarity};
use crate::error::CollaboratorError;
use crate::types::{EntityLabel, EvidenceRecord, FocusWordSet};

/// Result of thresholding scored evidence records.
#[derive(Debug, Clone, Default)]
pub struct CitationOutcome {
    /// Records scoring at or above the threshold, with entity labels.
    pub accepted: Vec<EvidenceRecord>,
    /// Below-threshold records that mention a not-yet-found entity word.
    pub fallback_pool: Vec<EvidenceRecord>,
    /// Below-threshold records with nothing left to recover.
    pub discarded: Vec<EvidenceRecord>,
    /// Entity words covered by an accepted record.
    pub found: BTreeSet<String>,
}

/// Entity labels for `words`, deduplicated by word, in word order.
///
/// Words are resolved against the combined focus list case-insensitively;
/// a word that cannot be resolved is treated as a non-entity.
pub fn entity_labels(focus: &FocusWordSet, words: &[String]) -> Vec<EntityLabel> {
    let mut labels: Vec<EntityLabel> = Vec::new();
    for word in words {
        match focus.lookup(word) {
            Some(fw) if fw.kind.is_entity() => {
                if !labels.iter().any(|l| &l.word == word) {
                    labels.push(EntityLabel::new(word.clone(), fw.category.clone()));
                }
            }
            Some(_) => {}
            None => warn!(word = %word, "Focus word missing from lookup; treating as non-entity"),
        }
    }
    labels
}

fn is_entity_word(focus: &FocusWordSet, word: &str) -> bool {
    focus.lookup(word).is_some_and(|fw| fw.kind.is_entity())
}

/// Embed every distinct sentence once, in chunks of `batch_size`.
pub fn embed_sentences<'a>(
    embedder: &dyn Embedder,
    sentences: impl IntoIterator<Item = &'a str>,
    batch_size: usize,
) -> Result<HashMap<&'a str, Vec<f32>>, CollaboratorError> {
    let mut seen = HashSet::new();
    let distinct: Vec<&str> = sentences.into_iter().filter(|s| seen.insert(*s)).collect();

    let mut vectors = HashMap::with_capacity(distinct.len());
    for chunk in distinct.chunks(batch_size.max(1)) {
        let embedded = embedder.embed_batch(chunk)?;
        if embedded.len() != chunk.len() {
            return Err(CollaboratorError::embedding(
                embedder.provider_name(),
                format!("expected {} embeddings, got {}", chunk.len(), embedded.len()),
            ));
        }
        vectors.extend(chunk.iter().copied().zip(embedded));
    }

    debug!(sentences = vectors.len(), "Embedded sentences");
    Ok(vectors)
}

/// Attach the answer/document cosine similarity to every record.
pub fn score_records(
    embedder: &dyn Embedder,
    records: Vec<EvidenceRecord>,
    batch_size: usize,
) -> Result<Vec<EvidenceRecord>, CollaboratorError> {
    if records.is_empty() {
        return Ok(records);
    }

    let scores = {
        let vectors = embed_sentences(
            embedder,
            records
                .iter()
                .flat_map(|r| [r.answer_sentence.as_str(), r.document_sentence.as_str()]),
            batch_size,
        )?;
        records
            .iter()
            .map(|r| {
                let missing = || {
                    CollaboratorError::embedding(embedder.provider_name(), "sentence not embedded")
                };
                let answer = vectors.get(r.answer_sentence.as_str()).ok_or_else(missing)?;
                let document = vectors
                    .get(r.document_sentence.as_str())
                    .ok_or_else(missing)?;
                checked_cosine_similarity(answer, document)
            })
            .collect::<Result<Vec<f32>, CollaboratorError>>()?
    };

    Ok(records
        .into_iter()
        .zip(scores)
        .map(|(record, score)| EvidenceRecord {
            score: Some(score),
            ..record
        })
        .collect())
}

/// Split scored records by `threshold`.
///
/// Records are visited in order; a below-threshold record is kept for
/// fallback only if one of its entity words has not been found by an
/// accepted record seen before it.
pub fn apply_threshold(
    focus: &FocusWordSet,
    scored: Vec<EvidenceRecord>,
    threshold: f32,
) -> CitationOutcome {
    let mut outcome = CitationOutcome::default();

    for record in scored {
        let score = record.score.unwrap_or(f32::NEG_INFINITY);
        if score >= threshold {
            let labels = entity_labels(focus, &record.words);
            outcome
                .found
                .extend(labels.iter().map(|l| l.word.clone()));
            outcome.accepted.push(EvidenceRecord { labels, ..record });
        } else if record
            .words
            .iter()
            .any(|w| is_entity_word(focus, w) && !outcome.found.contains(w))
        {
            outcome.fallback_pool.push(EvidenceRecord {
                labels: Vec::new(),
                ..record
            });
        } else {
            outcome.discarded.push(record);
        }
    }

    debug!(
        accepted = outcome.accepted.len(),
        fallback = outcome.fallback_pool.len(),
        discarded = outcome.discarded.len(),
        found = outcome.found.len(),
        threshold,
        "Applied citation threshold"
    );
    outcome
}

/// Score `records` and split them by `threshold`.
pub fn cite(
    embedder: &dyn Embedder,
    focus: &FocusWordSet,
    records: Vec<EvidenceRecord>,
    threshold: f32,
    batch_size: usize,
) -> Result<CitationOutcome, CollaboratorError> {
    let scored = score_records(embedder, records, batch_size)?;
    Ok(apply_threshold(focus, scored, threshold))
}
