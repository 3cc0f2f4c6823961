//! Fallback recovery for entity words left uncited by the threshold pass.

use std::collections::BTreeSet;

use tracing::debug;

use crate::cite::entity_labels;
use crate::types::{EvidenceRecord, FocusWordSet};

/// Result of the fallback pass.
#[derive(Debug, Clone, Default)]
pub struct FallbackOutcome {
    /// Promoted records with recomputed labels, in promotion order, one per id.
    pub recovered: Vec<EvidenceRecord>,
    /// Entity words with no accepted citation and no fallback candidate, in entity order.
    pub unresolved: Vec<String>,
    /// Entity words recovered from the pool, in entity order.
    pub recovered_words: Vec<String>,
}

/// Best-scoring pool record mentioning `word`, matched as a case-insensitive
/// substring of any record word. Ties keep the earliest record.
fn best_candidate<'a>(word: &str, pool: &'a [EvidenceRecord]) -> Option<&'a EvidenceRecord> {
    let needle = word.to_lowercase();
    let mut best: Option<&EvidenceRecord> = None;
    for record in pool {
        if !record
            .words
            .iter()
            .any(|w| w.to_lowercase().contains(&needle))
        {
            continue;
        }
        let score = record.score.unwrap_or(f32::NEG_INFINITY);
        if best.is_none_or(|b| score > b.score.unwrap_or(f32::NEG_INFINITY)) {
            best = Some(record);
        }
    }
    best
}

/// Recover a citation for every entity word not in `found`.
pub fn resolve_fallbacks(
    focus: &FocusWordSet,
    found: &BTreeSet<String>,
    pool: &[EvidenceRecord],
) -> FallbackOutcome {
    let mut outcome = FallbackOutcome::default();

    for entity in focus.entities.iter().filter(|e| !found.contains(&e.word)) {
        let Some(candidate) = best_candidate(&entity.word, pool) else {
            outcome.unresolved.push(entity.word.clone());
            continue;
        };

        let promoted = EvidenceRecord {
            labels: entity_labels(focus, &candidate.words),
            ..candidate.clone()
        };
        match outcome.recovered.iter_mut().find(|r| r.id == promoted.id) {
            Some(existing) => *existing = promoted,
            None => outcome.recovered.push(promoted),
        }
        outcome.recovered_words.push(entity.word.clone());
    }

    debug!(
        recovered = outcome.recovered.len(),
        recovered_words = outcome.recovered_words.len(),
        unresolved = outcome.unresolved.len(),
        "Resolved fallback citations"
    );
    outcome
}
