//! Evidence pairing: match answer occurrences with source occurrences.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::types::{EvidencePair, EvidenceRecord, LocatedWord};

/// Cross every answer sentence of a word with every source sentence of the same word.
///
/// A word found three times in the answer and twice in the sources yields six
/// pairs. Pairs follow answer word order, then answer occurrence order, then
/// source occurrence order.
pub fn find_common_words(answer: &[LocatedWord], sources: &[LocatedWord]) -> Vec<EvidencePair> {
    let by_word: HashMap<&str, &LocatedWord> =
        sources.iter().map(|w| (w.word.as_str(), w)).collect();

    let mut pairs = Vec::new();
    for answer_word in answer {
        let Some(source_word) = by_word.get(answer_word.word.as_str()) else {
            continue;
        };
        for answer_occ in &answer_word.occurrences {
            for source_occ in &source_word.occurrences {
                pairs.push(EvidencePair {
                    word: answer_word.word.clone(),
                    kind: answer_word.kind,
                    category: answer_word.category.clone(),
                    answer_sentence: answer_occ.sentence.clone(),
                    document_sentence: source_occ.sentence.clone(),
                    source_id: source_occ.source_id.clone(),
                });
            }
        }
    }
    pairs
}

/// Group pairs sharing an (answer sentence, document sentence, source) triple.
///
/// Records follow first-seen triple order; each gets a fresh id and the
/// distinct words of its pairs in first-seen order.
pub fn group_pairs(pairs: Vec<EvidencePair>) -> Vec<EvidenceRecord> {
    let mut index: HashMap<(String, String, Option<String>), usize> = HashMap::new();
    let mut records: Vec<EvidenceRecord> = Vec::new();

    for pair in pairs {
        let key = (
            pair.answer_sentence,
            pair.document_sentence,
            pair.source_id,
        );
        match index.get(&key) {
            Some(&idx) => {
                let record = &mut records[idx];
                if !record.contains_word(&pair.word) {
                    record.words.push(pair.word);
                }
            }
            None => {
                index.insert(key.clone(), records.len());
                let (answer_sentence, document_sentence, source_id) = key;
                records.push(EvidenceRecord {
                    id: Uuid::new_v4().simple().to_string(),
                    words: vec![pair.word],
                    answer_sentence,
                    document_sentence,
                    source_id,
                    score: None,
                    labels: Vec::new(),
                });
            }
        }
    }

    debug!(records = records.len(), "Grouped evidence pairs");
    records
}
