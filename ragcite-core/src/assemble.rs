//! Final grouping of citations by answer sentence.

use crate::types::{AnswerContext, Citation, CitedPassage, EvidenceRecord};

/// Group records by answer sentence.
///
/// Groups appear in first-seen answer sentence order and list their passages
/// in record order. Passage metadata is looked up by source id.
pub fn assemble_citations<'a>(
    records: impl IntoIterator<Item = &'a EvidenceRecord>,
    context: &AnswerContext,
) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();

    for record in records {
        let passage = CitedPassage {
            document: record.document_sentence.clone(),
            source_id: record.source_id.clone(),
            entities: record.labels.clone(),
            meta: context.meta_for(record.source_id.as_deref()).cloned(),
        };
        match citations
            .iter_mut()
            .find(|c| c.answer_sentence == record.answer_sentence)
        {
            Some(citation) => citation.cited_passages.push(passage),
            None => citations.push(Citation {
                answer_sentence: record.answer_sentence.clone(),
                cited_passages: vec![passage],
            }),
        }
    }

    citations
}
