//! The citation pipeline: focus words -> occurrences -> evidence -> scores ->
//! fallback -> hallucination verdict -> grouped citations.
//!
//! Each stage is a standalone function over owned values; the pipeline only
//! holds the two model handles and the run parameters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assemble::assemble_citations;
use crate::cite::cite;
use crate::config::{CitationConfig, DEFAULT_THRESHOLD, validate_threshold};
use crate::embeddings::{Embedder, EmbeddingConfig};
use crate::error::Result;
use crate::fallback::resolve_fallbacks;
use crate::focus::classify_focus_words;
use crate::hallucination::detect_hallucination;
use crate::locate::{locate_in_sources, locate_in_text};
use crate::nlp::NlpEngine;
use crate::pair::{find_common_words, group_pairs};
use crate::registry::ModelRegistry;
use crate::types::{AnswerContext, CitationReport, EvidenceRecord, FocusWordSet, SourcePassage};

/// What happened to an evidence record during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Scored at or above the threshold.
    Accepted,
    /// Kept in the fallback pool but never promoted.
    Fallback,
    /// Promoted from the fallback pool.
    Recovered,
    /// Below the threshold with no uncovered entity word.
    Discarded,
}

/// One evidence record and its fate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedRecord {
    pub record: EvidenceRecord,
    pub outcome: RecordOutcome,
}

/// Intermediate state of a run, for debugging thresholds and focus words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub threshold: f32,
    pub focus_words: FocusWordSet,
    pub answer_occurrences: usize,
    pub source_occurrences: usize,
    pub pairs: usize,
    pub records: Vec<TracedRecord>,
    pub unresolved: Vec<String>,
}

impl PipelineTrace {
    pub fn count(&self, outcome: RecordOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Citation and hallucination checker for generated answers.
#[derive(Clone)]
pub struct CitationPipeline {
    nlp: Arc<dyn NlpEngine>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    batch_size: usize,
    strip_ordinals: bool,
}

impl std::fmt::Debug for CitationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationPipeline")
            .field("nlp", &self.nlp.name())
            .field("embedder", &self.embedder.provider_name())
            .field("threshold", &self.threshold)
            .field("batch_size", &self.batch_size)
            .field("strip_ordinals", &self.strip_ordinals)
            .finish()
    }
}

impl CitationPipeline {
    /// Build a pipeline from model handles. Fails if `threshold` is outside `[0, 1]`.
    pub fn new(
        nlp: Arc<dyn NlpEngine>,
        embedder: Arc<dyn Embedder>,
        threshold: f32,
    ) -> Result<Self> {
        validate_threshold(threshold)?;
        Ok(Self {
            nlp,
            embedder,
            threshold,
            batch_size: EmbeddingConfig::default().batch_size,
            strip_ordinals: true,
        })
    }

    /// Build a pipeline with the default threshold.
    pub fn with_defaults(nlp: Arc<dyn NlpEngine>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::new(nlp, embedder, DEFAULT_THRESHOLD)
    }

    /// Build a pipeline from configuration, loading models through `registry`.
    pub fn from_config(config: &CitationConfig, registry: &ModelRegistry) -> Result<Self> {
        let nlp = registry.nlp(&config.nlp)?;
        let embedder = registry.embedder(&config.embedding)?;
        Ok(Self::new(nlp, embedder, config.threshold)?
            .with_batch_size(config.embedding.batch_size)
            .with_ordinal_stripping(config.ingest.strip_ordinal_prefixes))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_ordinal_stripping(mut self, enabled: bool) -> Self {
        self.strip_ordinals = enabled;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Validate the input and check `answer` against `passages`.
    pub fn run(
        &self,
        answer: impl Into<String>,
        passages: Vec<SourcePassage>,
    ) -> Result<CitationReport> {
        let context = AnswerContext::with_normalization(answer, passages, self.strip_ordinals)?;
        self.run_context(&context)
    }

    /// Check an already validated context.
    pub fn run_context(&self, context: &AnswerContext) -> Result<CitationReport> {
        self.execute(context).map(|(report, _)| report)
    }

    /// Like [`CitationPipeline::run_context`], also returning intermediate state.
    pub fn run_with_trace(
        &self,
        context: &AnswerContext,
    ) -> Result<(CitationReport, PipelineTrace)> {
        self.execute(context)
    }

    fn execute(&self, context: &AnswerContext) -> Result<(CitationReport, PipelineTrace)> {
        let run_id = Uuid::new_v4();
        let nlp = self.nlp.as_ref();
        info!(
            run_id = %run_id,
            passages = context.passages().len(),
            threshold = self.threshold,
            "Starting citation check"
        );

        let focus = classify_focus_words(nlp, context.answer())?;

        let answer_words = locate_in_text(nlp, &focus.combined, context.answer())?;
        let source_words = locate_in_sources(nlp, &focus.combined, context.passages())?;
        let pairs = find_common_words(&answer_words, &source_words);
        let pair_count = pairs.len();
        let records = group_pairs(pairs);
        debug!(
            run_id = %run_id,
            pairs = pair_count,
            records = records.len(),
            "Generated evidence records"
        );

        let cited = cite(
            self.embedder.as_ref(),
            &focus,
            records,
            self.threshold,
            self.batch_size,
        )?;
        let fallback = resolve_fallbacks(&focus, &cited.found, &cited.fallback_pool);
        let verdict = detect_hallucination(&focus, &cited.found, &fallback.recovered_words);

        let citations = assemble_citations(
            cited.accepted.iter().chain(fallback.recovered.iter()),
            context,
        );
        let report = CitationReport {
            citations,
            missing_words: verdict.missing_words,
            hallucination: verdict.hallucination,
        };

        info!(
            run_id = %run_id,
            citations = report.citations.len(),
            accepted = cited.accepted.len(),
            recovered = fallback.recovered.len(),
            missing = report.missing_words.len(),
            hallucination = report.hallucination,
            "Citation check complete"
        );

        let trace = PipelineTrace {
            threshold: self.threshold,
            answer_occurrences: answer_words.iter().map(|w| w.occurrences.len()).sum(),
            source_occurrences: source_words.iter().map(|w| w.occurrences.len()).sum(),
            pairs: pair_count,
            records: trace_records(
                cited.accepted,
                cited.fallback_pool,
                cited.discarded,
                &fallback.recovered,
            ),
            unresolved: fallback.unresolved,
            focus_words: focus,
        };

        Ok((report, trace))
    }
}

fn trace_records(
    accepted: Vec<EvidenceRecord>,
    pool: Vec<EvidenceRecord>,
    discarded: Vec<EvidenceRecord>,
    recovered: &[EvidenceRecord],
) -> Vec<TracedRecord> {
    let mut traced: Vec<TracedRecord> = accepted
        .into_iter()
        .map(|record| TracedRecord {
            record,
            outcome: RecordOutcome::Accepted,
        })
        .collect();

    for record in pool {
        traced.push(match recovered.iter().find(|r| r.id == record.id) {
            Some(promoted) => TracedRecord {
                record: promoted.clone(),
                outcome: RecordOutcome::Recovered,
            },
            None => TracedRecord {
                record,
                outcome: RecordOutcome::Fallback,
            },
        });
    }

    traced.extend(discarded.into_iter().map(|record| TracedRecord {
        record,
        outcome: RecordOutcome::Discarded,
    }));
    traced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::nlp::MockNlpEngine;
    use pretty_assertions::assert_eq;

    fn pipeline(embedder: MockEmbedder) -> CitationPipeline {
        let nlp = MockNlpEngine::new()
            .with_entity("Apple", "ORG")
            .with_entity("2020", "DATE")
            .with_noun("revenue");
        CitationPipeline::with_defaults(Arc::new(nlp), Arc::new(embedder)).unwrap()
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let err = CitationPipeline::new(
            Arc::new(MockNlpEngine::new()),
            Arc::new(MockEmbedder::new(vec![1.0])),
            1.2,
        )
        .unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_invalid_input_before_model_calls() {
        let embedder = Arc::new(MockEmbedder::new(vec![1.0]));
        let pipeline = CitationPipeline::with_defaults(
            Arc::new(MockNlpEngine::failing("must not be called")),
            embedder.clone(),
        )
        .unwrap();
        let err = pipeline.run("", vec![SourcePassage::new("x")]).unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_trace_outcomes() {
        let embedder = MockEmbedder::new(vec![1.0, 0.0])
            .with_vector("Apple revenue was low.", vec![0.0, 1.0]);
        let pipeline = pipeline(embedder);
        let context = AnswerContext::new(
            "Apple revenue grew in 2020.",
            vec![
                SourcePassage::new("Apple revenue was low.").with_source_id("a"),
                SourcePassage::new("Sales grew in 2020.").with_source_id("b"),
            ],
        )
        .unwrap();

        let (report, trace) = pipeline.run_with_trace(&context).unwrap();

        assert_eq!(trace.pairs, 3);
        assert_eq!(trace.count(RecordOutcome::Accepted), 1);
        assert_eq!(trace.count(RecordOutcome::Recovered), 1);
        assert!(trace.unresolved.is_empty());
        assert!(!report.hallucination);
        assert_eq!(report.citations.len(), 1);
        assert_eq!(report.citations[0].cited_passages.len(), 2);
        assert_eq!(
            report.cited_source_ids().into_iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_no_records_skips_embedding() {
        let embedder = Arc::new(MockEmbedder::new(vec![1.0]));
        let pipeline = CitationPipeline::with_defaults(
            Arc::new(MockNlpEngine::new().with_entity("2020", "DATE")),
            embedder.clone(),
        )
        .unwrap();
        let report = pipeline
            .run("Founded in 2020.", vec![SourcePassage::new("Unrelated text.")])
            .unwrap();
        assert_eq!(embedder.calls(), 0);
        assert!(report.hallucination);
        assert!(report.missing_words.contains("2020"));
    }

    #[test]
    fn test_ordinal_prefixes_stripped() {
        let pipeline = pipeline(MockEmbedder::new(vec![1.0]));
        let report = pipeline
            .run(
                "1. Apple grew in 2020.",
                vec![SourcePassage::new("2. Apple grew in 2020.")],
            )
            .unwrap();
        assert_eq!(report.citations[0].answer_sentence, "Apple grew in 2020.");
        assert_eq!(
            report.citations[0].cited_passages[0].document,
            "Apple grew in 2020."
        );
    }

    #[test]
    fn test_from_config_uses_registry() {
        let registry = ModelRegistry::new();
        let config = CitationConfig::default();
        let a = CitationPipeline::from_config(&config, &registry).unwrap();
        let b = CitationPipeline::from_config(&config, &registry).unwrap();
        assert_eq!(registry.len(), 2);
        assert!((a.threshold() - b.threshold()).abs() < f32::EPSILON);
    }
}
