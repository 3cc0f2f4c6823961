//! Fundamental data types for the citation pipeline.
//!
//! Records flow through the stages by value: each stage consumes the previous
//! stage's output and returns new records, so nothing downstream observes a
//! half-updated record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::error::{CitationError, Result};

/// Arbitrary caller-supplied metadata attached to a source passage.
pub type Meta = Map<String, Value>;

static ORDINAL_PREFIX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?m)^\d+\.\s*").expect("ordinal prefix pattern"));

/// Strip leading list ordinals such as `1. ` from every line of `text`.
pub fn strip_ordinal_prefixes(text: &str) -> String {
    ORDINAL_PREFIX.replace_all(text, "").into_owned()
}

/// Whether a focus word came from the entity recognizer or the noun tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordKind {
    Entity,
    Word,
}

impl WordKind {
    pub fn is_entity(self) -> bool {
        matches!(self, Self::Entity)
    }
}

/// A named-entity span produced by the NLP engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub category: String,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }
}

/// A noun token produced by the NLP engine's part-of-speech tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NounToken {
    pub text: String,
    pub pos_tag: String,
}

impl NounToken {
    pub fn new(text: impl Into<String>, pos_tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos_tag: pos_tag.into(),
        }
    }
}

/// A single candidate word for citation.
///
/// For entities `category` is the entity label (`DATE`, `ORG`, ...); for plain
/// nouns it carries the part-of-speech tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusWord {
    pub word: String,
    pub category: String,
    pub kind: WordKind,
}

/// Categorized focus words extracted from an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusWordSet {
    /// Entity words in first-appearance order, each with its final category.
    pub entities: Vec<FocusWord>,
    /// Nouns that are not also entities.
    pub nouns: Vec<FocusWord>,
    /// Entities followed by nouns.
    pub combined: Vec<FocusWord>,
}

impl FocusWordSet {
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// Category of an entity word, matched exactly.
    pub fn entity_category(&self, word: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| e.word == word)
            .map(|e| e.category.as_str())
    }

    /// Case-insensitive lookup in `combined`; the first match wins.
    pub fn lookup(&self, word: &str) -> Option<&FocusWord> {
        let lowered = word.to_lowercase();
        self.combined
            .iter()
            .find(|fw| fw.word.to_lowercase() == lowered)
    }
}

/// A source passage supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePassage {
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl SourcePassage {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            source_id: None,
            meta: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Validated pipeline input: an answer plus the passages it should be checked against.
#[derive(Debug, Clone)]
pub struct AnswerContext {
    answer: String,
    passages: Vec<SourcePassage>,
    meta_by_source_id: HashMap<Option<String>, Option<Meta>>,
}

impl AnswerContext {
    /// Validate and normalize an answer and its passages.
    pub fn new(answer: impl Into<String>, passages: Vec<SourcePassage>) -> Result<Self> {
        Self::with_normalization(answer, passages, true)
    }

    /// Like [`AnswerContext::new`], optionally skipping ordinal-prefix stripping.
    pub fn with_normalization(
        answer: impl Into<String>,
        passages: Vec<SourcePassage>,
        strip_ordinals: bool,
    ) -> Result<Self> {
        let answer = answer.into();
        if answer.trim().is_empty() {
            return Err(CitationError::invalid_input(
                "Answer must be a non-empty string.",
            ));
        }
        if passages.is_empty() {
            return Err(CitationError::invalid_input(
                "Context must be a non-empty list.",
            ));
        }

        let normalize = |text: String| {
            if strip_ordinals {
                strip_ordinal_prefixes(&text)
            } else {
                text
            }
        };

        let meta_by_source_id = passages
            .iter()
            .map(|p| (p.source_id.clone(), p.meta.clone()))
            .collect();
        let passages = passages
            .into_iter()
            .map(|p| SourcePassage {
                document: normalize(p.document),
                ..p
            })
            .collect();

        Ok(Self {
            answer: normalize(answer),
            passages,
            meta_by_source_id,
        })
    }

    /// Build a context from raw JSON passages, reporting structural problems as
    /// `InvalidInput` instead of deserialization errors.
    pub fn from_json(answer: &str, context: &[Value]) -> Result<Self> {
        let passages = parse_passages(context)?;
        Self::new(answer, passages)
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn passages(&self) -> &[SourcePassage] {
        &self.passages
    }

    /// Metadata registered for a source id; the last passage with that id wins.
    pub fn meta_for(&self, source_id: Option<&str>) -> Option<&Meta> {
        self.meta_by_source_id
            .get(&source_id.map(str::to_string))
            .and_then(Option::as_ref)
    }

    /// Every source id present in the input, for report validation.
    pub fn source_ids(&self) -> BTreeSet<&str> {
        self.passages
            .iter()
            .filter_map(|p| p.source_id.as_deref())
            .collect()
    }
}

/// Parse raw JSON passages, requiring each to be an object with a string `document`.
pub fn parse_passages(context: &[Value]) -> Result<Vec<SourcePassage>> {
    if context.is_empty() {
        return Err(CitationError::invalid_input(
            "Context must be a non-empty list.",
        ));
    }
    context
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let obj = item.as_object().ok_or_else(|| {
                CitationError::invalid_input(format!(
                    "Each context item must be an object (item {idx})."
                ))
            })?;
            let document = obj.get("document").and_then(Value::as_str).ok_or_else(|| {
                CitationError::invalid_input(format!(
                    "Each context item must contain a string 'document' field (item {idx})."
                ))
            })?;
            let source_id = match obj.get("source_id") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            let meta = obj.get("meta").and_then(Value::as_object).cloned();
            Ok(SourcePassage {
                document: document.to_string(),
                source_id,
                meta,
            })
        })
        .collect()
}

/// Character range of an occurrence within its sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One literal occurrence of a focus word inside a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordOccurrence {
    pub word: String,
    pub kind: WordKind,
    pub category: String,
    pub sentence: String,
    pub span: Span,
    /// Absent for answer-side occurrences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// All occurrences of one focus word in a text or passage set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedWord {
    pub word: String,
    pub kind: WordKind,
    pub category: String,
    pub occurrences: Vec<WordOccurrence>,
}

/// One (word, answer occurrence, document occurrence) combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePair {
    pub word: String,
    pub kind: WordKind,
    pub category: String,
    pub answer_sentence: String,
    pub document_sentence: String,
    pub source_id: Option<String>,
}

/// An entity word with its category, attached to a citation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityLabel {
    pub word: String,
    pub category: String,
}

impl EntityLabel {
    pub fn new(word: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            category: category.into(),
        }
    }
}

/// Grouped evidence for one (answer sentence, document sentence, source) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    /// Distinct words in first-seen order.
    pub words: Vec<String>,
    pub answer_sentence: String,
    pub document_sentence: String,
    pub source_id: Option<String>,
    pub score: Option<f32>,
    pub labels: Vec<EntityLabel>,
}

impl EvidenceRecord {
    pub fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }
}

/// A passage sentence cited in support of an answer sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedPassage {
    pub document: String,
    pub source_id: Option<String>,
    pub entities: Vec<EntityLabel>,
    pub meta: Option<Meta>,
}

/// All cited passages for one answer sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub answer_sentence: String,
    pub cited_passages: Vec<CitedPassage>,
}

/// Terminal pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationReport {
    pub citations: Vec<Citation>,
    pub missing_words: BTreeSet<String>,
    pub hallucination: bool,
}

impl CitationReport {
    /// Source ids referenced by any citation.
    pub fn cited_source_ids(&self) -> BTreeSet<&str> {
        self.citations
            .iter()
            .flat_map(|c| c.cited_passages.iter())
            .filter_map(|p| p.source_id.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_answer_rejected() {
        let err = AnswerContext::new("", vec![SourcePassage::new("doc")]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_whitespace_answer_rejected() {
        let err = AnswerContext::new("  \n\t ", vec![SourcePassage::new("doc")]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_empty_passages_rejected() {
        let err = AnswerContext::new("answer", vec![]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_from_json_requires_document() {
        let context = vec![json!({"document": "ok"}), json!({"source_id": "s2"})];
        let err = AnswerContext::from_json("answer", &context).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("item 1"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = AnswerContext::from_json("answer", &[json!("plain text")]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_from_json_reads_optional_fields() {
        let context = vec![json!({
            "document": "Paris is the capital.",
            "source_id": "wiki",
            "meta": {"url": "https://example.org"}
        })];
        let ctx = AnswerContext::from_json("Paris.", &context).unwrap();
        assert_eq!(ctx.passages()[0].source_id.as_deref(), Some("wiki"));
        let meta = ctx.meta_for(Some("wiki")).unwrap();
        assert_eq!(meta["url"], json!("https://example.org"));
        assert!(ctx.meta_for(Some("other")).is_none());
    }

    #[test]
    fn test_ordinal_prefixes_stripped() {
        let ctx = AnswerContext::new(
            "1. First point.\n2.  Second point.",
            vec![SourcePassage::new("3. Listed fact.")],
        )
        .unwrap();
        assert_eq!(ctx.answer(), "First point.\nSecond point.");
        assert_eq!(ctx.passages()[0].document, "Listed fact.");
    }

    #[test]
    fn test_ordinal_prefixes_kept_when_disabled() {
        let ctx = AnswerContext::with_normalization(
            "1. First point.",
            vec![SourcePassage::new("doc")],
            false,
        )
        .unwrap();
        assert_eq!(ctx.answer(), "1. First point.");
    }

    #[test]
    fn test_meta_last_passage_wins() {
        let mut first = Meta::new();
        first.insert("v".into(), json!(1));
        let mut second = Meta::new();
        second.insert("v".into(), json!(2));
        let ctx = AnswerContext::new(
            "answer",
            vec![
                SourcePassage::new("a").with_source_id("s").with_meta(first),
                SourcePassage::new("b").with_source_id("s").with_meta(second),
            ],
        )
        .unwrap();
        assert_eq!(ctx.meta_for(Some("s")).unwrap()["v"], json!(2));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let set = FocusWordSet {
            entities: vec![],
            nouns: vec![],
            combined: vec![FocusWord {
                word: "Apple".into(),
                category: "ORG".into(),
                kind: WordKind::Entity,
            }],
        };
        assert_eq!(set.lookup("apple").unwrap().category, "ORG");
        assert!(set.lookup("pear").is_none());
    }

    #[test]
    fn test_word_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&WordKind::Entity).unwrap(), "\"ENTITY\"");
        assert_eq!(serde_json::to_string(&WordKind::Word).unwrap(), "\"WORD\"");
    }

    #[test]
    fn test_span_overlap() {
        let a = Span { start: 0, end: 4 };
        let b = Span { start: 4, end: 6 };
        let c = Span { start: 3, end: 5 };
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }
}
