//! Pluggable NLP engines: sentence segmentation, named entities, and nouns.
//!
//! The pipeline only talks to the [`NlpEngine`] trait. [`RuleBasedNlp`] is a
//! dependency-free heuristic engine that is always available;
//! [`MockNlpEngine`] is a lexicon-driven engine for tests.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::CollaboratorError;
use crate::types::{EntitySpan, NounToken};

/// Trait for NLP engines consumed by the pipeline.
pub trait NlpEngine: Send + Sync {
    /// Split text into ordered sentences.
    fn segment_sentences(&self, text: &str) -> Result<Vec<String>, CollaboratorError>;

    /// Named-entity spans in order of appearance. Duplicates are allowed.
    fn extract_entities(&self, text: &str) -> Result<Vec<EntitySpan>, CollaboratorError>;

    /// Noun tokens in order of appearance. Duplicates are allowed.
    fn extract_nouns(&self, text: &str) -> Result<Vec<NounToken>, CollaboratorError>;

    /// Return the engine name.
    fn name(&self) -> &str;
}

/// Configuration for the NLP engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NlpConfig {
    /// Engine name: "rules" (default).
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Extra abbreviations (without the trailing period) that never end a sentence.
    #[serde(default)]
    pub abbreviations: Vec<String>,
    /// Minimum length of a lowercase token to be reported as a noun.
    #[serde(default = "default_min_noun_len")]
    pub min_noun_len: usize,
}

fn default_engine() -> String {
    "rules".into()
}

fn default_min_noun_len() -> usize {
    3
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            abbreviations: Vec::new(),
            min_noun_len: default_min_noun_len(),
        }
    }
}

/// Create an NLP engine from configuration.
pub fn create_nlp(config: &NlpConfig) -> Result<Box<dyn NlpEngine>, CollaboratorError> {
    match config.engine.as_str() {
        "rules" | "" => Ok(Box::new(RuleBasedNlp::from_config(config))),
        other => Err(CollaboratorError::Unavailable {
            model: format!("nlp engine '{other}'"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Sentence segmentation
// ---------------------------------------------------------------------------

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "inc", "ltd", "co", "corp", "vs",
    "no", "fig", "approx", "dept", "est", "gen", "gov", "sen", "rep", "jan", "feb", "mar", "apr",
    "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];

fn is_closing(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

fn opens_sentence(c: char) -> bool {
    c.is_uppercase()
        || c.is_ascii_digit()
        || matches!(c, '"' | '\'' | '(' | '[' | '\u{201c}' | '\u{2018}' | '$' | '\u{20ac}' | '\u{a3}')
}

/// Whether the text before a period ends in an abbreviation or an initial.
fn ends_with_abbreviation(prefix: &str, extra: &[String]) -> bool {
    let Some(last) = prefix.split_whitespace().last() else {
        return false;
    };
    let token = last.trim_start_matches(|c: char| !c.is_alphanumeric());
    if token.is_empty() {
        return false;
    }
    // Initials ("J.") and dotted abbreviations ("U.S", "e.g")
    if token.chars().count() == 1 && token.chars().all(char::is_uppercase) {
        return true;
    }
    if token.contains('.') && token.chars().all(|c| c.is_alphabetic() || c == '.') {
        return true;
    }
    let lowered = token.to_lowercase();
    ABBREVIATIONS.contains(&lowered.as_str())
        || extra.iter().any(|a| a.trim_end_matches('.').to_lowercase() == lowered)
}

/// Split text into trimmed sentences.
///
/// A sentence ends at `.`, `!` or `?` (plus closing quotes/brackets) followed by
/// whitespace, or at a blank line. A period additionally requires the next
/// sentence to open with an uppercase letter, digit, quote or currency sign and
/// the preceding token not to be an abbreviation.
pub fn split_sentences(text: &str, extra_abbreviations: &[String]) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    let mut push = |slice: &str| {
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    };

    while i < len {
        let (pos, c) = chars[i];

        if c == '\n' {
            let mut j = i + 1;
            while j < len && chars[j].1 != '\n' && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j < len && chars[j].1 == '\n' {
                push(&text[start..pos]);
                while j < len && chars[j].1.is_whitespace() {
                    j += 1;
                }
                start = chars.get(j).map_or(text.len(), |&(p, _)| p);
                i = j;
                continue;
            }
        }

        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < len && is_closing(chars[j].1) {
                j += 1;
            }
            if j >= len {
                break;
            }
            if !chars[j].1.is_whitespace() {
                i = j;
                continue;
            }
            let mut k = j;
            while k < len && chars[k].1.is_whitespace() {
                k += 1;
            }
            if k >= len {
                break;
            }
            if c == '.'
                && (!opens_sentence(chars[k].1)
                    || ends_with_abbreviation(&text[start..pos], extra_abbreviations))
            {
                i = j;
                continue;
            }
            push(&text[start..chars[j].0]);
            start = chars[k].0;
            i = k;
            continue;
        }

        i += 1;
    }

    if start < text.len() {
        push(&text[start..]);
    }
    sentences
}

// ---------------------------------------------------------------------------
// Rule-based engine
// ---------------------------------------------------------------------------

const NUM: &str = r"\d+(?:,\d{3})*(?:\.\d+)?";
const SCALE: &str = r"(?:thousand|million|billion|trillion)";
const MONTH: &str = r"(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)";
const FULL_MONTH: &str =
    r"(?:January|February|March|April|May|June|July|August|September|October|November|December)";

/// Entity patterns in priority order; earlier patterns win ties on identical spans.
static ENTITY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let specs: Vec<(String, &'static str)> = vec![
        (format!(r"[$\u{{20ac}}\u{{a3}}\u{{a5}}]\s?{NUM}(?:\s{SCALE}\b)?"), "MONEY"),
        (
            format!(r"\b{NUM}(?:\s{SCALE})?\s(?:dollars|euros|yen|cents|USD|EUR|GBP)\b"),
            "MONEY",
        ),
        (format!(r"\b{NUM}\s?(?:%|percent\b|per cent\b)"), "PERCENT"),
        (
            r"\b\d{1,2}:\d{2}(?::\d{2})?(?:\s?(?:[ap]\.m\.|[AP]M\b|[ap]m\b))?".to_string(),
            "TIME",
        ),
        (r"\b\d{1,2}\s?(?:[ap]\.m\.|[AP]M\b|[ap]m\b)".to_string(), "TIME"),
        (
            format!(r"\b{NUM}\s(?:hours?|minutes?|seconds?)\b"),
            "TIME",
        ),
        (
            format!(r"\b{MONTH}\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"),
            "DATE",
        ),
        (
            format!(r"\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH}\.?,?\s+\d{{4}}\b"),
            "DATE",
        ),
        (format!(r"\b{MONTH}\.?\s+\d{{4}}\b"), "DATE"),
        (format!(r"\b{MONTH}\.?\s+\d{{1,2}}(?:st|nd|rd|th)?\b"), "DATE"),
        (format!(r"\b{FULL_MONTH}\b"), "DATE"),
        (r"\b\d{4}-\d{2}-\d{2}\b".to_string(), "DATE"),
        (r"\b\d{1,2}/\d{1,2}/\d{2,4}\b".to_string(), "DATE"),
        (r"\b\d{4}s\b".to_string(), "DATE"),
        (
            format!(r"\b{NUM}\s(?:years?|months?|weeks?|days?|decades?|centuries)\b"),
            "DATE",
        ),
        (
            r"\b(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday|today|yesterday|tomorrow)\b"
                .to_string(),
            "DATE",
        ),
        (r"\b(?:1[5-9]\d{2}|20\d{2})\b".to_string(), "DATE"),
        (
            format!(
                r"\b{NUM}\s?(?:km|kilomet(?:er|re)s?|miles?|met(?:er|re)s?|cm|mm|feet|foot|ft|inch(?:es)?|kg|kilograms?|grams?|lbs?|pounds|tons?|tonnes?|lit(?:er|re)s?|gallons?|acres?|hectares?|degrees?|mph)\b"
            ),
            "QUANTITY",
        ),
        (r"\b\d+(?:st|nd|rd|th)\b".to_string(), "ORDINAL"),
        (
            r"\b(?:[Ff]irst|[Ss]econd|[Tt]hird|[Ff]ourth|[Ff]ifth|[Ss]ixth|[Ss]eventh|[Ee]ighth|[Nn]inth|[Tt]enth)\b"
                .to_string(),
            "ORDINAL",
        ),
        (format!(r"\b{NUM}(?:\s{SCALE})?\b"), "CARDINAL"),
        (
            r"\b(?:[Oo]ne|[Tt]wo|[Tt]hree|[Ff]our|[Ff]ive|[Ss]ix|[Ss]even|[Ee]ight|[Nn]ine|[Tt]en|[Ee]leven|[Tt]welve|[Tt]wenty|[Tt]hirty|[Ff]orty|[Ff]ifty|[Hh]undred|[Dd]ozen)\b"
                .to_string(),
            "CARDINAL",
        ),
        (
            format!(r"\b{NAME_TOKEN}(?:[ \t]+{NAME_TOKEN})*"),
            NAME_CATEGORY,
        ),
    ];
    specs
        .into_iter()
        .map(|(pattern, category)| {
            (
                Regex::new(&pattern).expect("entity pattern must compile"),
                category,
            )
        })
        .collect()
});

/// Placeholder category for capitalized spans, resolved by [`classify_name`].
const NAME_CATEGORY: &str = "NAME";

/// A capitalized word or a dotted acronym ("U.S.").
const NAME_TOKEN: &str = r"(?:(?:[A-Z]\.){2,}|[A-Z][\w&'-]*)";

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z'-]*|\d[\d,.]*|[^\sA-Za-z\d]").expect("token pattern must compile")
});

const LEADING_FUNCTION_WORDS: &[&str] = &[
    "The", "A", "An", "In", "On", "At", "This", "That", "These", "Those", "It", "He", "She",
    "They", "We", "I", "You", "Its", "Their", "His", "Her", "Our", "Your", "My", "But", "And",
    "Or", "If", "When", "While", "After", "Before", "During", "According", "However", "Also",
    "For", "From", "To", "By", "With", "As", "Of", "There", "Here", "What", "Which", "Who",
    "Why", "How", "Yes", "No", "So", "Then", "Thus", "Although", "Since", "Because", "Many",
    "Most", "Some", "All", "Each", "Every", "Both",
];

const ORG_SUFFIXES: &[&str] = &[
    "Inc", "Corp", "Corporation", "Company", "Co", "Ltd", "LLC", "PLC", "Group", "University",
    "Institute", "Bank", "Association", "Foundation", "Agency", "Department", "Ministry",
    "Council", "Committee", "Party", "Airlines", "Technologies", "Systems", "Labs", "Motors",
    "Holdings", "Partners",
];

const KNOWN_ORGS: &[&str] = &[
    "Apple", "Google", "Alphabet", "Microsoft", "Amazon", "Meta", "Facebook", "Tesla", "Netflix",
    "Nvidia", "Intel", "Samsung", "Sony", "Toyota", "Boeing", "Airbus", "Walmart", "OpenAI",
    "Oracle", "Siemens", "Volkswagen", "Pfizer", "Reuters", "NASA", "UNESCO", "Congress",
    "Parliament",
];

const PERSON_TITLES: &[&str] = &["Mr", "Mrs", "Ms", "Dr", "Prof", "President", "Senator", "Sir"];

const KNOWN_GPE: &[&str] = &[
    "United States", "United Kingdom", "China", "India", "Japan", "Germany", "France", "Italy",
    "Spain", "Canada", "Mexico", "Brazil", "Russia", "Australia", "UK", "US", "USA", "EU",
    "London", "Paris", "Berlin", "Tokyo", "Beijing", "New York", "Washington", "California",
    "Texas", "Delhi", "Mumbai", "Singapore", "Europe", "Asia", "Africa",
];

const DETERMINERS: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "its", "their", "his", "her", "our",
    "your", "my", "each", "every", "some", "any", "no", "many", "several", "few", "more",
    "most", "of", "in", "on", "for", "with", "by", "from", "about", "into", "per",
];

const NOMINAL_SUFFIXES: &[&str] = &[
    "tion", "sion", "ment", "ness", "ity", "ance", "ence", "ship", "ism", "ist", "ure", "age",
    "ery", "dom", "hood", "logy",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "nor", "yet", "was", "were", "are", "has", "had", "have",
    "been", "being", "will", "would", "could", "should", "shall", "may", "might", "must", "can",
    "did", "does", "not", "also", "very", "than", "then", "there", "their", "they", "them",
    "this", "that", "these", "those", "with", "from", "into", "onto", "over", "under", "about",
    "which", "what", "who", "whom", "whose", "when", "where", "why", "how", "all", "any", "both",
    "each", "few", "more", "most", "other", "some", "such", "only", "own", "same", "too", "just",
    "its", "his", "her", "our", "your", "out", "off", "per", "via", "while", "after", "before",
    "during", "since", "until", "upon", "because", "although", "however", "new", "many", "much",
    "several", "said", "says", "made", "make",
];

/// Irregular past-tense verbs; regular ones are caught by their "-ed" ending.
const IRREGULAR_PAST: &[&str] = &[
    "became", "began", "bought", "brought", "built", "came", "chose", "drove", "fell", "felt",
    "found", "gave", "got", "grew", "held", "kept", "knew", "led", "left", "lost", "meant",
    "met", "paid", "ran", "rose", "sank", "saw", "sold", "sent", "shot", "shrank", "spent",
    "spoke", "stood", "struck", "swung", "took", "taught", "thought", "told", "went", "won",
    "wrote",
];

/// Heuristic, dependency-free NLP engine.
#[derive(Debug, Clone)]
pub struct RuleBasedNlp {
    abbreviations: Vec<String>,
    min_noun_len: usize,
}

impl Default for RuleBasedNlp {
    fn default() -> Self {
        Self::from_config(&NlpConfig::default())
    }
}

impl RuleBasedNlp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NlpConfig) -> Self {
        Self {
            abbreviations: config.abbreviations.clone(),
            min_noun_len: config.min_noun_len.max(1),
        }
    }
}

/// Whether the byte offset `start` opens a sentence or line.
fn is_sentence_initial(text: &str, start: usize) -> bool {
    match text[..start].trim_end_matches([' ', '\t']).chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | ':' | '\n' | '"' | '\u{201c}'),
    }
}

/// Assign a category to a capitalized span, or `None` if it is not a name.
fn classify_name(text: &str, start: usize, span: &str) -> Option<(usize, String, String)> {
    let mut offset = start;
    let mut rest = span;
    loop {
        let first = rest.split_whitespace().next()?;
        if !LEADING_FUNCTION_WORDS.contains(&first) {
            break;
        }
        let after = &rest[first.len()..];
        let trimmed = after.trim_start();
        offset += rest.len() - trimmed.len();
        rest = trimmed;
    }
    if rest.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let before = text[..offset].trim_end();
    let titled = PERSON_TITLES
        .iter()
        .any(|t| before.ends_with(&format!("{t}.")) || before.ends_with(t));
    if PERSON_TITLES.contains(&tokens[0]) && tokens.len() == 1 {
        return None;
    }

    let bare = rest.replace('.', "");
    let category = if titled {
        "PERSON"
    } else if KNOWN_GPE.contains(&bare.as_str()) {
        "GPE"
    } else if KNOWN_ORGS.contains(&rest)
        || tokens
            .last()
            .is_some_and(|t| ORG_SUFFIXES.contains(&t.trim_end_matches('.')))
        || (tokens.len() == 1
            && bare.len() >= 2
            && bare.len() <= 5
            && bare.chars().all(|c| c.is_ascii_uppercase()))
    {
        "ORG"
    } else {
        "MISC"
    };
    Some((offset, rest.to_string(), category.to_string()))
}

fn flush_phrase(phrase: &mut Vec<&str>, nouns: &mut Vec<NounToken>) {
    if let Some(head) = phrase.last() {
        nouns.push(NounToken::new(*head, "NOUN"));
    }
    phrase.clear();
}

fn has_nominal_suffix(token: &str) -> bool {
    let stem = token.strip_suffix('s').unwrap_or(token);
    NOMINAL_SUFFIXES
        .iter()
        .any(|s| stem.len() > s.len() + 1 && stem.ends_with(s))
}

impl NlpEngine for RuleBasedNlp {
    fn segment_sentences(&self, text: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(split_sentences(text, &self.abbreviations))
    }

    fn extract_entities(&self, text: &str) -> Result<Vec<EntitySpan>, CollaboratorError> {
        // (start, end, priority, category)
        let mut candidates: Vec<(usize, usize, usize, String)> = Vec::new();
        for (priority, (regex, category)) in ENTITY_PATTERNS.iter().enumerate() {
            for m in regex.find_iter(text) {
                if *category != NAME_CATEGORY {
                    candidates.push((m.start(), m.end(), priority, category.to_string()));
                    continue;
                }
                let Some((offset, name, label)) = classify_name(text, m.start(), m.as_str())
                else {
                    continue;
                };
                if name.chars().count() < 2 {
                    continue;
                }
                // Capitalization alone says nothing at the start of a sentence.
                if label == "MISC"
                    && offset == m.start()
                    && is_sentence_initial(text, offset)
                    && !name.contains(char::is_whitespace)
                {
                    continue;
                }
                candidates.push((offset, offset + name.len(), priority, label));
            }
        }
        candidates.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then((b.1 - b.0).cmp(&(a.1 - a.0)))
                .then(a.2.cmp(&b.2))
        });

        let mut spans = Vec::new();
        let mut claimed_until = 0usize;
        for (start, end, _, category) in candidates {
            if start < claimed_until {
                continue;
            }
            spans.push(EntitySpan::new(text[start..end].trim_end(), category));
            claimed_until = end;
        }
        Ok(spans)
    }

    fn extract_nouns(&self, text: &str) -> Result<Vec<NounToken>, CollaboratorError> {
        let mut nouns = Vec::new();
        // Candidate tokens following a determiner; the last one is the head noun.
        let mut phrase: Vec<&str> = Vec::new();
        let mut in_phrase = false;

        for token in TOKEN_PATTERN.find_iter(text).map(|m| m.as_str()) {
            let lowered = token.to_lowercase();
            let lowercase_word = token.chars().next().is_some_and(char::is_lowercase);
            let is_number = token.chars().next().is_some_and(|c| c.is_ascii_digit());

            if DETERMINERS.contains(&lowered.as_str()) || is_number {
                flush_phrase(&mut phrase, &mut nouns);
                in_phrase = true;
                continue;
            }
            // Adverbs and -ly adjectives modify the phrase without ending it.
            if lowercase_word && lowered.ends_with("ly") && in_phrase {
                continue;
            }
            // A past-tense verb after the head ends the phrase ("the launch happened").
            if lowercase_word
                && (IRREGULAR_PAST.contains(&lowered.as_str())
                    || (lowered.ends_with("ed") && !phrase.is_empty()))
            {
                flush_phrase(&mut phrase, &mut nouns);
                in_phrase = false;
                continue;
            }
            let is_candidate = lowercase_word
                && token.chars().count() >= self.min_noun_len
                && !STOPWORDS.contains(&lowered.as_str())
                && !lowered.ends_with("ly");
            if is_candidate {
                if in_phrase {
                    if has_nominal_suffix(token) && !phrase.is_empty() {
                        flush_phrase(&mut phrase, &mut nouns);
                    }
                    phrase.push(token);
                } else if has_nominal_suffix(token) {
                    nouns.push(NounToken::new(token, "NOUN"));
                }
                continue;
            }
            flush_phrase(&mut phrase, &mut nouns);
            in_phrase = false;
        }
        flush_phrase(&mut phrase, &mut nouns);
        Ok(nouns)
    }

    fn name(&self) -> &str {
        "rules"
    }
}

// ---------------------------------------------------------------------------
// Mock engine
// ---------------------------------------------------------------------------

/// Lexicon-driven NLP engine for tests.
///
/// Reports every lexicon entity and noun that literally occurs in the text,
/// ordered by first occurrence. Sentences are split with [`split_sentences`].
#[derive(Debug, Clone, Default)]
pub struct MockNlpEngine {
    entities: Vec<EntitySpan>,
    nouns: Vec<NounToken>,
    failure: Option<String>,
}

impl MockNlpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, text: &str, category: &str) -> Self {
        self.entities.push(EntitySpan::new(text, category));
        self
    }

    pub fn with_noun(mut self, text: &str) -> Self {
        self.nouns.push(NounToken::new(text, "NOUN"));
        self
    }

    /// Make every call fail with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        match &self.failure {
            Some(message) => Err(CollaboratorError::nlp("mock", message.clone())),
            None => Ok(()),
        }
    }
}

fn in_text_order<T: Clone>(text: &str, items: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut found: Vec<(usize, usize, T)> = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| text.find(key(item)).map(|pos| (pos, idx, item.clone())))
        .collect();
    found.sort_by_key(|(pos, idx, _)| (*pos, *idx));
    found.into_iter().map(|(_, _, item)| item).collect()
}

impl NlpEngine for MockNlpEngine {
    fn segment_sentences(&self, text: &str) -> Result<Vec<String>, CollaboratorError> {
        self.check()?;
        Ok(split_sentences(text, &[]))
    }

    fn extract_entities(&self, text: &str) -> Result<Vec<EntitySpan>, CollaboratorError> {
        self.check()?;
        Ok(in_text_order(text, &self.entities, |e| e.text.as_str()))
    }

    fn extract_nouns(&self, text: &str) -> Result<Vec<NounToken>, CollaboratorError> {
        self.check()?;
        Ok(in_text_order(text, &self.nouns, |n| n.text.as_str()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
