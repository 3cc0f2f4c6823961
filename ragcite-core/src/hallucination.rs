//! Hallucination detection over numeric and temporal entities.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::FocusWordSet;

/// Entity categories that must be supported by a citation.
///
/// Other categories (names, places, organizations) are never reported missing.
pub const MANDATORY_CATEGORIES: [&str; 6] =
    ["DATE", "MONEY", "CARDINAL", "ORDINAL", "QUANTITY", "TIME"];

pub fn is_mandatory(category: &str) -> bool {
    MANDATORY_CATEGORIES.contains(&category)
}

/// Missing mandatory words and the resulting flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallucinationVerdict {
    pub missing_words: BTreeSet<String>,
    pub hallucination: bool,
}

/// Mandatory-category entity words covered by neither `found` nor `recovered`.
pub fn detect_hallucination<'a>(
    focus: &FocusWordSet,
    found: &'a BTreeSet<String>,
    recovered: impl IntoIterator<Item = &'a String>,
) -> HallucinationVerdict {
    let covered: BTreeSet<&str> = found
        .iter()
        .chain(recovered)
        .map(String::as_str)
        .collect();

    let missing_words: BTreeSet<String> = focus
        .combined
        .iter()
        .filter(|fw| fw.kind.is_entity() && is_mandatory(&fw.category))
        .filter(|fw| !covered.contains(fw.word.as_str()))
        .map(|fw| fw.word.clone())
        .collect();

    HallucinationVerdict {
        hallucination: !missing_words.is_empty(),
        missing_words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FocusWord, WordKind};

    fn focus() -> FocusWordSet {
        let words = [
            ("Apple", "ORG", WordKind::Entity),
            ("2020", "DATE", WordKind::Entity),
            ("$5 million", "MONEY", WordKind::Entity),
            ("March 2021", "DATE", WordKind::Entity),
            ("revenue", "NOUN", WordKind::Word),
        ];
        let combined: Vec<FocusWord> = words
            .iter()
            .map(|(word, category, kind)| FocusWord {
                word: (*word).into(),
                category: (*category).into(),
                kind: *kind,
            })
            .collect();
        FocusWordSet {
            entities: combined[..4].to_vec(),
            nouns: combined[4..].to_vec(),
            combined,
        }
    }

    #[test]
    fn test_mandatory_categories() {
        assert!(is_mandatory("DATE"));
        assert!(is_mandatory("QUANTITY"));
        assert!(!is_mandatory("ORG"));
        assert!(!is_mandatory("PERCENT"));
        assert!(!is_mandatory("date"));
    }

    #[test]
    fn test_all_covered() {
        let found = BTreeSet::from(["2020".to_string(), "$5 million".to_string()]);
        let recovered = vec!["March 2021".to_string()];
        let verdict = detect_hallucination(&focus(), &found, &recovered);
        assert!(!verdict.hallucination);
        assert!(verdict.missing_words.is_empty());
    }

    #[test]
    fn test_found_and_recovered_borrowed_separately() {
        let found = BTreeSet::from(["2020".to_string()]);
        let recovered = vec!["$5 million".to_string(), "March 2021".to_string()];
        let verdict = detect_hallucination(&focus(), &found, recovered.iter());
        assert_eq!(verdict, HallucinationVerdict::default());
    }

    #[test]
    fn test_missing_mandatory_words() {
        let found = BTreeSet::from(["2020".to_string()]);
        let verdict = detect_hallucination(&focus(), &found, &Vec::new());
        assert!(verdict.hallucination);
        assert_eq!(
            verdict.missing_words,
            BTreeSet::from(["$5 million".to_string(), "March 2021".to_string()])
        );
    }

    #[test]
    fn test_non_mandatory_never_flagged() {
        let found = BTreeSet::from([
            "2020".to_string(),
            "$5 million".to_string(),
            "March 2021".to_string(),
        ]);
        let verdict = detect_hallucination(&focus(), &found, &Vec::new());
        assert!(!verdict.missing_words.contains("Apple"));
        assert!(!verdict.hallucination);
    }
}
