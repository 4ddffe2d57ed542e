//! A file-backed concept lexicon.
//!
//! Serves as both the concept annotator (whole-word, case-insensitive name
//! and synonym matching) and the facet label resolver. The file looks like:
//!
//! ```json
//! {
//!   "concepts": [{ "id": "D001249", "name": "Asthma", "types": ["Disease"], "synonyms": ["bronchial asthma"] }],
//!   "dimensions": { "tr": "Tree Numbers" },
//!   "labels": { "tr": { "C08": "Respiratory Tract Diseases", "C08.127": "Bronchial Diseases" } }
//! }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::facet::PATH_SEPARATOR;
use crate::traits::{ConceptAnnotator, LabelResolver};
use crate::types::Concept;

#[derive(Debug, Clone, Deserialize)]
struct LexiconEntry {
    id: String,
    name: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    concepts: Vec<LexiconEntry>,
    #[serde(default)]
    dimensions: HashMap<String, String>,
    #[serde(default)]
    labels: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    /// Tokenized name and synonyms of each entry, same index as `entries`.
    forms: Vec<Vec<Vec<String>>>,
    dimensions: HashMap<String, String>,
    labels: HashMap<String, HashMap<String, String>>,
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl Lexicon {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::NotFound(format!("lexicon {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: LexiconFile =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(format!("lexicon: {e}")))?;
        let forms = file
            .concepts
            .iter()
            .map(|entry| {
                std::iter::once(&entry.name)
                    .chain(&entry.synonyms)
                    .map(|form| words(form))
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .collect();
        Ok(Self { entries: file.concepts, forms, dimensions: file.dimensions, labels: file.labels })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConceptAnnotator for Lexicon {
    /// Concepts in order of first mention; `score` is the number of mentions.
    fn annotate(&self, text: &str) -> Result<Vec<Concept>> {
        let tokens = words(text);
        let mut found: Vec<(usize, Concept)> = Vec::new();
        for (entry, forms) in self.entries.iter().zip(&self.forms) {
            let mut first = None;
            let mut mentions = 0usize;
            let mut matched_form = None;
            for form in forms {
                for (pos, window) in tokens.windows(form.len()).enumerate() {
                    if window == form.as_slice() {
                        mentions += 1;
                        if first.map_or(true, |f| pos < f) {
                            first = Some(pos);
                            matched_form = Some(form.join(" "));
                        }
                    }
                }
            }
            if let Some(pos) = first {
                let mut concept = Concept::new(entry.id.clone(), entry.name.clone());
                concept.types = entry.types.clone();
                concept.score = Some(mentions as f64);
                concept.context = matched_form.map(serde_json::Value::String);
                found.push((pos, concept));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(found.into_iter().map(|(_, c)| c).collect())
    }
}

impl LabelResolver for Lexicon {
    fn display_name(&self, dimension: &str, path: &[String]) -> Option<String> {
        if path.is_empty() {
            return self.dimensions.get(dimension).cloned();
        }
        let key = path.join(&PATH_SEPARATOR.to_string());
        self.labels.get(dimension)?.get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEXICON: &str = r#"{
        "concepts": [
            { "id": "D001249", "name": "Asthma", "types": ["Disease"], "synonyms": ["bronchial asthma"] },
            { "id": "D006333", "name": "Heart Failure", "types": ["Disease"] },
            { "id": "D005947", "name": "Glucose" }
        ],
        "dimensions": { "tr": "Tree Numbers" },
        "labels": { "tr": { "C08": "Respiratory Tract Diseases", "C08.127": "Bronchial Diseases" } }
    }"#;

    #[test]
    fn annotates_whole_words_in_mention_order() {
        let lexicon = Lexicon::from_json(LEXICON).expect("lexicon");
        let concepts = lexicon.annotate("Heart failure in children with ASTHMA; asthma outcomes").expect("annotate");
        let ids: Vec<_> = concepts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["D006333", "D001249"]);
        assert_eq!(concepts[1].score, Some(2.0));
        assert_eq!(concepts[1].types, vec!["Disease".to_string()]);

        assert!(lexicon.annotate("hyperglucosemia").expect("annotate").is_empty());
    }

    #[test]
    fn resolves_dimension_and_path_labels() {
        let lexicon = Lexicon::from_json(LEXICON).expect("lexicon");
        assert_eq!(lexicon.display_name("tr", &[]).as_deref(), Some("Tree Numbers"));
        assert_eq!(
            lexicon.display_name("tr", &["C08".into(), "127".into()]).as_deref(),
            Some("Bronchial Diseases")
        );
        assert_eq!(lexicon.display_name("tr", &["C04".into()]), None);
        assert_eq!(lexicon.display_name("mesh", &["C08".into()]), None);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(Lexicon::from_json("{ nope"), Err(Error::InvalidConfig(_))));
    }
}
