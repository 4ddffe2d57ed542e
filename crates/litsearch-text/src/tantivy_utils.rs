//! litsearch-text
//!
//! Schema, analyzer and n-gram extraction shared by the shard's index and
//! search halves.
use std::collections::BTreeSet;
use tantivy::schema::{Facet, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FacetOptions, FAST, INDEXED, STORED, STRING};
use tantivy::tokenizer::{TextAnalyzer, SimpleTokenizer, LowerCaser, StopWordFilter};
use tantivy::Index;

use litsearch_core::config::IndexSettings;

pub const TOKENIZER: &str = "text_with_stopwords";
/// Written to `_indexer` on every document; "all documents" matches on it.
pub const INDEX_VERSION: &str = "litsearch-index-1";

pub const F_ID: &str = "id";
pub const F_YEAR: &str = "year";
pub const F_REVISION: &str = "revision";
pub const F_TITLE: &str = "title";
pub const F_ABSTRACT: &str = "abstract";
pub const F_SOURCE: &str = "source";
pub const F_JOURNAL: &str = "journal";
pub const F_INDEXER: &str = "_indexer";
pub const F_META: &str = "_meta";
pub const F_FACETS: &str = "_facets";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_u64_field(F_ID, INDEXED | STORED | FAST);
	schema_builder.add_i64_field(F_YEAR, INDEXED | STORED | FAST);
	schema_builder.add_i64_field(F_REVISION, INDEXED | STORED | FAST);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field(F_TITLE, text_options.clone());
	schema_builder.add_text_field(F_ABSTRACT, text_options);
	schema_builder.add_text_field(F_SOURCE, STRING | STORED);
	schema_builder.add_text_field(F_JOURNAL, STRING | STORED);
	schema_builder.add_text_field(F_INDEXER, STRING);
	schema_builder.add_text_field(F_META, STORED);
	schema_builder.add_facet_field(F_FACETS, FacetOptions::default());
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Field handles resolved once per index.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub id: Field,
	pub year: Field,
	pub revision: Field,
	pub title: Field,
	pub abstract_text: Field,
	pub source: Field,
	pub journal: Field,
	pub indexer: Field,
	pub meta: Field,
	pub facets: Field,
}

impl Fields {
	pub fn new(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field(F_ID)?,
			year: schema.get_field(F_YEAR)?,
			revision: schema.get_field(F_REVISION)?,
			title: schema.get_field(F_TITLE)?,
			abstract_text: schema.get_field(F_ABSTRACT)?,
			source: schema.get_field(F_SOURCE)?,
			journal: schema.get_field(F_JOURNAL)?,
			indexer: schema.get_field(F_INDEXER)?,
			meta: schema.get_field(F_META)?,
			facets: schema.get_field(F_FACETS)?,
		})
	}

	pub fn text_fields(&self) -> Vec<Field> { vec![self.title, self.abstract_text] }
}

/// `/dimension/p1/p2/...`
pub fn facet_path<S: AsRef<str>>(dimension: &str, path: &[S]) -> Facet {
	Facet::from_path(std::iter::once(dimension).chain(path.iter().map(|p| p.as_ref())))
}

/// Last path component of a facet, i.e. the value's label.
pub fn facet_label(facet: &Facet) -> String {
	facet.to_path().last().map(|s| s.to_string()).unwrap_or_default()
}

/// Word n-grams of a title: lowercased, stop words dropped, only grams of at
/// least `ngram_min_chars` characters. Overlong titles yield nothing.
pub fn title_ngrams(title: &str, settings: &IndexSettings) -> Vec<String> {
	if title.chars().count() >= settings.ngram_title_max_chars { return Vec::new(); }
	let words: Vec<String> = title
		.split(|c: char| !c.is_alphanumeric())
		.filter(|w| !w.is_empty())
		.map(str::to_lowercase)
		.filter(|w| !STOP_WORDS.contains(&w.as_str()))
		.collect();
	let mut grams = BTreeSet::new();
	for n in settings.ngram_min..=settings.ngram_max {
		if n == 0 { continue; }
		for window in words.windows(n) {
			let gram = window.join(" ");
			if gram.chars().count() >= settings.ngram_min_chars { grams.insert(gram); }
		}
	}
	grams.into_iter().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ngrams_skip_stop_words_and_short_grams() {
		let settings = IndexSettings::default();
		let grams = title_ngrams("The Role of Fish Oil in Raynaud's Disease", &settings);
		assert!(grams.contains(&"fish oil".to_string()));
		assert!(grams.contains(&"role fish oil".to_string()));
		assert!(grams.contains(&"fish oil raynaud s".to_string()));
		assert!(!grams.iter().any(|g| g.split(' ').any(|w| w == "the" || w == "of" || w == "in")));
		assert!(grams.iter().all(|g| g.split(' ').count() >= 2 && g.split(' ').count() <= 4));
	}

	#[test]
	fn ngrams_respect_title_limit() {
		let settings = IndexSettings { ngram_title_max_chars: 10, ..IndexSettings::default() };
		assert!(title_ngrams("fish oil and blood viscosity", &settings).is_empty());
		assert_eq!(title_ngrams("fish oil", &settings), vec!["fish oil".to_string()]);
	}

	#[test]
	fn facet_paths_round_trip_labels() {
		let facet = facet_path("tr", &["C04", "588"]);
		assert_eq!(facet.to_string(), "/tr/C04/588");
		assert_eq!(facet_label(&facet), "588");
	}

	#[test]
	fn schema_has_every_field() {
		let schema = build_schema();
		assert!(Fields::new(&schema).is_ok());
	}
}
