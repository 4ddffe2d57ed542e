use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use serde::{Deserialize, Serialize};
use tantivy::collector::Count;
use tantivy::query::{BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Term};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tracing::{debug, info};

use litsearch_core::config::IndexSettings;
use litsearch_core::error::{Error, Result};
use litsearch_core::facet::NGRAM_DIMENSION;
use litsearch_core::types::{Concept, Document};

use crate::tantivy_utils::{build_schema, facet_path, register_tokenizer, title_ngrams, Fields, INDEX_VERSION};

/// Concepts and headings, stored as one JSON blob per document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoredMeta {
	#[serde(default)]
	pub concepts: Vec<Concept>,
	#[serde(default)]
	pub headings: Vec<Concept>,
}

/// One shard: a Tantivy index with a single serialized writer and a reader
/// that is reloaded on commit.
pub struct TantivyShard {
	pub(crate) name: String,
	pub(crate) index: Index,
	pub(crate) reader: IndexReader,
	pub(crate) writer: Mutex<IndexWriter>,
	pub(crate) fields: Fields,
	pub(crate) settings: IndexSettings,
}

impl TantivyShard {
	/// Opens the index in `index_dir`, creating it when missing.
	pub fn open(name: &str, index_dir: &Path, settings: IndexSettings) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(|e| Error::shard(name, e))?;
		let index = if index_dir.join("meta.json").exists() {
			Index::open_in_dir(index_dir)
		} else {
			Index::create_in_dir(index_dir, build_schema())
		}.map_err(|e| Error::shard(name, e))?;
		info!(shard = name, dir = %index_dir.display(), "opened shard index");
		Self::from_index(name, index, settings)
	}

	pub fn in_memory(name: &str, settings: IndexSettings) -> Result<Self> {
		Self::from_index(name, Index::create_in_ram(build_schema()), settings)
	}

	fn from_index(name: &str, index: Index, settings: IndexSettings) -> Result<Self> {
		register_tokenizer(&index);
		let fields = Fields::new(&index.schema()).map_err(|e| Error::shard(name, e))?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(|e| Error::shard(name, e))?;
		let writer = index.writer_with_num_threads(1, settings.writer_memory).map_err(|e| Error::shard(name, e))?;
		Ok(Self { name: name.to_string(), index, reader, writer: Mutex::new(writer), fields, settings })
	}

	pub(crate) fn err(&self, e: impl std::fmt::Display) -> Error { Error::shard(&self.name, e) }

	fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
		self.writer.lock().map_err(|_| self.err("index writer lock poisoned"))
	}

	pub(crate) fn to_tantivy(&self, doc: &Document) -> Result<TantivyDocument> {
		let f = &self.fields;
		let mut out = TantivyDocument::default();
		out.add_u64(f.id, doc.id);
		out.add_i64(f.revision, doc.revision);
		out.add_text(f.title, &doc.title);
		out.add_text(f.abstract_text, &doc.abstract_text);
		out.add_text(f.source, &doc.source);
		out.add_text(f.indexer, INDEX_VERSION);

		let mut paths: BTreeSet<Vec<String>> = BTreeSet::new();
		let mut put = |dim: &str, path: &[&str]| {
			if path.iter().all(|p| !p.is_empty()) && !path.is_empty() {
				paths.insert(std::iter::once(dim).chain(path.iter().copied()).map(str::to_string).collect());
			}
		};
		if let Some(year) = doc.year {
			out.add_i64(f.year, i64::from(year));
			put("year", &[year.to_string().as_str()]);
		}
		put("source", &[doc.source.as_str()]);
		if let Some(journal) = &doc.journal {
			out.add_text(f.journal, journal);
			put("journal", &[journal.as_str()]);
		}
		for heading in &doc.headings { put("mesh", &[heading.name.as_str()]); }
		for entry in doc.facets.iter().filter(|e| !e.dimension.starts_with('_')) {
			let path: Vec<&str> = entry.path.iter().map(String::as_str).collect();
			put(&entry.dimension, &path);
		}
		for gram in title_ngrams(&doc.title, &self.settings) { put(NGRAM_DIMENSION, &[gram.as_str()]); }
		for path in paths {
			let (dim, rest) = path.split_first().ok_or_else(|| self.err("empty facet path"))?;
			out.add_facet(f.facets, facet_path(dim, rest));
		}

		let meta = StoredMeta { concepts: doc.concepts.clone(), headings: doc.headings.clone() };
		out.add_text(f.meta, serde_json::to_string(&meta).map_err(|e| self.err(e))?);
		Ok(out)
	}

	/// Stages a document; visible after [`TantivyShard::commit_writes`].
	pub fn add(&self, doc: &Document) -> Result<()> {
		let tantivy_doc = self.to_tantivy(doc)?;
		self.writer()?.add_document(tantivy_doc).map_err(|e| self.err(e))?;
		debug!(shard = %self.name, id = doc.id, revision = doc.revision, "staged document");
		Ok(())
	}

	fn id_term(&self, id: u64) -> Term { Term::from_field_u64(self.fields.id, id) }

	/// Copies of `id` whose revision lies within the bounds.
	pub(crate) fn revision_query(&self, id: u64, lower: Bound<i64>, upper: Bound<i64>) -> Box<dyn Query> {
		let field = self.fields.revision;
		let bound = |b: Bound<i64>, open: i64| match b {
			Bound::Included(v) => Bound::Included(Term::from_field_i64(field, v)),
			Bound::Excluded(v) => Bound::Excluded(Term::from_field_i64(field, v)),
			Bound::Unbounded => Bound::Included(Term::from_field_i64(field, open)),
		};
		Box::new(BooleanQuery::new(vec![
			(Occur::Must, Box::new(TermQuery::new(self.id_term(id), IndexRecordOption::Basic)) as Box<dyn Query>),
			(Occur::Must, Box::new(RangeQuery::new(bound(lower, i64::MIN), bound(upper, i64::MAX)))),
		]))
	}

	pub(crate) fn count(&self, query: &dyn Query) -> Result<u64> {
		let searcher = self.reader.searcher();
		searcher.search(query, &Count).map(|n| n as u64).map_err(|e| self.err(e))
	}

	/// Stages deletion of every copy of `id`; returns how many were visible.
	pub fn remove(&self, id: u64) -> Result<u64> {
		let visible = self.count(&TermQuery::new(self.id_term(id), IndexRecordOption::Basic))?;
		self.writer()?.delete_term(self.id_term(id));
		Ok(visible)
	}

	/// Stages deletion of copies of `id` strictly older than `revision`.
	pub fn remove_older(&self, id: u64, revision: i64) -> Result<u64> {
		let query = self.revision_query(id, Bound::Unbounded, Bound::Excluded(revision));
		let visible = self.count(query.as_ref())?;
		if visible > 0 {
			self.writer()?.delete_query(query).map_err(|e| self.err(e))?;
		}
		Ok(visible)
	}

	pub fn holds_revision(&self, id: u64, revision: i64) -> Result<bool> {
		let query = self.revision_query(id, Bound::Included(revision), Bound::Unbounded);
		Ok(self.count(query.as_ref())? > 0)
	}

	pub fn commit_writes(&self) -> Result<()> {
		self.writer()?.commit().map_err(|e| self.err(e))?;
		self.reader.reload().map_err(|e| self.err(e))?;
		Ok(())
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }
}

/// Opens `count` shards named `shard-0..` under `base_dir`.
pub fn open_shards(base_dir: &Path, count: usize, settings: &IndexSettings) -> Result<Vec<TantivyShard>> {
	(0..count)
		.map(|i| {
			let name = format!("shard-{i}");
			let dir: PathBuf = base_dir.join(&name);
			TantivyShard::open(&name, &dir, settings.clone())
		})
		.collect()
}
