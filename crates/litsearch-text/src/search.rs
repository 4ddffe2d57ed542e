use std::collections::BTreeMap;
use tantivy::collector::{Count, FacetCollector, FacetCounts, TopDocs};
use tantivy::query::{BooleanQuery, EmptyQuery, Occur, PhraseQuery, Query, QueryParser, RangeQuery, TermQuery, TermSetQuery};
use tantivy::schema::{Field, IndexRecordOption, Term, Value};
use tantivy::snippet::SnippetGenerator;
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, Searcher, TantivyDocument};
use tracing::warn;

use litsearch_core::error::{Error, Result};
use litsearch_core::facet::{build_hierarchy, Facet, FacetValue};
use litsearch_core::query::{FacetFilter, ShardPredicate, YearRange};
use litsearch_core::traits::{Shard, ShardRequest, ShardResponse};
use litsearch_core::types::{Document, MatchedDocument, MatchedFragment};

use crate::index::{StoredMeta, TantivyShard};
use crate::tantivy_utils::{facet_label, facet_path, F_ABSTRACT, F_TITLE, INDEX_VERSION};

fn must_all(clauses: Vec<Box<dyn Query>>) -> Box<dyn Query> {
	Box::new(BooleanQuery::new(clauses.into_iter().map(|q| (Occur::Must, q)).collect()))
}

impl TantivyShard {
	fn field(&self, name: &str) -> Result<Field> {
		self.index.schema().get_field(name).map_err(|_| Error::malformed(format!("unknown field '{name}'")))
	}

	/// Compiles a predicate against this shard's schema and analyzer.
	pub fn compile(&self, predicate: &ShardPredicate) -> Result<Box<dyn Query>> {
		let f = &self.fields;
		let query: Box<dyn Query> = match predicate {
			ShardPredicate::AllDocuments => {
				Box::new(TermQuery::new(Term::from_field_text(f.indexer, INDEX_VERSION), IndexRecordOption::Basic))
			}
			ShardPredicate::Text { field, query, raw, slop } => {
				let fields = match field {
					Some(name) => vec![self.field(name)?],
					None => f.text_fields(),
				};
				self.text_query(fields, query, raw, *slop)
			}
			ShardPredicate::IdEquals(id) => Box::new(TermQuery::new(Term::from_field_u64(f.id, *id), IndexRecordOption::Basic)),
			ShardPredicate::IdIn(ids) => Box::new(TermSetQuery::new(ids.iter().map(|id| Term::from_field_u64(f.id, *id)))),
			ShardPredicate::YearRange(range) => self.year_query(range),
			ShardPredicate::ExactTerm { field, term } => {
				Box::new(TermQuery::new(Term::from_field_text(self.field(field)?, term), IndexRecordOption::Basic))
			}
			ShardPredicate::Drilldown { base, facets } => self.with_selections(self.compile(base)?, facets),
			ShardPredicate::And(parts) => must_all(parts.iter().map(|p| self.compile(p)).collect::<Result<_>>()?),
			ShardPredicate::AndNot { include, exclude } => Box::new(BooleanQuery::new(vec![
				(Occur::Must, self.compile(include)?),
				(Occur::MustNot, self.compile(exclude)?),
			])),
		};
		Ok(query)
	}

	fn year_query(&self, range: &YearRange) -> Box<dyn Query> {
		let lo = i64::from(range.min.unwrap_or(i32::MIN));
		let hi = i64::from(range.max.unwrap_or(i32::MAX));
		Box::new(RangeQuery::new(
			std::ops::Bound::Included(Term::from_field_i64(self.fields.year, lo)),
			std::ops::Bound::Included(Term::from_field_i64(self.fields.year, hi)),
		))
	}

	/// Parses normalized query syntax; on a parse error falls back to a
	/// sloppy phrase over the raw text.
	fn text_query(&self, fields: Vec<Field>, query: &str, raw: &str, slop: u32) -> Box<dyn Query> {
		let parser = QueryParser::for_index(&self.index, fields.clone());
		match parser.parse_query(query) {
			Ok(q) => q,
			Err(e) => {
				warn!(shard = %self.name, query, error = %e, "query syntax rejected; falling back to phrase match");
				let per_field: Vec<(Occur, Box<dyn Query>)> =
					fields.into_iter().map(|field| (Occur::Should, self.phrase_query(field, raw, slop))).collect();
				Box::new(BooleanQuery::new(per_field))
			}
		}
	}

	fn phrase_query(&self, field: Field, raw: &str, slop: u32) -> Box<dyn Query> {
		let mut terms = Vec::new();
		if let Ok(mut analyzer) = self.index.tokenizer_for_field(field) {
			let mut stream = analyzer.token_stream(raw);
			while stream.advance() {
				terms.push(Term::from_field_text(field, &stream.token().text));
			}
		}
		match terms.len() {
			0 => Box::new(EmptyQuery),
			1 => Box::new(TermQuery::new(terms.remove(0), IndexRecordOption::WithFreqs)),
			_ => {
				let mut phrase = PhraseQuery::new(terms);
				phrase.set_slop(slop);
				Box::new(phrase)
			}
		}
	}

	/// Adds every selected facet path as a required term.
	fn with_selections(&self, base: Box<dyn Query>, facets: &FacetFilter) -> Box<dyn Query> {
		if facets.is_empty() { return base; }
		let mut clauses = vec![base];
		for (dim, paths) in facets.iter() {
			for path in paths {
				let term = Term::from_facet(self.fields.facets, &facet_path(dim, path));
				clauses.push(Box::new(TermQuery::new(term, IndexRecordOption::Basic)));
			}
		}
		must_all(clauses)
	}

	fn collect_facets(&self, searcher: &Searcher, query: &dyn Query, prefixes: &[tantivy::schema::Facet]) -> Result<FacetCounts> {
		let mut collector = FacetCollector::for_field(crate::tantivy_utils::F_FACETS);
		for prefix in prefixes { collector.add_facet(prefix.clone()); }
		searcher.search(query, &collector).map_err(|e| self.err(e))
	}

	fn to_matched(&self, doc: &TantivyDocument, score: f32) -> MatchedDocument {
		let f = &self.fields;
		let text = |field| doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
		let mut out = MatchedDocument::new(doc.get_first(f.id).and_then(|v| v.as_u64()).unwrap_or_default(), text(f.title).unwrap_or_default());
		out.score = Some(score);
		out.year = doc.get_first(f.year).and_then(|v| v.as_i64()).and_then(|y| i32::try_from(y).ok());
		out.revision = doc.get_first(f.revision).and_then(|v| v.as_i64());
		out.source = text(f.source);
		out.journal = text(f.journal);
		if let Some(meta) = text(f.meta) {
			match serde_json::from_str::<StoredMeta>(&meta) {
				Ok(meta) => { out.concepts = meta.concepts; out.headings = meta.headings; }
				Err(e) => warn!(shard = %self.name, id = out.id, error = %e, "unreadable stored metadata"),
			}
		}
		out
	}

	fn snippet_generators(&self, searcher: &Searcher, query: &dyn Query) -> Vec<(&'static str, SnippetGenerator)> {
		[(F_TITLE, self.fields.title), (F_ABSTRACT, self.fields.abstract_text)]
			.into_iter()
			.filter_map(|(name, field)| {
				let mut generator = SnippetGenerator::create(searcher, query, field).ok()?;
				generator.set_max_num_chars(self.settings.snippet_chars);
				Some((name, generator))
			})
			.collect()
	}

	fn fetch_documents(&self, searcher: &Searcher, query: &dyn Query, hits: Vec<(f32, DocAddress)>) -> Result<Vec<MatchedDocument>> {
		let generators = self.snippet_generators(searcher, query);
		let mut documents = Vec::with_capacity(hits.len());
		for (score, address) in hits {
			let doc: TantivyDocument = searcher.doc(address).map_err(|e| self.err(e))?;
			let mut matched = self.to_matched(&doc, score);
			for (name, generator) in &generators {
				let snippet = generator.snippet_from_doc(&doc);
				if !snippet.is_empty() { matched.fragments.push(MatchedFragment { field: name.to_string(), fragment: snippet.to_html() }); }
			}
			documents.push(matched);
		}
		Ok(documents)
	}

	/// Builds one dimension's facet from collected counts, keeping the top
	/// `top_n` and restoring selected values that fell off the list.
	fn flat_facet(&self, dim: &str, counts: &FacetCounts, top_n: usize, selected: Option<&[Vec<String>]>) -> Facet {
		let prefix = facet_path::<&str>(dim, &[]);
		let values = counts.top_k(prefix.clone(), top_n).into_iter().map(|(facet, count)| FacetValue::new(facet_label(facet), count)).collect();
		let mut facet = Facet::new(dim).with_values(values);
		for path in selected.unwrap_or_default() {
			if let Some(label) = path.first() {
				let count = counts.get(prefix.clone()).find(|(facet, _)| facet_label(facet) == *label).map_or(0, |(_, count)| count);
				facet.mark_selected(label, count);
			}
		}
		facet
	}

	fn hierarchical_facet(&self, searcher: &Searcher, query: &dyn Query, dim: &str, counts: &FacetCounts, top_n: usize) -> Result<Facet> {
		let prefix = facet_path::<&str>(dim, &[]);
		let roots = counts.top_k(prefix, top_n).into_iter().map(|(facet, count)| (facet_label(facet), count)).collect();
		let values = build_hierarchy(roots, self.settings.facet_depth, |paths| self.children_of(searcher, query, dim, paths, top_n))?;
		Ok(Facet { name: dim.to_string(), display: None, values })
	}

	fn children_of(&self, searcher: &Searcher, query: &dyn Query, dim: &str, paths: &[Vec<String>], top_n: usize) -> Result<Vec<Vec<(String, u64)>>> {
		let prefixes: Vec<_> = paths.iter().map(|p| facet_path(dim, p)).collect();
		let counts = self.collect_facets(searcher, query, &prefixes)?;
		Ok(prefixes.iter().map(|prefix| counts.top_k(prefix.clone(), top_n).into_iter().map(|(facet, count)| (facet_label(facet), count)).collect()).collect())
	}

	/// Facets of every configured dimension. Dimensions without a selection
	/// share one collection pass; a selected dimension is counted against
	/// the other dimensions' filters only.
	fn build_facets(&self, searcher: &Searcher, base: &dyn Query, request: &ShardRequest) -> Result<Vec<Facet>> {
		let top_n = request.shard_fdim();
		let dims = &self.settings.facet_dimensions;
		let filtered = self.with_selections(base.box_clone(), &request.facets);
		let unselected: Vec<_> = dims.iter().filter(|d| request.facets.get(d).is_none()).map(|d| facet_path::<&str>(d, &[])).collect();
		let shared = if unselected.is_empty() { None } else { Some(self.collect_facets(searcher, filtered.as_ref(), &unselected)?) };

		let mut facets = Vec::new();
		for dim in dims {
			let selected = request.facets.get(dim);
			let sideways;
			let (query, counts): (&dyn Query, &FacetCounts) = match (&shared, selected) {
				(Some(shared), None) => (filtered.as_ref(), shared),
				_ => {
					let q = self.with_selections(base.box_clone(), &request.facets.without(dim));
					let c = self.collect_facets(searcher, q.as_ref(), &[facet_path::<&str>(dim, &[])])?;
					sideways = (q, c);
					(sideways.0.as_ref(), &sideways.1)
				}
			};
			let facet = if self.settings.is_hierarchical(dim) {
				self.hierarchical_facet(searcher, query, dim, counts, top_n)?
			} else {
				self.flat_facet(dim, counts, top_n, selected)
			};
			if !facet.is_empty() { facets.push(facet); }
		}
		Ok(facets)
	}
}

impl Shard for TantivyShard {
	fn name(&self) -> &str { &self.name }

	fn search(&self, request: &ShardRequest) -> Result<ShardResponse> {
		let searcher = self.reader.searcher();
		let base = self.compile(&request.predicate)?;
		let query = self.with_selections(base.box_clone(), &request.facets);
		let (hits, total) = searcher
			.search(query.as_ref(), &(TopDocs::with_limit(request.max_docs.max(1)), Count))
			.map_err(|e| self.err(e))?;
		let documents = if request.max_docs == 0 { Vec::new() } else { self.fetch_documents(&searcher, query.as_ref(), hits)? };
		let facets = if request.fdim == 0 { Vec::new() } else { self.build_facets(&searcher, base.as_ref(), request)? };
		Ok(ShardResponse { total: total as u64, documents, facets })
	}

	fn facet_children(&self, request: &ShardRequest, dimension: &str, path: &[String], top_n: usize) -> Result<Vec<(String, u64)>> {
		let mut batch = self.facet_children_batch(request, dimension, &[path.to_vec()], top_n)?;
		Ok(batch.pop().unwrap_or_default())
	}

	fn facet_children_batch(&self, request: &ShardRequest, dimension: &str, paths: &[Vec<String>], top_n: usize) -> Result<Vec<Vec<(String, u64)>>> {
		let searcher = self.reader.searcher();
		let query = self.with_selections(self.compile(&request.predicate)?, &request.facets.without(dimension));
		self.children_of(&searcher, query.as_ref(), dimension, paths, top_n)
	}

	fn facet_counts(&self, predicate: &ShardPredicate, dimension: &str) -> Result<BTreeMap<String, u64>> {
		let searcher = self.reader.searcher();
		let query = self.compile(predicate)?;
		let prefix = facet_path::<&str>(dimension, &[]);
		let counts = self.collect_facets(&searcher, query.as_ref(), std::slice::from_ref(&prefix))?;
		Ok(counts.get(prefix).map(|(facet, count)| (facet_label(facet), count)).collect())
	}

	fn facet_value_counts(&self, dimension: &str, values: &[String]) -> Result<BTreeMap<String, u64>> {
		let mut out = BTreeMap::new();
		for value in values {
			let term = Term::from_facet(self.fields.facets, &facet_path(dimension, std::slice::from_ref(value)));
			let n = self.count(&TermQuery::new(term, IndexRecordOption::Basic))?;
			if n > 0 { out.insert(value.clone(), n); }
		}
		Ok(out)
	}

	fn insert(&self, document: &Document) -> Result<()> { self.add(document) }

	fn delete_by_id(&self, id: u64) -> Result<u64> { self.remove(id) }

	fn delete_older_than(&self, id: u64, revision: i64) -> Result<u64> { self.remove_older(id, revision) }

	fn has_at_least_as_new_as(&self, id: u64, revision: i64) -> Result<bool> { self.holds_revision(id, revision) }

	fn commit(&self) -> Result<()> { self.commit_writes() }

	fn size(&self) -> Result<u64> { Ok(self.num_docs()) }
}
