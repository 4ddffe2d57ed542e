use litsearch_core::config::IndexSettings;
use litsearch_core::facet::NGRAM_DIMENSION;
use litsearch_core::query::{SearchQuery, ShardPredicate};
use litsearch_core::traits::{Shard, ShardRequest};
use litsearch_core::types::{Concept, Document};
use litsearch_text::tantivy_utils::INDEX_VERSION;
use litsearch_text::TantivyShard;

fn corpus() -> Vec<Document> {
	vec![
		Document::new(1, "Fish oil and Raynaud's phenomenon", 1, "pubmed")
			.with_abstract("Dietary fish oil reduced vasospasm in patients with Raynaud's phenomenon.")
			.with_year(1989)
			.with_journal("Am J Med")
			.with_facet("tr", &["C23", "550"]),
		Document::new(2, "Blood viscosity in Raynaud's disease", 1, "pubmed")
			.with_year(1995)
			.with_journal("Lancet")
			.with_facet("tr", &["C14", "907"]),
		Document::new(3, "Fish oil lowers blood viscosity", 1, "pubmed")
			.with_year(1998)
			.with_journal("Lancet")
			.with_facet("tr", &["C14", "907", "137"]),
		Document::new(4, "Asthma in children", 1, "pubmed").with_year(2015).with_journal("BMJ"),
		Document::new(5, "Heart failure outcomes", 1, "pubmed").with_year(2000).with_journal("Lancet"),
	]
}

fn shard() -> TantivyShard {
	let shard = TantivyShard::in_memory("test", IndexSettings::default()).expect("shard");
	for doc in corpus() { shard.insert(&doc).expect("insert"); }
	shard.commit().expect("commit");
	shard
}

fn run(shard: &TantivyShard, query: &SearchQuery) -> (u64, Vec<u64>) {
	let response = shard.search(&ShardRequest::for_query(query).expect("request")).expect("search");
	let mut ids: Vec<u64> = response.documents.iter().map(|d| d.id).collect();
	ids.sort_unstable();
	(response.total, ids)
}

#[test]
fn free_text_ranks_and_highlights() {
	let shard = shard();
	let response = shard.search(&ShardRequest::for_query(&SearchQuery::free_text("fish oil")).expect("request")).expect("search");
	assert_eq!(response.total, 2);
	let ids: Vec<u64> = response.documents.iter().map(|d| d.id).collect();
	assert!(ids.contains(&1) && ids.contains(&3));
	assert!(response.documents[0].score.is_some());
	assert!(response.documents.iter().all(|d| !d.fragments.is_empty()));
	assert!(response.documents.iter().all(|d| d.fragments.iter().any(|f| f.fragment.contains("<b>"))));

	let journal = response.facets.iter().find(|f| f.name == "journal").expect("journal facet");
	assert_eq!(journal.value("Lancet").map(|v| v.count), Some(1));
	assert_eq!(journal.value("Am J Med").map(|v| v.count), Some(1));
}

#[test]
fn year_ranges_are_inclusive() {
	let shard = shard();
	assert_eq!(run(&shard, &SearchQuery::field("year", "(1990,2000)")), (3, vec![2, 3, 5]));
	assert_eq!(run(&shard, &SearchQuery::field("year", "(,1990)")), (1, vec![1]));
	assert_eq!(run(&shard, &SearchQuery::field("year", "(1998,)")).0, 3);
	assert_eq!(run(&shard, &SearchQuery::field("year", "2015")), (1, vec![4]));
}

#[test]
fn id_and_reserved_field_lookups() {
	let shard = shard();
	assert_eq!(run(&shard, &SearchQuery::id(3)), (1, vec![3]));
	assert_eq!(run(&shard, &SearchQuery::id_batch(&[1, 4, 99])), (2, vec![1, 4]));
	assert_eq!(run(&shard, &SearchQuery::field("_indexer", INDEX_VERSION)).0, 5);
	assert_eq!(run(&shard, &SearchQuery::all().with_page(0, 10)).0, 5);

	let unknown = ShardRequest::for_query(&SearchQuery::field("_nosuchfield", "x")).expect("request");
	assert!(shard.search(&unknown).unwrap_err().is_malformed_query());
}

#[test]
fn drilldown_counts_the_selected_dimension_sideways() {
	let shard = shard();
	let query = SearchQuery::all().with_facet("journal", "Lancet");
	let response = shard.search(&ShardRequest::for_query(&query).expect("request")).expect("search");
	assert_eq!(response.total, 3);

	let journal = response.facets.iter().find(|f| f.name == "journal").expect("journal facet");
	assert!(journal.value("Lancet").is_some_and(|v| v.specified && v.count == 3));
	assert_eq!(journal.value("BMJ").map(|v| v.count), Some(1));

	let year = response.facets.iter().find(|f| f.name == "year").expect("year facet");
	let mut years: Vec<&str> = year.values.iter().map(|v| v.label.as_str()).collect();
	years.sort_unstable();
	assert_eq!(years, ["1995", "1998", "2000"]);
}

#[test]
fn hierarchical_facet_descends_levels() {
	let shard = shard();
	let response = shard.search(&ShardRequest::for_query(&SearchQuery::all()).expect("request")).expect("search");
	let tr = response.facets.iter().find(|f| f.name == "tr").expect("tr facet");
	assert_eq!(tr.value("C14").map(|v| v.count), Some(2));
	assert_eq!(tr.value("C23").map(|v| v.count), Some(1));
	assert_eq!(tr.find(&["C14".into(), "907".into()]).map(|v| v.count), Some(2));
	assert_eq!(tr.find(&["C14".into(), "907".into(), "137".into()]).map(|v| v.count), Some(1));

	let request = ShardRequest::for_query(&SearchQuery::all()).expect("request");
	let children = shard.facet_children(&request, "tr", &["C14".to_string()], 10).expect("children");
	assert_eq!(children, vec![("907".to_string(), 2)]);
}

#[test]
fn unparseable_text_falls_back_to_phrase() {
	let shard = shard();
	let (total, ids) = run(&shard, &SearchQuery::free_text("\"fish oil"));
	assert!(total >= 1);
	assert!(ids.contains(&3));
}

#[test]
fn ngram_tables_and_global_totals() {
	let shard = shard();
	let fish = SearchQuery::free_text("fish").rewrite().expect("rewrite");
	let grams = shard.facet_counts(&fish, NGRAM_DIMENSION).expect("ngrams");
	assert_eq!(grams.get("fish oil"), Some(&2));
	assert!(!grams.keys().any(|g| g.split(' ').any(|w| w == "and" || w == "in")));

	let totals = shard
		.facet_value_counts(NGRAM_DIMENSION, &["blood viscosity".to_string(), "no such gram".to_string()])
		.expect("totals");
	assert_eq!(totals.get("blood viscosity"), Some(&2));
	assert!(!totals.contains_key("no such gram"));

	let not_blood = ShardPredicate::and_not(fish, SearchQuery::free_text("blood").rewrite().expect("rewrite"));
	let only_first = shard.facet_counts(&not_blood, NGRAM_DIMENSION).expect("ngrams");
	assert_eq!(only_first.get("fish oil"), Some(&1));
}

#[test]
fn ingestion_mutations_respect_revisions() {
	let shard = TantivyShard::in_memory("mutations", IndexSettings::default()).expect("shard");
	let mut doc = Document::new(10, "Glucose metabolism", 1, "pubmed");
	doc.headings.push(Concept::new("D005947", "Glucose"));
	shard.insert(&doc).expect("insert");
	shard.commit().expect("commit");
	assert_eq!(shard.size().expect("size"), 1);
	assert!(shard.has_at_least_as_new_as(10, 1).expect("check"));
	assert!(!shard.has_at_least_as_new_as(10, 2).expect("check"));

	let fetched = shard.search(&ShardRequest::for_query(&SearchQuery::id(10)).expect("request")).expect("search");
	assert_eq!(fetched.documents[0].headings, vec![Concept::new("D005947", "Glucose")]);
	assert_eq!(fetched.documents[0].revision, Some(1));

	assert_eq!(shard.delete_older_than(10, 1).expect("delete"), 0);
	assert_eq!(shard.delete_older_than(10, 2).expect("delete"), 1);
	shard.insert(&Document::new(10, "Glucose metabolism revisited", 2, "pubmed")).expect("insert");
	shard.commit().expect("commit");
	assert_eq!(shard.size().expect("size"), 1);
	assert!(shard.has_at_least_as_new_as(10, 2).expect("check"));

	assert_eq!(shard.delete_by_id(10).expect("delete"), 1);
	shard.commit().expect("commit");
	assert_eq!(shard.size().expect("size"), 0);
}

#[test]
fn shards_reopen_from_disk() {
	let dir = tempfile::tempdir().expect("tempdir");
	let settings = IndexSettings::default();
	{
		let shards = litsearch_text::open_shards(dir.path(), 2, &settings).expect("open");
		assert_eq!(shards[1].name(), "shard-1");
		shards[0].insert(&corpus()[0]).expect("insert");
		shards[0].commit().expect("commit");
	}
	let reopened = litsearch_text::open_shards(dir.path(), 2, &settings).expect("reopen");
	assert_eq!(reopened[0].size().expect("size"), 1);
	assert_eq!(reopened[1].size().expect("size"), 0);
}
