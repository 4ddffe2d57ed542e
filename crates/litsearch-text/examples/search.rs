use std::env;
use std::path::{Path, PathBuf};

use litsearch_core::config::IndexSettings;
use litsearch_core::query::SearchQuery;
use litsearch_core::traits::{Shard, ShardRequest};
use litsearch_text::TantivyShard;

// Query a single shard index and print results.
// Usage:
//   cargo run -p litsearch-text --example search -- "your query" \
//     [--index ../dev_data/indexes/single] [--limit 10] [--facets]

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("Usage: cargo run -p litsearch-text --example search -- <query> [--index DIR] [--limit N] [--facets]");
        std::process::exit(1);
    }
    let mut query = String::new();
    let mut index_dir: Option<PathBuf> = None;
    let mut limit: usize = 10;
    let mut show_facets = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--index" => {
                if i + 1 >= args.len() { eprintln!("--index requires a path"); std::process::exit(2); }
                index_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--limit" => {
                if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
                limit = args[i + 1].parse().unwrap_or(limit);
                i += 2; continue;
            }
            "--facets" => { show_facets = true; i += 1; continue; }
            s if s.starts_with("--") => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            s => {
                if query.is_empty() { query = s.to_string(); }
                i += 1; continue;
            }
        }
    }

    let index_dir = if let Some(id) = index_dir {
        id
    } else if let Ok(env_path) = env::var("LITSEARCH_INDEX_DIR") {
        PathBuf::from(env_path)
    } else {
        let base = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap_or(Path::new("."));
        base.join("dev_data/indexes/single")
    };

    println!("Single shard search\n===================");
    println!("Index: {}", index_dir.display());
    println!("Query: {} (limit {})\n", query, limit);

    let shard = TantivyShard::open("single", &index_dir, IndexSettings::default())?;
    let mut request = ShardRequest::for_query(&SearchQuery::free_text(&query).with_page(0, limit))?;
    if !show_facets { request.fdim = 0; }
    let response = shard.search(&request)?;
    println!("{} hits", response.total);
    for (i, d) in response.documents.iter().enumerate() {
        let snippet = d.best_fragment().map(|f| f.fragment.as_str()).unwrap_or("");
        println!("{:>2}. score={:.3} id={} year={} title={}\n    snippet: {}",
            i + 1, d.score.unwrap_or_default(), d.id, d.year.map(|y| y.to_string()).unwrap_or_default(), d.title, snippet);
    }

    if show_facets {
        println!("\nFacets:");
        for facet in &response.facets {
            for (path, value) in facet.paths() {
                println!("  {}/{} -> {}", facet.name, path, value.count);
            }
        }
    }

    Ok(())
}
